//! The three lifecycle campaigns and their ordered rule lists.

pub mod coverage;
pub mod onboarding;
pub mod salvage;

use drip_core::config::CampaignsConfig;
use drip_core::CampaignKind;

use crate::context::OwnerContext;
use crate::rule::CampaignRule;

use self::coverage::CoverageMilestone;
use self::onboarding::OnboardingStep;
use self::salvage::{SalvageStage, SalvageStep};

pub(crate) const SITE_URL: &str = "https://gitauto.ai";
pub(crate) const SIGNATURE: &str = "Cheers,\nThe GitAuto team";

/// Rules for `kind`, in evaluation order.
pub fn rules_for(kind: CampaignKind, settings: &CampaignsConfig) -> Vec<CampaignRule> {
    match kind {
        CampaignKind::Onboarding => OnboardingStep::ALL
            .into_iter()
            .map(CampaignRule::Onboarding)
            .collect(),
        CampaignKind::Coverage => CoverageMilestone::ALL
            .into_iter()
            .map(CampaignRule::Coverage)
            .collect(),
        CampaignKind::Salvage => SalvageStage::ALL
            .into_iter()
            .map(|stage| {
                CampaignRule::Salvage(SalvageStep {
                    stage,
                    spacing_days: settings.salvage_spacing_days,
                })
            })
            .collect(),
    }
}

/// Whether an owner is targeted by `kind` at all.
pub fn is_eligible(kind: CampaignKind, ctx: &OwnerContext) -> bool {
    match kind {
        CampaignKind::Onboarding => onboarding::is_eligible(ctx),
        CampaignKind::Coverage => coverage::is_eligible(ctx),
        CampaignKind::Salvage => salvage::is_eligible(ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Rule;

    #[test]
    fn rule_lists_follow_lifecycle_order() {
        let settings = CampaignsConfig::default();
        for kind in CampaignKind::ALL {
            let rules = rules_for(kind, &settings);
            assert!(!rules.is_empty());
            assert!(rules.iter().all(|r| r.campaign() == kind));
            assert!(rules.iter().all(|r| r.email_type().campaign() == kind));
        }

        let onboarding: Vec<_> = rules_for(CampaignKind::Onboarding, &settings)
            .iter()
            .map(|r| r.email_type().as_str())
            .collect();
        assert_eq!(
            onboarding,
            [
                "onboarding_setup_pr",
                "onboarding_merge_setup_pr",
                "onboarding_coverage_charts",
                "onboarding_target_branch",
                "onboarding_schedule_triggers",
                "onboarding_merge_test_pr",
                "onboarding_purchase_credits",
            ]
        );
    }
}
