use drip_core::{CampaignKind, EmailType};

use crate::campaigns::coverage::CoverageMilestone;
use crate::campaigns::onboarding::OnboardingStep;
use crate::campaigns::salvage::SalvageStep;
use crate::context::{OwnerContext, Recipient};

/// What the decision engine needs from a rule. Templates stay on the
/// concrete rule types because their inputs differ per campaign.
pub trait Rule {
    fn email_type(&self) -> EmailType;

    /// Goal already met or not applicable: record as done, never send.
    fn should_skip(&self, ctx: &OwnerContext) -> bool;

    /// Preconditions not met yet: stop this owner's campaign for this cycle.
    fn should_pause(&self, ctx: &OwnerContext) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignRule {
    Onboarding(OnboardingStep),
    Coverage(CoverageMilestone),
    Salvage(SalvageStep),
}

impl CampaignRule {
    pub fn campaign(&self) -> CampaignKind {
        match self {
            CampaignRule::Onboarding(_) => CampaignKind::Onboarding,
            CampaignRule::Coverage(_) => CampaignKind::Coverage,
            CampaignRule::Salvage(_) => CampaignKind::Salvage,
        }
    }

    /// Render subject and body through the variant's own template. Missing
    /// optional context falls back to generic wording.
    pub fn render(&self, ctx: &OwnerContext, recipient: &Recipient) -> RenderedEmail {
        match self {
            CampaignRule::Onboarding(step) => {
                step.render(&recipient.owner_name, recipient.first_name.as_deref(), ctx)
            }
            CampaignRule::Coverage(milestone) => milestone.render(
                &recipient.owner_name,
                ctx.owner_coverage_pct,
                ctx.coverage_repo_count,
                ctx.repo_most_needing_coverage.as_deref(),
            ),
            CampaignRule::Salvage(step) => step.render(recipient.first_name.as_deref(), ctx),
        }
    }
}

impl Rule for CampaignRule {
    fn email_type(&self) -> EmailType {
        match self {
            CampaignRule::Onboarding(step) => step.email_type(),
            CampaignRule::Coverage(milestone) => milestone.email_type(),
            CampaignRule::Salvage(step) => step.email_type(),
        }
    }

    fn should_skip(&self, ctx: &OwnerContext) -> bool {
        match self {
            CampaignRule::Onboarding(step) => step.should_skip(ctx),
            CampaignRule::Coverage(milestone) => milestone.should_skip(ctx),
            CampaignRule::Salvage(step) => step.should_skip(ctx),
        }
    }

    fn should_pause(&self, ctx: &OwnerContext) -> bool {
        match self {
            CampaignRule::Onboarding(step) => step.should_pause(ctx),
            CampaignRule::Coverage(milestone) => milestone.should_pause(ctx),
            CampaignRule::Salvage(step) => step.should_pause(ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaigns::rules_for;
    use chrono::Utc;
    use drip_core::config::CampaignsConfig;

    #[test]
    fn every_rule_renders_without_optional_context() {
        let ctx = OwnerContext::fresh(1, Utc::now());
        let recipient = Recipient {
            owner_id: 1,
            owner_name: "org-1".into(),
            email: "dev@example.com".into(),
            first_name: None,
        };
        for kind in CampaignKind::ALL {
            for rule in rules_for(kind, &CampaignsConfig::default()) {
                assert_eq!(rule.campaign(), kind);
                let email = rule.render(&ctx, &recipient);
                assert!(!email.subject.is_empty(), "{:?}", rule.email_type());
                assert!(email.body.starts_with("Hi there,"), "{:?}", rule.email_type());
            }
        }
    }
}
