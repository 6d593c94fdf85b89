use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DripError;

/// GitHub account id of the user or organization that installed the app.
pub type OwnerId = i64;

/// The three lifecycle campaigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignKind {
    Onboarding,
    Coverage,
    Salvage,
}

impl CampaignKind {
    pub const ALL: [CampaignKind; 3] = [
        CampaignKind::Onboarding,
        CampaignKind::Coverage,
        CampaignKind::Salvage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignKind::Onboarding => "onboarding",
            CampaignKind::Coverage => "coverage",
            CampaignKind::Salvage => "salvage",
        }
    }
}

impl fmt::Display for CampaignKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CampaignKind {
    type Err = DripError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "onboarding" => Ok(CampaignKind::Onboarding),
            "coverage" => Ok(CampaignKind::Coverage),
            "salvage" => Ok(CampaignKind::Salvage),
            other => Err(DripError::UnknownCampaign(other.to_string())),
        }
    }
}

/// Closed taxonomy of every email the campaigns can send.
///
/// The string form is what lands in `email_sends.email_type`, so renaming a
/// variant's string is a data migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailType {
    OnboardingSetupPr,
    OnboardingMergeSetupPr,
    OnboardingCoverageCharts,
    OnboardingTargetBranch,
    OnboardingScheduleTriggers,
    OnboardingMergeTestPr,
    OnboardingPurchaseCredits,
    #[serde(rename = "coverage_50")]
    Coverage50,
    #[serde(rename = "coverage_80")]
    Coverage80,
    #[serde(rename = "coverage_90")]
    Coverage90,
    SalvageCheckin,
    SalvageBenchmark,
    SalvageLastCall,
}

impl EmailType {
    pub const ALL: [EmailType; 13] = [
        EmailType::OnboardingSetupPr,
        EmailType::OnboardingMergeSetupPr,
        EmailType::OnboardingCoverageCharts,
        EmailType::OnboardingTargetBranch,
        EmailType::OnboardingScheduleTriggers,
        EmailType::OnboardingMergeTestPr,
        EmailType::OnboardingPurchaseCredits,
        EmailType::Coverage50,
        EmailType::Coverage80,
        EmailType::Coverage90,
        EmailType::SalvageCheckin,
        EmailType::SalvageBenchmark,
        EmailType::SalvageLastCall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmailType::OnboardingSetupPr => "onboarding_setup_pr",
            EmailType::OnboardingMergeSetupPr => "onboarding_merge_setup_pr",
            EmailType::OnboardingCoverageCharts => "onboarding_coverage_charts",
            EmailType::OnboardingTargetBranch => "onboarding_target_branch",
            EmailType::OnboardingScheduleTriggers => "onboarding_schedule_triggers",
            EmailType::OnboardingMergeTestPr => "onboarding_merge_test_pr",
            EmailType::OnboardingPurchaseCredits => "onboarding_purchase_credits",
            EmailType::Coverage50 => "coverage_50",
            EmailType::Coverage80 => "coverage_80",
            EmailType::Coverage90 => "coverage_90",
            EmailType::SalvageCheckin => "salvage_checkin",
            EmailType::SalvageBenchmark => "salvage_benchmark",
            EmailType::SalvageLastCall => "salvage_last_call",
        }
    }

    pub fn campaign(&self) -> CampaignKind {
        match self {
            EmailType::OnboardingSetupPr
            | EmailType::OnboardingMergeSetupPr
            | EmailType::OnboardingCoverageCharts
            | EmailType::OnboardingTargetBranch
            | EmailType::OnboardingScheduleTriggers
            | EmailType::OnboardingMergeTestPr
            | EmailType::OnboardingPurchaseCredits => CampaignKind::Onboarding,
            EmailType::Coverage50 | EmailType::Coverage80 | EmailType::Coverage90 => {
                CampaignKind::Coverage
            }
            EmailType::SalvageCheckin | EmailType::SalvageBenchmark | EmailType::SalvageLastCall => {
                CampaignKind::Salvage
            }
        }
    }
}

impl fmt::Display for EmailType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmailType {
    type Err = DripError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EmailType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DripError::UnknownEmailType(s.to_string()))
    }
}

/// State of a row in the send ledger.
///
/// Every status counts as "already handled" for the decision engine; only
/// `Reserved` rows can be released again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    /// Soft lock taken before delivery.
    Reserved,
    /// Delivered; `resend_email_id` is set.
    Sent,
    /// Resolved by a skip predicate, never delivered.
    Skipped,
}

impl fmt::Display for SendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SendStatus::Reserved => "reserved",
            SendStatus::Sent => "sent",
            SendStatus::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

impl FromStr for SendStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reserved" => Ok(SendStatus::Reserved),
            "sent" => Ok(SendStatus::Sent),
            "skipped" => Ok(SendStatus::Skipped),
            other => Err(format!("unknown send status: {other}")),
        }
    }
}

/// Kind of entry in the credit ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditKind {
    Purchase,
    AutoReload,
    Grant,
    Usage,
    Refund,
}

impl CreditKind {
    /// Money the owner paid for, as opposed to free grants or consumption.
    pub fn is_paid(&self) -> bool {
        matches!(self, CreditKind::Purchase | CreditKind::AutoReload)
    }
}

impl fmt::Display for CreditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CreditKind::Purchase => "purchase",
            CreditKind::AutoReload => "auto_reload",
            CreditKind::Grant => "grant",
            CreditKind::Usage => "usage",
            CreditKind::Refund => "refund",
        };
        write!(f, "{s}")
    }
}

impl FromStr for CreditKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(CreditKind::Purchase),
            "auto_reload" => Ok(CreditKind::AutoReload),
            "grant" => Ok(CreditKind::Grant),
            "usage" => Ok(CreditKind::Usage),
            "refund" => Ok(CreditKind::Refund),
            other => Err(format!("unknown credit transaction type: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_type_string_form_round_trips() {
        for t in EmailType::ALL {
            assert_eq!(t.as_str().parse::<EmailType>().unwrap(), t);
        }
    }

    #[test]
    fn email_type_serde_matches_as_str() {
        let json = serde_json::to_string(&EmailType::Coverage80).unwrap();
        assert_eq!(json, r#""coverage_80""#);
        let json = serde_json::to_string(&EmailType::OnboardingMergeTestPr).unwrap();
        assert_eq!(json, r#""onboarding_merge_test_pr""#);
    }

    #[test]
    fn unknown_email_type_is_rejected() {
        let err = "welcome_v2".parse::<EmailType>().unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_EMAIL_TYPE");
    }

    #[test]
    fn every_email_type_belongs_to_one_campaign() {
        let onboarding = EmailType::ALL
            .iter()
            .filter(|t| t.campaign() == CampaignKind::Onboarding)
            .count();
        let coverage = EmailType::ALL
            .iter()
            .filter(|t| t.campaign() == CampaignKind::Coverage)
            .count();
        let salvage = EmailType::ALL
            .iter()
            .filter(|t| t.campaign() == CampaignKind::Salvage)
            .count();
        assert_eq!((onboarding, coverage, salvage), (7, 3, 3));
    }

    #[test]
    fn campaign_kind_parses() {
        assert_eq!("salvage".parse::<CampaignKind>().unwrap(), CampaignKind::Salvage);
        assert!("weekly".parse::<CampaignKind>().is_err());
    }

    #[test]
    fn only_paid_credit_kinds_count_as_purchases() {
        assert!(CreditKind::Purchase.is_paid());
        assert!(CreditKind::AutoReload.is_paid());
        assert!(!CreditKind::Grant.is_paid());
        assert!(!CreditKind::Usage.is_paid());
    }
}
