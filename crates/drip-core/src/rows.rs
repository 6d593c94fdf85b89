//! Raw per-table rows as loaded from the owner/installation store.
//!
//! Rows for *all* owners are fetched in one pass into a [`RawBatch`]; the
//! context builder in `drip-engine` indexes and aggregates them in memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CreditKind, EmailType, OwnerId, SendStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerRow {
    pub owner_id: OwnerId,
    pub owner_name: String,
    /// "User" or "Organization".
    pub owner_type: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub has_active_subscription: bool,
    pub auto_reload_enabled: bool,
    /// Subscription canceled. The app may still be installed.
    pub canceled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationRow {
    pub installation_id: i64,
    pub owner_id: OwnerId,
    pub installed_at: DateTime<Utc>,
    pub uninstalled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryRow {
    pub owner_id: OwnerId,
    pub repo_name: String,
    /// `None` means the repository's default branch is used.
    pub target_branch: Option<String>,
    pub trigger_on_schedule: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestRow {
    pub owner_id: OwnerId,
    pub owner_name: String,
    pub repo_name: String,
    pub pr_number: i64,
    pub is_setup_pr: bool,
    pub is_test_pr: bool,
    pub merged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageRow {
    pub owner_id: OwnerId,
    pub repo_name: String,
    pub lines_total: i64,
    pub lines_covered: i64,
    pub updated_at: DateTime<Utc>,
}

impl CoverageRow {
    /// Line coverage for this repository, 0.0 when it has no measurable lines.
    pub fn pct(&self) -> f64 {
        if self.lines_total <= 0 {
            0.0
        } else {
            self.lines_covered as f64 * 100.0 / self.lines_total as f64
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditRow {
    pub owner_id: OwnerId,
    /// Signed: usage rows are negative.
    pub amount_usd: f64,
    pub kind: CreditKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRow {
    pub owner_id: OwnerId,
    pub owner_name: String,
    pub email_type: EmailType,
    pub status: SendStatus,
    pub resend_email_id: Option<String>,
    pub replied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Everything a campaign run needs, fetched once for every owner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawBatch {
    pub owners: Vec<OwnerRow>,
    pub installations: Vec<InstallationRow>,
    pub repositories: Vec<RepositoryRow>,
    pub pull_requests: Vec<PullRequestRow>,
    pub coverage: Vec<CoverageRow>,
    pub credits: Vec<CreditRow>,
    pub sends: Vec<SendRow>,
}

impl RawBatch {
    pub fn owner_count(&self) -> usize {
        self.owners.len()
    }
}
