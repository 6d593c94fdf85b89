//! Owner Context Builder.
//!
//! A [`ContextBuilder`] takes ownership of one [`RawBatch`] (every owner's
//! rows, fetched in a handful of queries) and indexes it by owner. Building
//! an [`OwnerContext`] is then pure in-memory aggregation: same batch and
//! same `as_of` give the same context.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};
use drip_core::rows::{
    CoverageRow, CreditRow, InstallationRow, OwnerRow, PullRequestRow, RepositoryRow, SendRow,
};
use drip_core::{OwnerId, RawBatch, SendStatus};
use serde::Serialize;
use tracing::debug;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetupPr {
    pub repo_name: String,
    pub pr_number: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenTestPr {
    pub owner_name: String,
    pub repo_name: String,
    pub pr_number: i64,
}

/// Anonymized comparator: another owner of similar size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageBenchmark {
    pub lines_total: i64,
    pub coverage_pct: f64,
}

/// Why an owner counts as churned, strongest signal first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChurnKind {
    Active,
    /// Installed, but nothing has happened for a while.
    Dormant,
    /// Subscription canceled while the app is still installed.
    Downgraded,
    Uninstalled,
}

/// Immutable per-owner snapshot used by every rule predicate and template.
#[derive(Debug, Clone, Serialize)]
pub struct OwnerContext {
    pub owner_id: OwnerId,
    pub owner_name: String,
    pub as_of: DateTime<Utc>,

    pub installed_at: DateTime<Utc>,
    pub uninstalled_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub churn: ChurnKind,

    pub has_setup_pr: bool,
    pub has_setup_pr_merged: bool,
    pub setup_prs: Vec<SetupPr>,

    /// Test PRs only; setup PRs are tracked separately.
    pub pr_count: usize,
    pub merged_pr_count: usize,
    pub open_test_prs: Vec<OpenTestPr>,
    pub last_activity_at: Option<DateTime<Utc>>,

    pub has_owner_coverage: bool,
    pub owner_coverage_pct: Option<f64>,
    pub coverage_repo_count: usize,
    pub total_repo_count: usize,
    pub repo_most_needing_coverage: Option<String>,
    pub coverage_benchmark: Option<CoverageBenchmark>,

    pub has_target_branch: bool,
    pub scheduled_repo_count: usize,
    pub unscheduled_repo_names: BTreeSet<String>,

    pub has_purchased_credits: bool,
    pub has_active_subscription: bool,
    pub has_auto_reload_enabled: bool,
    pub credit_balance_usd: Option<f64>,

    pub last_email_sent_at: Option<DateTime<Utc>>,
}

impl OwnerContext {
    pub fn has_prs(&self) -> bool {
        self.pr_count > 0
    }

    pub fn has_merged_pr(&self) -> bool {
        self.merged_pr_count > 0
    }

    pub fn is_installed(&self) -> bool {
        self.uninstalled_at.is_none()
    }

    /// Owner who installed at `as_of` and has done nothing since.
    #[cfg(test)]
    pub(crate) fn fresh(owner_id: OwnerId, as_of: DateTime<Utc>) -> Self {
        Self {
            owner_id,
            owner_name: format!("org-{owner_id}"),
            as_of,
            installed_at: as_of,
            uninstalled_at: None,
            canceled_at: None,
            churn: ChurnKind::Active,
            has_setup_pr: false,
            has_setup_pr_merged: false,
            setup_prs: Vec::new(),
            pr_count: 0,
            merged_pr_count: 0,
            open_test_prs: Vec::new(),
            last_activity_at: None,
            has_owner_coverage: false,
            owner_coverage_pct: None,
            coverage_repo_count: 0,
            total_repo_count: 0,
            repo_most_needing_coverage: None,
            coverage_benchmark: None,
            has_target_branch: false,
            scheduled_repo_count: 0,
            unscheduled_repo_names: BTreeSet::new(),
            has_purchased_credits: false,
            has_active_subscription: false,
            has_auto_reload_enabled: false,
            credit_balance_usd: None,
            last_email_sent_at: None,
        }
    }
}

/// Who an email goes to. Kept out of [`OwnerContext`] so predicates never
/// depend on contact details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub owner_id: OwnerId,
    pub owner_name: String,
    pub email: String,
    pub first_name: Option<String>,
}

#[derive(Debug)]
struct OwnerRows {
    owner: OwnerRow,
    installations: Vec<InstallationRow>,
    repositories: Vec<RepositoryRow>,
    pull_requests: Vec<PullRequestRow>,
    coverage: Vec<CoverageRow>,
    credits: Vec<CreditRow>,
    sends: Vec<SendRow>,
}

impl OwnerRows {
    fn new(owner: OwnerRow) -> Self {
        Self {
            owner,
            installations: Vec::new(),
            repositories: Vec::new(),
            pull_requests: Vec::new(),
            coverage: Vec::new(),
            credits: Vec::new(),
            sends: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CoverageTotal {
    owner_id: OwnerId,
    lines_total: i64,
    lines_covered: i64,
}

impl CoverageTotal {
    fn pct(&self) -> f64 {
        self.lines_covered as f64 * 100.0 / self.lines_total as f64
    }
}

pub struct ContextBuilder {
    owners: HashMap<OwnerId, OwnerRows>,
    /// Owners with measurable coverage, for benchmark lookups.
    coverage_totals: Vec<CoverageTotal>,
    dormant_after: Duration,
}

impl ContextBuilder {
    pub fn new(batch: RawBatch, dormant_after_days: i64) -> Self {
        let mut owners: HashMap<OwnerId, OwnerRows> = batch
            .owners
            .into_iter()
            .map(|o| (o.owner_id, OwnerRows::new(o)))
            .collect();

        let mut orphans = 0usize;
        macro_rules! attach {
            ($rows:expr, $field:ident) => {
                for row in $rows {
                    match owners.get_mut(&row.owner_id) {
                        Some(entry) => entry.$field.push(row),
                        None => orphans += 1,
                    }
                }
            };
        }
        attach!(batch.installations, installations);
        attach!(batch.repositories, repositories);
        attach!(batch.pull_requests, pull_requests);
        attach!(batch.coverage, coverage);
        attach!(batch.credits, credits);
        attach!(batch.sends, sends);
        if orphans > 0 {
            debug!(orphans, "dropped rows with no matching owner");
        }

        let mut coverage_totals: Vec<CoverageTotal> = owners
            .values()
            .filter_map(|rows| {
                let (total, covered) = line_totals(&rows.coverage);
                (total > 0).then_some(CoverageTotal {
                    owner_id: rows.owner.owner_id,
                    lines_total: total,
                    lines_covered: covered,
                })
            })
            .collect();
        coverage_totals.sort_by_key(|t| t.owner_id);

        Self {
            owners,
            coverage_totals,
            dormant_after: Duration::days(dormant_after_days),
        }
    }

    pub fn owner_count(&self) -> usize {
        self.owners.len()
    }

    /// Every owner in the batch, ascending.
    pub fn owner_ids(&self) -> Vec<OwnerId> {
        let mut ids: Vec<_> = self.owners.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// `None` when the owner is unknown or has no usable email address.
    pub fn recipient(&self, owner_id: OwnerId) -> Option<Recipient> {
        let owner = &self.owners.get(&owner_id)?.owner;
        let email = owner.email.as_deref().map(str::trim).filter(|e| !e.is_empty())?;
        Some(Recipient {
            owner_id,
            owner_name: owner.owner_name.clone(),
            email: email.to_string(),
            first_name: owner.first_name.clone(),
        })
    }

    pub fn build(&self, owner_id: OwnerId, as_of: DateTime<Utc>) -> Result<OwnerContext> {
        let rows = self
            .owners
            .get(&owner_id)
            .ok_or(EngineError::UnknownOwner(owner_id))?;
        let owner = &rows.owner;

        // Tenure counts from the first install; the owner is installed while
        // any installation is live.
        let installed_at = rows
            .installations
            .iter()
            .map(|i| i.installed_at)
            .min()
            .ok_or(EngineError::NotInstalled(owner_id))?;
        let uninstalled_at = if rows.installations.iter().any(|i| i.uninstalled_at.is_none()) {
            None
        } else {
            rows.installations.iter().filter_map(|i| i.uninstalled_at).max()
        };

        let mut setup: Vec<&PullRequestRow> =
            rows.pull_requests.iter().filter(|p| p.is_setup_pr).collect();
        setup.sort_by_key(|p| p.created_at);
        let setup_prs = setup
            .iter()
            .map(|p| SetupPr {
                repo_name: p.repo_name.clone(),
                pr_number: p.pr_number,
            })
            .collect();

        let test_prs: Vec<&PullRequestRow> =
            rows.pull_requests.iter().filter(|p| !p.is_setup_pr).collect();
        let open_test_prs = test_prs
            .iter()
            .filter(|p| p.is_test_pr && p.merged_at.is_none())
            .map(|p| OpenTestPr {
                owner_name: p.owner_name.clone(),
                repo_name: p.repo_name.clone(),
                pr_number: p.pr_number,
            })
            .collect();
        let last_activity_at = rows
            .pull_requests
            .iter()
            .flat_map(|p| [Some(p.created_at), p.merged_at])
            .flatten()
            .max();

        let (lines_total, lines_covered) = line_totals(&rows.coverage);
        let has_owner_coverage = lines_total > 0;
        let owner_coverage_pct =
            has_owner_coverage.then(|| lines_covered as f64 * 100.0 / lines_total as f64);
        let coverage_benchmark = has_owner_coverage
            .then(|| self.benchmark_for(owner_id, lines_total))
            .flatten();

        let scheduled_repo_count = rows
            .repositories
            .iter()
            .filter(|r| r.trigger_on_schedule)
            .count();
        let unscheduled_repo_names = rows
            .repositories
            .iter()
            .filter(|r| !r.trigger_on_schedule)
            .map(|r| r.repo_name.clone())
            .collect();

        let credit_balance_usd: Option<f64> =
            (!rows.credits.is_empty()).then(|| rows.credits.iter().map(|c| c.amount_usd).sum());

        let last_email_sent_at = rows
            .sends
            .iter()
            .filter(|s| s.status == SendStatus::Sent)
            .map(|s| s.created_at)
            .max();

        let churn = if uninstalled_at.is_some() {
            ChurnKind::Uninstalled
        } else if owner.canceled_at.is_some() {
            ChurnKind::Downgraded
        } else if last_activity_at.unwrap_or(installed_at) + self.dormant_after <= as_of {
            ChurnKind::Dormant
        } else {
            ChurnKind::Active
        };

        Ok(OwnerContext {
            owner_id,
            owner_name: owner.owner_name.clone(),
            as_of,
            installed_at,
            uninstalled_at,
            canceled_at: owner.canceled_at,
            churn,
            has_setup_pr: !setup.is_empty(),
            has_setup_pr_merged: setup.iter().any(|p| p.merged_at.is_some()),
            setup_prs,
            pr_count: test_prs.len(),
            merged_pr_count: test_prs.iter().filter(|p| p.merged_at.is_some()).count(),
            open_test_prs,
            last_activity_at,
            has_owner_coverage,
            owner_coverage_pct,
            coverage_repo_count: rows.coverage.iter().filter(|c| c.lines_total > 0).count(),
            total_repo_count: rows.repositories.len(),
            repo_most_needing_coverage: repo_most_needing_coverage(&rows.coverage),
            coverage_benchmark,
            has_target_branch: rows.repositories.iter().any(|r| {
                r.target_branch
                    .as_deref()
                    .is_some_and(|b| !b.trim().is_empty())
            }),
            scheduled_repo_count,
            unscheduled_repo_names,
            has_purchased_credits: rows.credits.iter().any(|c| c.kind.is_paid()),
            has_active_subscription: owner.has_active_subscription,
            has_auto_reload_enabled: owner.auto_reload_enabled,
            credit_balance_usd,
            last_email_sent_at,
        })
    }

    /// Best-covered other owner whose codebase is between half and double
    /// this owner's size.
    fn benchmark_for(&self, owner_id: OwnerId, lines_total: i64) -> Option<CoverageBenchmark> {
        let lo = lines_total / 2;
        let hi = lines_total.saturating_mul(2);
        self.coverage_totals
            .iter()
            .filter(|t| t.owner_id != owner_id && (lo..=hi).contains(&t.lines_total))
            // Ascending owner_id + max_by keeps the last maximum; reverse so
            // ties go to the lowest id.
            .rev()
            .max_by(|a, b| a.pct().total_cmp(&b.pct()))
            .map(|t| CoverageBenchmark {
                lines_total: t.lines_total,
                coverage_pct: t.pct(),
            })
    }
}

fn line_totals(coverage: &[CoverageRow]) -> (i64, i64) {
    coverage
        .iter()
        .filter(|c| c.lines_total > 0)
        .fold((0, 0), |(t, c), row| {
            (t + row.lines_total, c + row.lines_covered.min(row.lines_total))
        })
}

/// Lowest-covered repository; on equal coverage the larger one wins.
fn repo_most_needing_coverage(coverage: &[CoverageRow]) -> Option<String> {
    coverage
        .iter()
        .filter(|c| c.lines_total > 0)
        .min_by(|a, b| {
            a.pct()
                .total_cmp(&b.pct())
                .then(b.lines_total.cmp(&a.lines_total))
                .then(a.repo_name.cmp(&b.repo_name))
        })
        .map(|c| c.repo_name.clone())
}
