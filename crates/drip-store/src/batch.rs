//! Bulk read of every table the context builder needs, plus the snapshot
//! import that keeps the local mirror in sync with the product database.

use std::collections::BTreeSet;

use drip_core::rows::{
    CoverageRow, CreditRow, InstallationRow, OwnerRow, PullRequestRow, RepositoryRow, SendRow,
};
use drip_core::{CreditKind, EmailType, OwnerId, RawBatch, SendStatus};
use rusqlite::{params, Connection};
use tracing::{info, instrument, warn};

use crate::db::{fmt_ts, get_opt_ts, get_ts};
use crate::error::Result;
use crate::store::SqliteStore;

/// Where owner data comes from. A run loads it exactly once.
pub trait OwnerSource: Send + Sync {
    /// Fetch every row for every owner. An error here aborts the run.
    fn load_batch(&self) -> Result<RawBatch>;
}

impl OwnerSource for SqliteStore {
    #[instrument(skip(self))]
    fn load_batch(&self) -> Result<RawBatch> {
        let conn = self.conn();
        let batch = RawBatch {
            owners: load_owners(&conn)?,
            installations: load_installations(&conn)?,
            repositories: load_repositories(&conn)?,
            pull_requests: load_pull_requests(&conn)?,
            coverage: load_coverage(&conn)?,
            credits: load_credits(&conn)?,
            sends: load_sends(&conn)?,
        };
        info!(
            owners = batch.owners.len(),
            pull_requests = batch.pull_requests.len(),
            sends = batch.sends.len(),
            "batch loaded"
        );
        Ok(batch)
    }
}

fn load_owners(conn: &Connection) -> Result<Vec<OwnerRow>> {
    let mut stmt = conn.prepare(
        "SELECT owner_id, owner_name, owner_type, email, first_name,
                has_active_subscription, auto_reload_enabled, canceled_at
         FROM owners ORDER BY owner_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(OwnerRow {
            owner_id: row.get(0)?,
            owner_name: row.get(1)?,
            owner_type: row.get(2)?,
            email: row.get(3)?,
            first_name: row.get(4)?,
            has_active_subscription: row.get(5)?,
            auto_reload_enabled: row.get(6)?,
            canceled_at: get_opt_ts(row, 7)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn load_installations(conn: &Connection) -> Result<Vec<InstallationRow>> {
    let mut stmt = conn.prepare(
        "SELECT installation_id, owner_id, installed_at, uninstalled_at
         FROM installations ORDER BY installed_at",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(InstallationRow {
            installation_id: row.get(0)?,
            owner_id: row.get(1)?,
            installed_at: get_ts(row, 2)?,
            uninstalled_at: get_opt_ts(row, 3)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn load_repositories(conn: &Connection) -> Result<Vec<RepositoryRow>> {
    let mut stmt = conn.prepare(
        "SELECT owner_id, repo_name, target_branch, trigger_on_schedule
         FROM repositories ORDER BY owner_id, repo_name",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(RepositoryRow {
            owner_id: row.get(0)?,
            repo_name: row.get(1)?,
            target_branch: row.get(2)?,
            trigger_on_schedule: row.get(3)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn load_pull_requests(conn: &Connection) -> Result<Vec<PullRequestRow>> {
    let mut stmt = conn.prepare(
        "SELECT owner_id, owner_name, repo_name, pr_number, is_setup_pr, is_test_pr,
                merged_at, created_at
         FROM pull_requests ORDER BY created_at",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(PullRequestRow {
            owner_id: row.get(0)?,
            owner_name: row.get(1)?,
            repo_name: row.get(2)?,
            pr_number: row.get(3)?,
            is_setup_pr: row.get(4)?,
            is_test_pr: row.get(5)?,
            merged_at: get_opt_ts(row, 6)?,
            created_at: get_ts(row, 7)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn load_coverage(conn: &Connection) -> Result<Vec<CoverageRow>> {
    let mut stmt = conn.prepare(
        "SELECT owner_id, repo_name, lines_total, lines_covered, updated_at
         FROM coverage_snapshots ORDER BY owner_id, repo_name",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(CoverageRow {
            owner_id: row.get(0)?,
            repo_name: row.get(1)?,
            lines_total: row.get(2)?,
            lines_covered: row.get(3)?,
            updated_at: get_ts(row, 4)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn load_credits(conn: &Connection) -> Result<Vec<CreditRow>> {
    let mut stmt = conn.prepare(
        "SELECT owner_id, amount_usd, transaction_type, created_at
         FROM credits ORDER BY created_at",
    )?;
    let rows = stmt.query_map([], |row| {
        let kind: String = row.get(2)?;
        Ok((row.get::<_, OwnerId>(0)?, row.get::<_, f64>(1)?, kind, get_ts(row, 3)?))
    })?;

    let mut credits = Vec::new();
    for row in rows {
        let (owner_id, amount_usd, kind, created_at) = row?;
        match kind.parse::<CreditKind>() {
            Ok(kind) => credits.push(CreditRow {
                owner_id,
                amount_usd,
                kind,
                created_at,
            }),
            Err(e) => warn!(owner_id, error = %e, "skipping credit row"),
        }
    }
    Ok(credits)
}

fn load_sends(conn: &Connection) -> Result<Vec<SendRow>> {
    let mut stmt = conn.prepare(
        "SELECT owner_id, owner_name, email_type, status, resend_email_id, replied_at, created_at
         FROM email_sends ORDER BY created_at",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, OwnerId>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
            get_opt_ts(row, 5)?,
            get_ts(row, 6)?,
        ))
    })?;

    let mut sends = Vec::new();
    for row in rows {
        let (owner_id, owner_name, email_type, status, resend_email_id, replied_at, created_at) =
            row?;
        // Retired email types stay in the table; they no longer gate anything.
        let Ok(email_type) = email_type.parse::<EmailType>() else {
            warn!(owner_id, email_type = %email_type, "ignoring send of unknown type");
            continue;
        };
        let status = match status.parse::<SendStatus>() {
            Ok(s) => s,
            Err(e) => {
                warn!(owner_id, error = %e, "ignoring send with unknown status");
                continue;
            }
        };
        sends.push(SendRow {
            owner_id,
            owner_name,
            email_type,
            status,
            resend_email_id,
            replied_at,
            created_at,
        });
    }
    Ok(sends)
}

impl SqliteStore {
    /// Upsert a snapshot exported from the product database.
    ///
    /// Owner, installation, repository, PR and coverage rows are keyed and
    /// overwritten. Credits are replaced wholesale per owner present in the
    /// snapshot. Sends are only inserted where no ledger row exists yet, so
    /// an import never undoes a send this engine recorded.
    ///
    /// Returns the number of rows written.
    #[instrument(skip(self, batch), fields(owners = batch.owners.len()))]
    pub fn import_batch(&self, batch: &RawBatch) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut written = 0usize;

        for o in &batch.owners {
            written += tx.execute(
                "INSERT INTO owners
                 (owner_id, owner_name, owner_type, email, first_name,
                  has_active_subscription, auto_reload_enabled, canceled_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(owner_id) DO UPDATE SET
                    owner_name = excluded.owner_name,
                    owner_type = excluded.owner_type,
                    email = excluded.email,
                    first_name = excluded.first_name,
                    has_active_subscription = excluded.has_active_subscription,
                    auto_reload_enabled = excluded.auto_reload_enabled,
                    canceled_at = excluded.canceled_at",
                params![
                    o.owner_id,
                    o.owner_name,
                    o.owner_type,
                    o.email,
                    o.first_name,
                    o.has_active_subscription,
                    o.auto_reload_enabled,
                    o.canceled_at.map(fmt_ts),
                ],
            )?;
        }

        for i in &batch.installations {
            written += tx.execute(
                "INSERT INTO installations (installation_id, owner_id, installed_at, uninstalled_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(installation_id) DO UPDATE SET
                    owner_id = excluded.owner_id,
                    installed_at = excluded.installed_at,
                    uninstalled_at = excluded.uninstalled_at",
                params![
                    i.installation_id,
                    i.owner_id,
                    fmt_ts(i.installed_at),
                    i.uninstalled_at.map(fmt_ts),
                ],
            )?;
        }

        for r in &batch.repositories {
            written += tx.execute(
                "INSERT INTO repositories (owner_id, repo_name, target_branch, trigger_on_schedule)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(owner_id, repo_name) DO UPDATE SET
                    target_branch = excluded.target_branch,
                    trigger_on_schedule = excluded.trigger_on_schedule",
                params![r.owner_id, r.repo_name, r.target_branch, r.trigger_on_schedule],
            )?;
        }

        for pr in &batch.pull_requests {
            written += tx.execute(
                "INSERT INTO pull_requests
                 (owner_id, owner_name, repo_name, pr_number, is_setup_pr, is_test_pr,
                  merged_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(owner_id, repo_name, pr_number) DO UPDATE SET
                    owner_name = excluded.owner_name,
                    is_setup_pr = excluded.is_setup_pr,
                    is_test_pr = excluded.is_test_pr,
                    merged_at = excluded.merged_at",
                params![
                    pr.owner_id,
                    pr.owner_name,
                    pr.repo_name,
                    pr.pr_number,
                    pr.is_setup_pr,
                    pr.is_test_pr,
                    pr.merged_at.map(fmt_ts),
                    fmt_ts(pr.created_at),
                ],
            )?;
        }

        for c in &batch.coverage {
            written += tx.execute(
                "INSERT INTO coverage_snapshots
                 (owner_id, repo_name, lines_total, lines_covered, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(owner_id, repo_name) DO UPDATE SET
                    lines_total = excluded.lines_total,
                    lines_covered = excluded.lines_covered,
                    updated_at = excluded.updated_at",
                params![
                    c.owner_id,
                    c.repo_name,
                    c.lines_total,
                    c.lines_covered,
                    fmt_ts(c.updated_at),
                ],
            )?;
        }

        let credit_owners: BTreeSet<OwnerId> = batch.credits.iter().map(|c| c.owner_id).collect();
        for owner_id in &credit_owners {
            tx.execute("DELETE FROM credits WHERE owner_id = ?1", params![owner_id])?;
        }
        for c in &batch.credits {
            written += tx.execute(
                "INSERT INTO credits (owner_id, amount_usd, transaction_type, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![c.owner_id, c.amount_usd, c.kind.to_string(), fmt_ts(c.created_at)],
            )?;
        }

        for s in &batch.sends {
            let created = fmt_ts(s.created_at);
            written += tx.execute(
                "INSERT INTO email_sends
                 (owner_id, owner_name, email_type, status, resend_email_id, replied_at,
                  created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT(owner_id, email_type) DO NOTHING",
                params![
                    s.owner_id,
                    s.owner_name,
                    s.email_type.as_str(),
                    s.status.to_string(),
                    s.resend_email_id,
                    s.replied_at.map(fmt_ts),
                    created,
                ],
            )?;
        }

        tx.commit()?;
        info!(written, "snapshot imported");
        Ok(written)
    }
}
