use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{types::Type, Connection, Result};

/// Initialise every table the engine reads or writes. Safe to call on every
/// startup: CREATE IF NOT EXISTS means it's idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_owners_table(conn)?;
    create_installations_table(conn)?;
    create_repositories_table(conn)?;
    create_pull_requests_table(conn)?;
    create_coverage_table(conn)?;
    create_credits_table(conn)?;
    create_email_sends_table(conn)?;
    Ok(())
}

fn create_owners_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS owners (
            owner_id                INTEGER PRIMARY KEY NOT NULL,
            owner_name              TEXT NOT NULL,
            owner_type              TEXT NOT NULL DEFAULT 'User',
            email                   TEXT,
            first_name              TEXT,
            has_active_subscription INTEGER NOT NULL DEFAULT 0,
            auto_reload_enabled     INTEGER NOT NULL DEFAULT 0,
            canceled_at             TEXT
        );",
    )
}

fn create_installations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS installations (
            installation_id INTEGER PRIMARY KEY NOT NULL,
            owner_id        INTEGER NOT NULL,
            installed_at    TEXT NOT NULL,
            uninstalled_at  TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_installations_owner
            ON installations (owner_id);",
    )
}

fn create_repositories_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS repositories (
            owner_id            INTEGER NOT NULL,
            repo_name           TEXT NOT NULL,
            target_branch       TEXT,               -- NULL = default branch
            trigger_on_schedule INTEGER NOT NULL DEFAULT 0,
            UNIQUE(owner_id, repo_name)
        );",
    )
}

fn create_pull_requests_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS pull_requests (
            owner_id    INTEGER NOT NULL,
            owner_name  TEXT NOT NULL,
            repo_name   TEXT NOT NULL,
            pr_number   INTEGER NOT NULL,
            is_setup_pr INTEGER NOT NULL DEFAULT 0,
            is_test_pr  INTEGER NOT NULL DEFAULT 0,
            merged_at   TEXT,
            created_at  TEXT NOT NULL,
            UNIQUE(owner_id, repo_name, pr_number)
        );",
    )
}

fn create_coverage_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS coverage_snapshots (
            owner_id      INTEGER NOT NULL,
            repo_name     TEXT NOT NULL,
            lines_total   INTEGER NOT NULL DEFAULT 0,
            lines_covered INTEGER NOT NULL DEFAULT 0,
            updated_at    TEXT NOT NULL,
            UNIQUE(owner_id, repo_name)
        );",
    )
}

fn create_credits_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS credits (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id         INTEGER NOT NULL,
            amount_usd       REAL NOT NULL,
            transaction_type TEXT NOT NULL,
            created_at       TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_credits_owner
            ON credits (owner_id);",
    )
}

fn create_email_sends_table(conn: &Connection) -> Result<()> {
    // UNIQUE(owner_id, email_type) is the only thing standing between two
    // overlapping runs and a duplicate email. Do not relax it.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS email_sends (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id        INTEGER NOT NULL,
            owner_name      TEXT NOT NULL,
            email_type      TEXT NOT NULL,
            status          TEXT NOT NULL,      -- reserved | sent | skipped
            resend_email_id TEXT,
            reservation_id  TEXT,               -- set while reserved; only its holder may confirm or release
            replied_at      TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            UNIQUE(owner_id, email_type)
        );
        CREATE INDEX IF NOT EXISTS idx_email_sends_status
            ON email_sends (status, created_at);",
    )
}

/// Canonical timestamp text. Fixed width and always `Z`, so string
/// comparison in SQL orders the same way as time.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_ts(idx: usize, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn get_ts(row: &rusqlite::Row<'_>, idx: usize) -> Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(idx, &raw)
}

pub(crate) fn get_opt_ts(row: &rusqlite::Row<'_>, idx: usize) -> Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => parse_ts(idx, &raw).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn init_db_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('owners', 'installations', 'repositories', 'pull_requests',
                              'coverage_snapshots', 'credits', 'email_sends')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 7);
    }

    #[test]
    fn timestamps_sort_lexically() {
        let early = Utc.with_ymd_and_hms(2026, 1, 9, 23, 59, 59).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        assert!(fmt_ts(early) < fmt_ts(late));
        assert_eq!(parse_ts(0, &fmt_ts(late)).unwrap(), late);
    }

    #[test]
    fn bad_timestamp_is_a_conversion_error() {
        assert!(matches!(
            parse_ts(3, "yesterday"),
            Err(rusqlite::Error::FromSqlConversionFailure(3, Type::Text, _))
        ));
    }
}
