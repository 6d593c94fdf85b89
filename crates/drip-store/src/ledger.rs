use std::collections::HashSet;

use chrono::{DateTime, Utc};
use drip_core::{EmailType, OwnerId, SendStatus};
use rusqlite::params;
use tracing::{debug, info, instrument, warn};

use crate::db::fmt_ts;
use crate::error::{Result, StoreError};
use crate::store::SqliteStore;

/// Durable record of which email types each owner has been handled for.
///
/// Every write is guarded by UNIQUE(owner_id, email_type), so the ledger
/// itself is what makes sends idempotent across overlapping runs.
pub trait SendLedger: Send + Sync {
    /// Insert a finished row. `Some(id)` records a delivered send,
    /// `None` records a skip. Returns `false` if a row already existed.
    fn record_send(
        &self,
        owner_id: OwnerId,
        owner_name: &str,
        email_type: EmailType,
        resend_email_id: Option<&str>,
    ) -> Result<bool>;

    /// Take the slot for `(owner_id, email_type)` before delivering, tagged
    /// with the caller's `reservation_id`. Returns `false` when another run
    /// already holds or finished it.
    fn reserve(
        &self,
        owner_id: OwnerId,
        owner_name: &str,
        email_type: EmailType,
        reservation_id: &str,
    ) -> Result<bool>;

    /// Turn the caller's own reservation into a sent row. A reservation
    /// swept and retaken by another run is not ours: `NotReserved`.
    fn confirm(
        &self,
        owner_id: OwnerId,
        email_type: EmailType,
        reservation_id: &str,
        resend_email_id: &str,
    ) -> Result<()>;

    /// Drop the caller's own reservation after a failed delivery so a later
    /// run can retry. Finished rows and other runs' reservations are never
    /// touched.
    fn release(&self, owner_id: OwnerId, email_type: EmailType, reservation_id: &str)
        -> Result<bool>;

    /// Release reservations created before `older_than`. Returns how many.
    fn release_stale(&self, older_than: DateTime<Utc>) -> Result<usize>;

    /// Email types with any ledger row for this owner, whatever its status.
    fn list_sent_types(&self, owner_id: OwnerId) -> Result<HashSet<EmailType>>;

    /// Stamp `replied_at` on the owner's most recent delivered email.
    /// Returns `false` when there is nothing to stamp.
    fn mark_replied(&self, owner_id: OwnerId, at: DateTime<Utc>) -> Result<bool>;
}

impl SqliteStore {
    fn insert_send(
        &self,
        owner_id: OwnerId,
        owner_name: &str,
        email_type: EmailType,
        status: SendStatus,
        resend_email_id: Option<&str>,
        reservation_id: Option<&str>,
    ) -> Result<bool> {
        let now = fmt_ts(Utc::now());
        let inserted = self.conn().execute(
            "INSERT INTO email_sends
             (owner_id, owner_name, email_type, status, resend_email_id, reservation_id,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(owner_id, email_type) DO NOTHING",
            params![
                owner_id,
                owner_name,
                email_type.as_str(),
                status.to_string(),
                resend_email_id,
                reservation_id,
                now
            ],
        )?;
        Ok(inserted == 1)
    }
}

impl SendLedger for SqliteStore {
    #[instrument(skip(self, owner_name), fields(email_type = %email_type))]
    fn record_send(
        &self,
        owner_id: OwnerId,
        owner_name: &str,
        email_type: EmailType,
        resend_email_id: Option<&str>,
    ) -> Result<bool> {
        let status = if resend_email_id.is_some() {
            SendStatus::Sent
        } else {
            SendStatus::Skipped
        };
        let inserted =
            self.insert_send(owner_id, owner_name, email_type, status, resend_email_id, None)?;
        if !inserted {
            debug!("ledger row already present");
        }
        Ok(inserted)
    }

    #[instrument(skip(self, owner_name), fields(email_type = %email_type))]
    fn reserve(
        &self,
        owner_id: OwnerId,
        owner_name: &str,
        email_type: EmailType,
        reservation_id: &str,
    ) -> Result<bool> {
        self.insert_send(
            owner_id,
            owner_name,
            email_type,
            SendStatus::Reserved,
            None,
            Some(reservation_id),
        )
    }

    #[instrument(skip(self), fields(email_type = %email_type))]
    fn confirm(
        &self,
        owner_id: OwnerId,
        email_type: EmailType,
        reservation_id: &str,
        resend_email_id: &str,
    ) -> Result<()> {
        let changed = self.conn().execute(
            "UPDATE email_sends
             SET status = 'sent', resend_email_id = ?1, reservation_id = NULL, updated_at = ?2
             WHERE owner_id = ?3 AND email_type = ?4 AND status = 'reserved'
               AND reservation_id = ?5",
            params![
                resend_email_id,
                fmt_ts(Utc::now()),
                owner_id,
                email_type.as_str(),
                reservation_id
            ],
        )?;
        if changed == 0 {
            warn!("delivered email had no reservation to confirm");
            return Err(StoreError::NotReserved {
                owner_id,
                email_type,
            });
        }
        Ok(())
    }

    #[instrument(skip(self), fields(email_type = %email_type))]
    fn release(
        &self,
        owner_id: OwnerId,
        email_type: EmailType,
        reservation_id: &str,
    ) -> Result<bool> {
        let deleted = self.conn().execute(
            "DELETE FROM email_sends
             WHERE owner_id = ?1 AND email_type = ?2 AND status = 'reserved'
               AND reservation_id = ?3",
            params![owner_id, email_type.as_str(), reservation_id],
        )?;
        Ok(deleted == 1)
    }

    #[instrument(skip(self))]
    fn release_stale(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let released = self.conn().execute(
            "DELETE FROM email_sends WHERE status = 'reserved' AND created_at < ?1",
            params![fmt_ts(older_than)],
        )?;
        if released > 0 {
            info!(released, "released stale reservations");
        }
        Ok(released)
    }

    fn list_sent_types(&self, owner_id: OwnerId) -> Result<HashSet<EmailType>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT email_type FROM email_sends WHERE owner_id = ?1")?;
        let rows = stmt.query_map(params![owner_id], |row| row.get::<_, String>(0))?;

        let mut types = HashSet::new();
        for raw in rows {
            let raw = raw?;
            match raw.parse::<EmailType>() {
                Ok(t) => {
                    types.insert(t);
                }
                Err(_) => debug!(owner_id, email_type = %raw, "ignoring unknown email type"),
            }
        }
        Ok(types)
    }

    #[instrument(skip(self))]
    fn mark_replied(&self, owner_id: OwnerId, at: DateTime<Utc>) -> Result<bool> {
        let ts = fmt_ts(at);
        let changed = self.conn().execute(
            "UPDATE email_sends
             SET replied_at = ?1, updated_at = ?1
             WHERE id = (
                 SELECT id FROM email_sends
                 WHERE owner_id = ?2 AND status = 'sent'
                 ORDER BY created_at DESC, id DESC
                 LIMIT 1
             )",
            params![ts, owner_id],
        )?;
        Ok(changed == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_blocks_a_second_reservation() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.reserve(1, "acme", EmailType::Coverage50, "r1").unwrap());
        assert!(!store.reserve(1, "acme", EmailType::Coverage50, "r2").unwrap());
        // Different owner, same type: independent slot.
        assert!(store.reserve(2, "globex", EmailType::Coverage50, "r3").unwrap());
    }

    #[test]
    fn confirm_without_reservation_is_an_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store
            .confirm(1, EmailType::SalvageCheckin, "r1", "re_1")
            .unwrap_err();
        assert!(matches!(err, StoreError::NotReserved { owner_id: 1, .. }));
    }

    #[test]
    fn only_the_holder_can_confirm_or_release() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.reserve(1, "acme", EmailType::Coverage50, "mine").unwrap());

        assert!(!store.release(1, EmailType::Coverage50, "theirs").unwrap());
        assert!(matches!(
            store.confirm(1, EmailType::Coverage50, "theirs", "re_x"),
            Err(StoreError::NotReserved { .. })
        ));

        store.confirm(1, EmailType::Coverage50, "mine", "re_1").unwrap();
        assert!(!store.release(1, EmailType::Coverage50, "mine").unwrap());
    }
}
