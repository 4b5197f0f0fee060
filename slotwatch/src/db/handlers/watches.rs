//! Database repository for the watch store.
//!
//! Status transitions out of `active` performed here are guarded on the
//! current status, so a concurrent cancel or expiry is never resurrected
//! by a slower scan or dispatch path.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::db::errors::Result;
use crate::db::models::watches::{ScannableWatch, Watch};
use crate::types::{WatchId, WatchStatus, abbrev_uuid};

/// Repository for watch operations.
pub struct Watches<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Watches<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Get a watch by ID.
    #[instrument(skip(self), fields(watch_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: WatchId) -> Result<Option<Watch>> {
        let watch = sqlx::query_as::<_, Watch>("SELECT * FROM watches WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(watch)
    }

    /// Load all scan-eligible watches with their owners' contact details:
    /// `status = 'active'` and `target_date >= today`. Tier filtering is
    /// applied by the executor on top of this set.
    #[instrument(skip(self), err)]
    pub async fn list_scannable(&mut self, today: NaiveDate) -> Result<Vec<ScannableWatch>> {
        let watches = sqlx::query_as::<_, ScannableWatch>(
            r#"
            SELECT w.*, u.email AS user_email, u.name AS user_name, u.phone AS user_phone
            FROM watches w
            JOIN users u ON w.user_id = u.id
            WHERE w.status = 'active' AND w.target_date >= $1
            ORDER BY w.created_at
            "#,
        )
        .bind(today)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(watches)
    }

    /// Bump `last_scanned` for every watch in a completed cycle, matched or
    /// not. Monotonic: a stale timestamp never overwrites a newer one.
    /// Never touches status.
    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    pub async fn mark_scanned(&mut self, ids: &[Uuid], now: DateTime<Utc>) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE watches SET last_scanned = $2
            WHERE id = ANY($1) AND (last_scanned IS NULL OR last_scanned < $2)
            "#,
        )
        .bind(ids)
        .bind(now)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected())
    }

    /// Transition an active watch to `notified`. Returns false if the watch
    /// was no longer active (cancelled, expired, or already past notified).
    #[instrument(skip(self), fields(watch_id = %abbrev_uuid(&id)), err)]
    pub async fn mark_notified(&mut self, id: WatchId, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE watches SET status = 'notified', notified_at = $2
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Transition a watch to `booked` after a confirmed auto-book. The
    /// guard accepts `notified` too, since the email send for the same
    /// match may have landed first.
    #[instrument(skip(self), fields(watch_id = %abbrev_uuid(&id)), err)]
    pub async fn mark_booked(&mut self, id: WatchId, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE watches SET status = 'booked', booked_at = $2
            WHERE id = $1 AND status IN ('active', 'notified')
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// User-facing cancel. Allowed from any non-terminal-for-cancel state;
    /// `notified` and `booked` watches may still be cancelled.
    #[instrument(skip(self), fields(watch_id = %abbrev_uuid(&id)), err)]
    pub async fn cancel(&mut self, id: WatchId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE watches SET status = 'cancelled'
            WHERE id = $1 AND status IN ('active', 'notified', 'booked')
            "#,
        )
        .bind(id)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Expiry sweep: `active` watches whose target date has passed become
    /// `expired`. Returns the number of watches expired.
    #[instrument(skip(self), err)]
    pub async fn expire_past(&mut self, today: NaiveDate) -> Result<u64> {
        let result = sqlx::query("UPDATE watches SET status = 'expired' WHERE status = 'active' AND target_date < $1")
            .bind(today)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }

    /// Count active watches. Used for the startup connectivity check.
    pub async fn count_active(&mut self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM watches WHERE status = $1")
            .bind(WatchStatus::Active.as_str())
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count.0)
    }

    /// Current status of a watch, if it exists. Cheap pre-flight check for
    /// the dispatcher before attempting a booking.
    pub async fn get_status(&mut self, id: WatchId) -> Result<Option<String>> {
        let status: Option<(String,)> = sqlx::query_as("SELECT status FROM watches WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(status.map(|s| s.0))
    }
}
