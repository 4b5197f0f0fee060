//! Database repository for scan history and derived slot drops.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;

use crate::db::errors::Result;

/// Repository for the append-only scan history stream and the slot-drop
/// records derived from it.
pub struct ScanHistory<'c> {
    db: &'c mut PgConnection,
}

impl<'c> ScanHistory<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Most recent recorded availability for a slot key, if any. Read
    /// before appending the current observation so the drop detector sees
    /// the prior state.
    pub async fn latest_availability(
        &mut self,
        location: &str,
        scan_date: NaiveDate,
        time_slot: NaiveTime,
    ) -> Result<Option<bool>> {
        let row: Option<(bool,)> = sqlx::query_as(
            r#"
            SELECT available FROM scan_history
            WHERE location = $1 AND scan_date = $2 AND time_slot = $3
            ORDER BY scanned_at DESC
            LIMIT 1
            "#,
        )
        .bind(location)
        .bind(scan_date)
        .bind(time_slot)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(row.map(|r| r.0))
    }

    /// Append one observation.
    #[instrument(skip(self), err)]
    pub async fn record(
        &mut self,
        location: &str,
        scan_date: NaiveDate,
        time_slot: NaiveTime,
        party_sizes: Option<&str>,
        available: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scan_history (location, scan_date, time_slot, party_sizes, available, scanned_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(location)
        .bind(scan_date)
        .bind(time_slot)
        .bind(party_sizes)
        .bind(available)
        .bind(now)
        .execute(&mut *self.db)
        .await?;

        Ok(())
    }

    /// Open a slot drop for an unavailable -> available transition. The
    /// partial unique index keeps at most one open drop per key; a
    /// concurrent open is a no-op.
    #[instrument(skip(self), err)]
    pub async fn open_drop(
        &mut self,
        location: &str,
        slot_date: NaiveDate,
        slot_time: NaiveTime,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO slot_drops (location, slot_date, slot_time, appeared_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (location, slot_date, slot_time) WHERE gone_at IS NULL
            DO NOTHING
            "#,
        )
        .bind(location)
        .bind(slot_date)
        .bind(slot_time)
        .bind(now)
        .execute(&mut *self.db)
        .await?;

        Ok(())
    }

    /// Close the open drop for a key, if one exists. Idempotent: a second
    /// close affects zero rows.
    #[instrument(skip(self), err)]
    pub async fn close_open_drop(
        &mut self,
        location: &str,
        slot_date: NaiveDate,
        slot_time: NaiveTime,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE slot_drops SET gone_at = $4
            WHERE location = $1 AND slot_date = $2 AND slot_time = $3 AND gone_at IS NULL
            "#,
        )
        .bind(location)
        .bind(slot_date)
        .bind(slot_time)
        .bind(now)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected())
    }
}
