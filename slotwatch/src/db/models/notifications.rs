//! Database records for the append-only notification ledger.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One dispatch attempt, success or failure. Never mutated after insert.
///
/// The partial unique index on (watch_id, channel, slot_date, slot_time)
/// where status = 'sent' is the dedup key: at most one successful send per
/// channel for a given watch + slot identity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationLogEntry {
    pub id: Uuid,
    pub watch_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub channel: String,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    /// "sent", "failed", or "bounced"
    pub status: String,
    pub error_message: Option<String>,
    pub slot_date: NaiveDate,
    pub slot_time: NaiveTime,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a ledger entry.
#[derive(Debug, Clone)]
pub struct NewNotificationLogEntry {
    pub watch_id: Uuid,
    pub user_id: Uuid,
    pub channel: String,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    pub status: String,
    pub error_message: Option<String>,
    pub slot_date: NaiveDate,
    pub slot_time: NaiveTime,
}
