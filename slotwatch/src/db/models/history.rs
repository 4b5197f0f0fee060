//! Database records for the scan history stream and derived slot drops.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One observed (location, date, time slot, availability) pair at a point
/// in time. Append-only; feeds slot-drop detection and analytics.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScanHistoryEntry {
    pub id: Uuid,
    pub location: String,
    pub scan_date: NaiveDate,
    pub time_slot: NaiveTime,
    /// Comma-separated party sizes the slot was offered for, if known
    pub party_sizes: Option<String>,
    pub available: bool,
    pub scanned_at: DateTime<Utc>,
}

/// A detected appearance of a slot and, once observed gone, its
/// disappearance. At most one open drop (gone_at is null) exists per
/// (location, slot_date, slot_time) key.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SlotDrop {
    pub id: Uuid,
    pub location: String,
    pub slot_date: NaiveDate,
    pub slot_time: NaiveTime,
    pub appeared_at: DateTime<Utc>,
    pub gone_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
