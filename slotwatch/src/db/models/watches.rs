//! Database records for watches and their owning users.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::types::WatchStatus;

/// A user's standing request to be alerted about a reservation slot.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Watch {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Key into the location registry (e.g. "peachtree")
    pub location_key: String,
    /// Party size, 1-20 (enforced by a check constraint)
    pub party_size: i32,
    pub target_date: NaiveDate,
    /// Start of the acceptable time window (inclusive)
    pub time_start: NaiveTime,
    /// End of the acceptable time window (exclusive)
    pub time_end: NaiveTime,
    /// Attempt to book the slot automatically on match
    pub auto_book: bool,
    pub book_first_name: Option<String>,
    pub book_last_name: Option<String>,
    pub book_phone: Option<String>,
    pub book_email: Option<String>,
    /// Lifecycle state, see [`WatchStatus`]
    pub status: String,
    pub created_at: DateTime<Utc>,
    /// Monotonically non-decreasing; bumped after every scan cycle the
    /// watch participated in, matched or not
    pub last_scanned: Option<DateTime<Utc>>,
    pub notified_at: Option<DateTime<Utc>>,
    pub booked_at: Option<DateTime<Utc>>,
}

impl Watch {
    pub fn is_active(&self) -> bool {
        self.status == WatchStatus::Active.as_str()
    }

    /// Whether the watch carries the contact fields an auto-book attempt needs.
    pub fn has_booking_contact(&self) -> bool {
        self.book_first_name.as_deref().is_some_and(|s| !s.is_empty())
            && self.book_phone.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// A watch joined with its owner's contact details, as loaded for scanning.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScannableWatch {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub watch: Watch,
    pub user_email: String,
    pub user_name: Option<String>,
    pub user_phone: Option<String>,
}

impl ScannableWatch {
    /// Preferred phone for SMS: the booking phone if present, else the
    /// account phone.
    pub fn notify_phone(&self) -> Option<&str> {
        self.watch
            .book_phone
            .as_deref()
            .filter(|p| !p.is_empty())
            .or(self.user_phone.as_deref().filter(|p| !p.is_empty()))
    }

    /// Preferred email for booking confirmations.
    pub fn booking_email(&self) -> &str {
        self.watch
            .book_email
            .as_deref()
            .filter(|e| !e.is_empty())
            .unwrap_or(&self.user_email)
    }
}
