//! Notification and auto-book dispatch.
//!
//! The scan executor emits [`DispatchAction`]s onto a bounded queue; the
//! dispatcher drains it with capped concurrency, dedups against the
//! notification ledger, retries transient send failures, and records the
//! outcome. Delivery never blocks a scan cycle.

pub mod dispatcher;
pub mod email;
pub mod sms;

use chrono::{NaiveDate, NaiveTime};

use crate::db::models::ScannableWatch;

pub use dispatcher::{DispatchHandle, NotificationDispatcher};
pub use email::EmailService;
pub use sms::SmsSender;

/// Which delivery the action asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Email,
    Sms,
    AutoBook,
}

/// The matched slot, snapshotted at match time. Inventory is re-checked
/// only by the booking call itself; notifications describe what the scan
/// saw.
#[derive(Debug, Clone)]
pub struct MatchedSlot {
    pub location_key: String,
    pub location_name: String,
    pub slot_date: NaiveDate,
    pub slot_time: NaiveTime,
    pub party_size: i32,
    pub reserved_ts: Option<i64>,
    pub reservation_type_id: Option<i64>,
}

/// One unit of dispatch work.
#[derive(Debug, Clone)]
pub struct DispatchAction {
    pub kind: ActionKind,
    pub watch: ScannableWatch,
    pub slot: MatchedSlot,
}
