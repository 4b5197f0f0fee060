//! `FromRow` records for the engine's tables.

pub mod history;
pub mod notifications;
pub mod watches;

pub use history::{ScanHistoryEntry, SlotDrop};
pub use notifications::{NewNotificationLogEntry, NotificationLogEntry};
pub use watches::{ScannableWatch, Watch};
