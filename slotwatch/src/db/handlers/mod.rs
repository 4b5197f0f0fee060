//! Repository implementations, one per table.
//!
//! Each repository wraps a `&mut PgConnection` and encapsulates all queries
//! for its entity. Callers acquire a connection (or transaction) from the
//! pool and hand it to the repository.

pub mod history;
pub mod notification_log;
pub mod sessions;
pub mod watches;

pub use history::ScanHistory;
pub use notification_log::NotificationLog;
pub use sessions::Sessions;
pub use watches::Watches;
