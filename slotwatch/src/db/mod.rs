//! Database layer for the watch store, notification ledger, and scan history.
//!
//! Built on SQLx with PostgreSQL, following a repository-per-table pattern:
//! [`handlers`] hold the queries, [`models`] are the `FromRow` records, and
//! [`errors`] classifies `sqlx::Error` into cases the engine can handle
//! (notably unique violations, which the dispatcher treats as "already
//! notified").

pub mod errors;
pub mod handlers;
pub mod models;
