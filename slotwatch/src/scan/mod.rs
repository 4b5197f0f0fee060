//! Watch scanning: grouping, matching, cycle execution, scheduling, and
//! slot-drop detection.
//!
//! ```text
//! Scheduler tick (per tier)
//!   └─ ScanExecutor::run_cycle(tier)
//!        ├─ expire past watches, load + tier-filter eligible watches
//!        ├─ group by (location, date, party_size)        [grouper]
//!        ├─ fetch inventory, batched under the cap       [executor]
//!        ├─ match slots to watches                       [matcher]
//!        ├─ enqueue dispatch actions ───────────────▶ dispatch queue
//!        ├─ append scan history + drop detection         [drops]
//!        └─ bump last_scanned, report CycleOutcome
//! ```

pub mod drops;
pub mod executor;
pub mod grouper;
pub mod matcher;
pub mod scheduler;

pub use executor::{CycleOutcome, ScanExecutor};
pub use scheduler::Scheduler;
