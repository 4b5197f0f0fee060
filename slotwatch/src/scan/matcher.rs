//! Slot-to-watch matching.
//!
//! All functions here are pure over in-memory data so the matching rules
//! can be tested without a database or network.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

use crate::db::models::{ScannableWatch, Watch};
use crate::inventory::InventorySlot;

/// A watch is satisfied only by slots starting this close to now (or by
/// an auto-book watch) before SMS is worth the interruption.
pub const SMS_IMMINENCE_WINDOW: Duration = Duration::hours(2);

/// Whether a single slot satisfies a watch.
///
/// The time window is half-open: `time_start` is included, `time_end` is
/// not, so adjacent watches never double-claim a boundary slot.
pub fn slot_satisfies(watch: &Watch, slot: &InventorySlot) -> bool {
    slot.available
        && slot.time >= watch.time_start
        && slot.time < watch.time_end
        && slot.party_sizes.contains(&watch.party_size)
}

/// The earliest qualifying slot for a watch, or `None`.
///
/// `slots` must be sorted ascending by time, which is how the inventory
/// client returns them.
pub fn first_match<'a>(watch: &Watch, slots: &'a [InventorySlot]) -> Option<&'a InventorySlot> {
    slots.iter().find(|slot| slot_satisfies(watch, slot))
}

/// Match every watch in a fetch group against the group's slots.
///
/// Each watch gets at most one slot; one slot may satisfy several
/// watches, which is fine because a slot is not consumed by notifying.
pub fn match_group<'a>(
    watches: &'a [ScannableWatch],
    slots: &'a [InventorySlot],
) -> Vec<(&'a ScannableWatch, &'a InventorySlot)> {
    watches
        .iter()
        .filter_map(|watch| first_match(&watch.watch, slots).map(|slot| (watch, slot)))
        .collect()
}

/// Whether the slot starts between now and `window` from now. A slot
/// already underway is not imminent, it is gone.
///
/// Slot times are the provider's local naive values and are compared
/// against UTC wall time, so the window carries the venue's UTC offset
/// as slack.
pub fn starts_within(
    slot_date: NaiveDate,
    slot_time: NaiveTime,
    now: DateTime<Utc>,
    window: Duration,
) -> bool {
    let until_start = slot_date.and_time(slot_time).and_utc() - now;
    until_start >= Duration::zero() && until_start <= window
}

/// SMS goes out only when the user has a phone on file and either asked
/// for auto-booking or the slot starts within [`SMS_IMMINENCE_WINDOW`].
pub fn wants_sms(watch: &ScannableWatch, slot_date: NaiveDate, slot_time: NaiveTime, now: DateTime<Utc>) -> bool {
    watch.notify_phone().is_some()
        && (watch.watch.auto_book || starts_within(slot_date, slot_time, now, SMS_IMMINENCE_WINDOW))
}
