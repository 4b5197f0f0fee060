//! Grouping of scannable watches into distinct inventory queries.
//!
//! Two watches that share a location, target date, and party size are
//! satisfied by the same upstream inventory response, so we fetch each
//! combination once per cycle regardless of how many watches point at it.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::db::models::ScannableWatch;

/// Key for one upstream inventory fetch: `(location, date, party_size)`.
pub type GroupKey = (String, NaiveDate, i32);

/// Buckets watches by fetch key. Pure, order of the output groups is
/// unspecified but membership within a group preserves input order.
pub fn group_watches(watches: Vec<ScannableWatch>) -> HashMap<GroupKey, Vec<ScannableWatch>> {
    let mut groups: HashMap<GroupKey, Vec<ScannableWatch>> = HashMap::new();
    for watch in watches {
        let key = (
            watch.watch.location_key.clone(),
            watch.watch.target_date,
            watch.watch.party_size,
        );
        groups.entry(key).or_default().push(watch);
    }
    groups
}
