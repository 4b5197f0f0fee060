//! Scan cycle execution.
//!
//! A cycle expires stale watches, loads and tier-filters the scannable
//! set, fans out one inventory fetch per (location, date, party size)
//! group under a concurrency cap, matches the returned slots against the
//! group's watches, and hands matches to the dispatch queue. The cycle
//! itself never sends anything.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::ScannerConfig;
use crate::db::handlers::{ScanHistory, Watches};
use crate::db::models::{ScannableWatch, Watch};
use crate::dispatch::{ActionKind, DispatchAction, MatchedSlot};
use crate::errors::{Error, Result};
use crate::inventory::{InventoryClient, InventorySlot};
use crate::locations;
use crate::scan::drops::{self, DropTransition};
use crate::scan::grouper::{self, GroupKey};
use crate::scan::matcher;
use crate::types::{ScanTier, abbrev_uuid};

/// Counters for one completed scan cycle.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct CycleOutcome {
    /// Watches whose inventory was actually fetched and matched
    pub scanned: usize,
    /// Watches whose group fetch failed this cycle
    pub skipped: usize,
    /// Watches that matched a slot
    pub matched: usize,
    /// Auto-book actions emitted (booking itself completes asynchronously)
    pub booked: usize,
}

/// Runs scan cycles against the database and inventory provider.
pub struct ScanExecutor {
    pool: PgPool,
    inventory: Arc<InventoryClient>,
    actions: mpsc::Sender<DispatchAction>,
    config: ScannerConfig,
}

impl ScanExecutor {
    pub fn new(
        pool: PgPool,
        inventory: Arc<InventoryClient>,
        actions: mpsc::Sender<DispatchAction>,
        config: ScannerConfig,
    ) -> Self {
        Self {
            pool,
            inventory,
            actions,
            config,
        }
    }

    /// Run one scan cycle for a tier.
    pub async fn run_cycle(&self, tier: ScanTier) -> Result<CycleOutcome> {
        let now = Utc::now();
        let today = now.date_naive();
        let mut outcome = CycleOutcome::default();

        let all = {
            let mut conn = self.pool.acquire().await?;
            let expired = Watches::new(&mut conn).expire_past(today).await?;
            if expired > 0 {
                tracing::info!(expired, "Expired past-date watches");
            }
            Watches::new(&mut conn).list_scannable(today).await?
        };

        let eligible: Vec<ScannableWatch> = all
            .into_iter()
            .filter(|w| eligible_for_tier(&w.watch, tier, now, self.config.normal_rescan_buffer))
            .collect();
        if eligible.is_empty() {
            tracing::debug!(%tier, "No watches due this cycle");
            return Ok(outcome);
        }

        let cycle_ids: Vec<Uuid> = eligible.iter().map(|w| w.watch.id).collect();
        let groups = grouper::group_watches(eligible);
        tracing::info!(%tier, watches = cycle_ids.len(), groups = groups.len(), "Scan cycle starting");

        let keys: Vec<GroupKey> = groups.keys().cloned().collect();
        let inventory = self.inventory.clone();
        let results = fetch_in_batches(
            keys,
            self.config.max_concurrent_fetches,
            self.config.batch_pacing,
            move |key: GroupKey| {
                let inventory = inventory.clone();
                async move {
                    let location = locations::lookup(&key.0).ok_or_else(|| Error::Configuration {
                        message: format!("unknown location key '{}'", key.0),
                    })?;
                    inventory.fetch_slots(location, key.1, key.2).await
                }
            },
        )
        .await;

        for (key, result) in results {
            let group = &groups[&key];
            match result {
                Ok(slots) => {
                    outcome.scanned += group.len();
                    if let Err(error) = self.record_observations(&key, &slots, now).await {
                        // History is an audit stream; a write failure must
                        // not cost anyone their notification.
                        tracing::warn!(location = %key.0, %error, "Failed to record scan history");
                    }
                    let matches = matcher::match_group(group, &slots);
                    outcome.matched += matches.len();
                    for (watch, slot) in matches {
                        outcome.booked += self.enqueue_actions(watch, slot, &key, now);
                    }
                }
                Err(error) => {
                    outcome.skipped += group.len();
                    tracing::warn!(
                        location = %key.0,
                        date = %key.1,
                        party_size = key.2,
                        %error,
                        "Group fetch failed, watches skipped this cycle"
                    );
                }
            }
        }

        {
            let mut conn = self.pool.acquire().await?;
            Watches::new(&mut conn).mark_scanned(&cycle_ids, now).await?;
        }

        tracing::info!(
            %tier,
            scanned = outcome.scanned,
            skipped = outcome.skipped,
            matched = outcome.matched,
            booked = outcome.booked,
            "Scan cycle finished"
        );
        Ok(outcome)
    }

    /// Append each observed slot to scan history and open or close slot
    /// drops on availability transitions.
    async fn record_observations(&self, key: &GroupKey, slots: &[InventorySlot], now: DateTime<Utc>) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        let party_sizes = key.2.to_string();
        for slot in slots {
            let mut history = ScanHistory::new(&mut conn);
            let previous = history.latest_availability(&key.0, key.1, slot.time).await?;
            history
                .record(&key.0, key.1, slot.time, Some(&party_sizes), slot.available, now)
                .await?;
            match drops::classify(previous, slot.available) {
                DropTransition::Opened => {
                    tracing::info!(location = %key.0, date = %key.1, time = %slot.time, "Slot reappeared, opening drop");
                    history.open_drop(&key.0, key.1, slot.time, now).await?;
                }
                DropTransition::Closed => {
                    history.close_open_drop(&key.0, key.1, slot.time, now).await?;
                }
                DropTransition::Unchanged => {}
            }
        }
        Ok(())
    }

    /// Queue the dispatch actions a match calls for. Returns the number of
    /// auto-book actions emitted (0 or 1).
    fn enqueue_actions(&self, watch: &ScannableWatch, slot: &InventorySlot, key: &GroupKey, now: DateTime<Utc>) -> usize {
        let matched = MatchedSlot {
            location_key: key.0.clone(),
            location_name: locations::display_name(&key.0).to_string(),
            slot_date: key.1,
            slot_time: slot.time,
            party_size: key.2,
            reserved_ts: slot.reserved_ts,
            reservation_type_id: slot.reservation_type_id,
        };

        let mut kinds = Vec::with_capacity(3);
        // Booking goes first; the slot may not stay available long.
        if watch.watch.auto_book && watch.watch.has_booking_contact() && slot.reserved_ts.is_some() {
            kinds.push(ActionKind::AutoBook);
        }
        kinds.push(ActionKind::Email);
        if matcher::wants_sms(watch, key.1, slot.time, now) {
            kinds.push(ActionKind::Sms);
        }

        let mut booked = 0;
        for kind in kinds {
            let action = DispatchAction {
                kind,
                watch: watch.clone(),
                slot: matched.clone(),
            };
            match self.actions.try_send(action) {
                Ok(()) => {
                    if kind == ActionKind::AutoBook {
                        booked += 1;
                    }
                }
                Err(error) => {
                    // Safe to drop: the ledger has no entry, so the next
                    // cycle re-matches and re-emits.
                    tracing::warn!(
                        watch_id = %abbrev_uuid(&watch.watch.id),
                        ?kind,
                        %error,
                        "Dispatch queue rejected action"
                    );
                }
            }
        }
        booked
    }
}

/// Whether a watch belongs to this cycle's tier.
///
/// Urgent covers watches whose target date starts within 24 hours; normal
/// covers the rest, and additionally sits out watches scanned within the
/// rescan buffer so back-to-back ticks do not reissue identical fetches.
pub(crate) fn eligible_for_tier(
    watch: &Watch,
    tier: ScanTier,
    now: DateTime<Utc>,
    rescan_buffer: Duration,
) -> bool {
    let until_target = watch.target_date.and_time(NaiveTime::MIN).and_utc() - now;
    let urgent = until_target < chrono::Duration::hours(24);
    match tier {
        ScanTier::Urgent => urgent,
        ScanTier::Normal => {
            if urgent {
                return false;
            }
            match watch.last_scanned {
                None => true,
                Some(last) => (now - last).to_std().unwrap_or(Duration::ZERO) >= rescan_buffer,
            }
        }
    }
}

/// Run `fetch` over every key, at most `batch_size` in flight at once,
/// sleeping `pacing` between batches. Each key's failure is independent.
pub(crate) async fn fetch_in_batches<K, T, F, Fut>(
    keys: Vec<K>,
    batch_size: usize,
    pacing: Duration,
    fetch: F,
) -> Vec<(K, Result<T>)>
where
    K: Clone,
    F: Fn(K) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let batch_size = batch_size.max(1);
    let mut results = Vec::with_capacity(keys.len());
    for (index, batch) in keys.chunks(batch_size).enumerate() {
        if index > 0 && !pacing.is_zero() {
            tokio::time::sleep(pacing).await;
        }
        let in_flight = batch.iter().cloned().map(|key| {
            let fut = fetch(key.clone());
            async move { (key, fut.await) }
        });
        results.extend(join_all(in_flight).await);
    }
    results
}
