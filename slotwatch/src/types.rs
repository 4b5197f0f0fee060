//! Common type definitions shared across the engine.
//!
//! - Type aliases for entity IDs ([`WatchId`], [`UserId`])
//! - [`ScanTier`]: urgent vs normal scan frequency bucket
//! - [`WatchStatus`]: the watch lifecycle state machine
//! - [`Channel`]: notification delivery channels

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// Type aliases for IDs
pub type WatchId = Uuid;
pub type UserId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

/// Scan frequency bucket, determined by proximity of a watch's target date.
///
/// Watches whose target date is within 24 hours scan on the urgent cadence;
/// everything else scans on the normal cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanTier {
    Urgent,
    Normal,
}

impl ScanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanTier::Urgent => "urgent",
            ScanTier::Normal => "normal",
        }
    }
}

impl fmt::Display for ScanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Watch lifecycle states.
///
/// `active -> notified -> booked`; `active -> cancelled`; `active -> expired`.
/// `notified` and `booked` are terminal with respect to further notification,
/// but a user may still cancel such a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchStatus {
    Active,
    Notified,
    Booked,
    Cancelled,
    Expired,
}

impl WatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchStatus::Active => "active",
            WatchStatus::Notified => "notified",
            WatchStatus::Booked => "booked",
            WatchStatus::Cancelled => "cancelled",
            WatchStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for WatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification delivery channel. Part of the ledger dedup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
    Push,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Push => "push",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abbrev_uuid_takes_first_8_chars() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(abbrev_uuid(&id), "550e8400");
    }

    #[test]
    fn tier_round_trips_through_serde() {
        let tier: ScanTier = serde_json::from_str("\"urgent\"").unwrap();
        assert_eq!(tier, ScanTier::Urgent);
        assert_eq!(serde_json::to_string(&ScanTier::Normal).unwrap(), "\"normal\"");
    }
}
