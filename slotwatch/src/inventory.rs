//! Inventory provider client.
//!
//! Fetches available slots for a (location, date, party size) tuple and
//! performs the black-box "attempt reservation" call for auto-booking. The
//! provider paginates inventory around a search timestamp, so one logical
//! fetch fans out to a few anchor hours across the day and merges the
//! results by display time.
//!
//! Stateless; every failure here is transient from the engine's point of
//! view and is retried on the next scan cadence.

use chrono::{NaiveDate, NaiveTime};
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::InventoryConfig;
use crate::errors::{Error, Result};
use crate::locations::Location;

/// Hours of day around which inventory is queried. The provider returns a
/// window of slots per query; these anchors cover lunch through late dinner.
const ANCHOR_HOURS: [u32; 3] = [12, 17, 21];

/// A bookable slot reported by the provider. Ephemeral; exists only within
/// one scan cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct InventorySlot {
    pub time: NaiveTime,
    pub available: bool,
    /// Party sizes the slot is offered for
    pub party_sizes: Vec<i32>,
    /// Provider booking handle
    pub reserved_ts: Option<i64>,
    pub reservation_type_id: Option<i64>,
}

/// Booking contact details for an auto-book attempt.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub party_size: i32,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub reserved_ts: i64,
    pub reservation_type_id: i64,
}

#[derive(Debug, Deserialize)]
struct InventoryResponse {
    #[serde(default)]
    types: Vec<ReservationTypeBlock>,
}

#[derive(Debug, Deserialize)]
struct ReservationTypeBlock {
    reservation_type_id: Option<i64>,
    #[serde(default)]
    times: Vec<RawSlot>,
}

#[derive(Debug, Deserialize)]
struct RawSlot {
    display_time: Option<String>,
    is_available: Option<i64>,
    reserved_ts: Option<i64>,
    party_sizes: Option<Vec<i32>>,
}

/// HTTP client for the inventory provider.
pub struct InventoryClient {
    client: Client,
    base_url: String,
    fetch_timeout: Duration,
    booking_timeout: Duration,
}

impl InventoryClient {
    pub fn new(config: &InventoryConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("Origin", HeaderValue::from_static("https://reservations.getwisely.com"));
        headers.insert("Referer", HeaderValue::from_static("https://reservations.getwisely.com/"));
        headers.insert(
            "User-Agent",
            HeaderValue::from_static("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Configuration {
                message: format!("failed to build inventory HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            fetch_timeout: config.fetch_timeout,
            booking_timeout: config.booking_timeout,
        })
    }

    /// Fetch the slots offered for a location on a date at a party size.
    ///
    /// Queries one window per anchor hour and merges by display time,
    /// keeping the first observation for each time. Fails only if every
    /// anchor query fails; a partial day is better than no day.
    pub async fn fetch_slots(&self, location: &Location, date: NaiveDate, party_size: i32) -> Result<Vec<InventorySlot>> {
        let mut merged: BTreeMap<NaiveTime, InventorySlot> = BTreeMap::new();
        let mut successes = 0usize;
        let mut last_error = None;

        for anchor in ANCHOR_HOURS {
            match self.fetch_window(location, date, party_size, anchor).await {
                Ok(slots) => {
                    successes += 1;
                    for slot in slots {
                        merged.entry(slot.time).or_insert(slot);
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        location = location.key,
                        %date,
                        anchor,
                        error = %e,
                        "Inventory window fetch failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        if successes == 0 {
            return Err(last_error.unwrap_or_else(|| Error::TransientFetch {
                context: format!("{}/{date}/party{party_size}", location.key),
                message: "no anchor windows fetched".to_string(),
            }));
        }

        Ok(merged.into_values().collect())
    }

    async fn fetch_window(
        &self,
        location: &Location,
        date: NaiveDate,
        party_size: i32,
        anchor_hour: u32,
    ) -> Result<Vec<InventorySlot>> {
        let context = format!("{}/{date}/party{party_size}@{anchor_hour}h", location.key);
        let search_ts = date
            .and_hms_opt(anchor_hour, 0, 0)
            .ok_or_else(|| Error::TransientFetch {
                context: context.clone(),
                message: format!("invalid anchor hour {anchor_hour}"),
            })?
            .and_utc()
            .timestamp_millis();

        let url = format!("{}/v2/web/reservations/inventory", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.fetch_timeout)
            .query(&[
                ("merchant_id", location.merchant_id.to_string()),
                ("party_size", party_size.to_string()),
                ("search_ts", search_ts.to_string()),
                ("show_reservation_types", "1".to_string()),
                ("limit", "20".to_string()),
            ])
            .send()
            .await
            .map_err(|e| Error::TransientFetch {
                context: context.clone(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(Error::TransientFetch {
                context,
                message: format!("HTTP {}", response.status().as_u16()),
            });
        }

        let payload: InventoryResponse = response.json().await.map_err(|e| Error::TransientFetch {
            context: context.clone(),
            message: format!("malformed payload: {e}"),
        })?;

        let mut slots = Vec::new();
        for block in payload.types {
            for raw in block.times {
                let Some(display_time) = raw.display_time.as_deref() else {
                    continue;
                };
                let Some(time) = parse_display_time(display_time) else {
                    tracing::debug!(context = %context, display_time = display_time, "Unparseable display time, skipping");
                    continue;
                };
                slots.push(InventorySlot {
                    time,
                    available: raw.is_available == Some(1),
                    party_sizes: raw.party_sizes.clone().unwrap_or_else(|| vec![party_size]),
                    reserved_ts: raw.reserved_ts,
                    reservation_type_id: block.reservation_type_id,
                });
            }
        }

        Ok(slots)
    }

    /// Attempt to book a slot. Returns true when the provider confirms the
    /// reservation (a party record in the response), false on a well-formed
    /// rejection; transport and payload failures are transient errors.
    pub async fn book(&self, location: &Location, request: &BookingRequest) -> Result<bool> {
        let context = format!("book:{}", location.key);
        let payload = json!({
            "merchant_id": location.merchant_id,
            "party_size": request.party_size,
            "reserved_ts": request.reserved_ts,
            "name": format!("{} {}", request.first_name, request.last_name),
            "first_name": request.first_name,
            "last_name": request.last_name,
            "email": request.email,
            "phone": request.phone,
            "country_code": "US",
            "reservation_type_id": request.reservation_type_id,
            "source": "web",
            "marketing_opt_in": false,
        });

        let response = self
            .client
            .post(format!("{}/v2/web/reservations", self.base_url))
            .timeout(self.booking_timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::TransientDispatch {
                channel: context.clone(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(Error::TransientDispatch {
                channel: context,
                message: format!("HTTP {}", response.status().as_u16()),
            });
        }

        let body: serde_json::Value = response.json().await.map_err(|e| Error::TransientDispatch {
            channel: context,
            message: format!("malformed booking response: {e}"),
        })?;

        Ok(body.get("party").is_some_and(|p| !p.is_null()))
    }
}

/// Parse a provider display time: "18:00" or "6:00 PM".
pub fn parse_display_time(display: &str) -> Option<NaiveTime> {
    let trimmed = display.trim();
    NaiveTime::parse_from_str(trimmed, "%I:%M %p")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .ok()
}
