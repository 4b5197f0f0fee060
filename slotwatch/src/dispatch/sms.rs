//! SMS delivery via a Twilio-compatible REST API.

use reqwest::Client;
use std::time::Duration;

use crate::config::SmsConfig;
use crate::dispatch::MatchedSlot;
use crate::errors::{Error, Result};

/// Sends slot-found texts.
pub struct SmsSender {
    client: Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
    timeout: Duration,
}

impl SmsSender {
    pub fn new(config: &SmsConfig) -> Result<Self> {
        let client = Client::builder().build().map_err(|e| Error::Configuration {
            message: format!("failed to build SMS HTTP client: {e}"),
        })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from_number: config.from_number.clone(),
            timeout: config.send_timeout,
        })
    }

    pub async fn send(&self, to: &str, body: &str) -> Result<()> {
        let url = format!("{}/2010-04-01/Accounts/{}/Messages.json", self.base_url, self.account_sid);
        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", self.from_number.as_str()), ("Body", body)])
            .send()
            .await
            .map_err(|e| Error::TransientDispatch {
                channel: "sms".to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::TransientDispatch {
                channel: "sms".to_string(),
                message: format!("HTTP {}: {detail}", status.as_u16()),
            });
        }

        Ok(())
    }
}

/// Texts are terse; the slot may be minutes away.
pub fn slot_found_body(slot: &MatchedSlot, auto_book: bool) -> String {
    let mut body = format!(
        "Slotwatch: table for {} at {} on {} at {}.",
        slot.party_size,
        slot.location_name,
        slot.slot_date.format("%-m/%-d"),
        slot.slot_time.format("%-I:%M %p"),
    );
    if auto_book {
        body.push_str(" Auto-booking now.");
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sender_for(base_url: &str) -> SmsSender {
        SmsSender::new(&SmsConfig {
            enabled: true,
            account_sid: "AC123".to_string(),
            auth_token: "secret".to_string(),
            from_number: "+15550001111".to_string(),
            base_url: base_url.to_string(),
            send_timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    #[test]
    fn body_mentions_slot_and_flags_auto_booking() {
        let slot = MatchedSlot {
            location_key: "peachtree".to_string(),
            location_name: "Houston's - Peachtree".to_string(),
            slot_date: NaiveDate::from_ymd_opt(2026, 9, 12).unwrap(),
            slot_time: NaiveTime::from_hms_opt(19, 30, 0).unwrap(),
            party_size: 4,
            reserved_ts: None,
            reservation_type_id: None,
        };
        let plain = slot_found_body(&slot, false);
        assert!(plain.contains("9/12"));
        assert!(plain.contains("7:30 PM"));
        assert!(!plain.contains("Auto-booking"));

        assert!(slot_found_body(&slot, true).contains("Auto-booking now."));
    }

    #[tokio::test]
    async fn send_posts_the_message_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2010-04-01/Accounts/AC123/Messages.json"))
            .and(body_string_contains("From=%2B15550001111"))
            .and(body_string_contains("Body=table+time"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"sid": "SM1"})))
            .expect(1)
            .mount(&server)
            .await;

        let sender = sender_for(&server.uri());
        sender.send("+14045551234", "table time").await.unwrap();
    }

    #[tokio::test]
    async fn provider_rejection_is_a_transient_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("authentication failed"))
            .mount(&server)
            .await;

        let sender = sender_for(&server.uri());
        let err = sender.send("+14045551234", "hello").await.unwrap_err();
        assert!(matches!(err, Error::TransientDispatch { .. }));
    }
}
