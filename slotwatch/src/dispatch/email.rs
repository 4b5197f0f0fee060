//! Email delivery over lettre, with a file transport for development.

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::{EmailConfig, EmailTransportConfig};
use crate::db::models::ScannableWatch;
use crate::dispatch::MatchedSlot;
use crate::errors::{Error, Result};

/// Addresses at these domains are placeholder accounts; sending to them
/// only burns provider quota.
const TEST_DOMAINS: [&str; 3] = ["test.com", "example.com", "fake.com"];

pub fn is_test_address(email: &str) -> bool {
    email
        .rsplit_once('@')
        .is_some_and(|(_, domain)| TEST_DOMAINS.contains(&domain.to_ascii_lowercase().as_str()))
}

enum Transport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

/// Sends slot-found notifications.
pub struct EmailService {
    transport: Transport,
    from: Mailbox,
    booking_url: String,
}

impl EmailService {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let from: Mailbox = format!("{} <{}>", config.from_name, config.from_email)
            .parse()
            .map_err(|e| Error::Configuration {
                message: format!("invalid email.from_email: {e}"),
            })?;

        let transport = match &config.transport {
            EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                let builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host).map_err(|e| Error::Configuration {
                        message: format!("invalid SMTP relay '{host}': {e}"),
                    })?
                } else {
                    AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                };
                let transport = builder
                    .port(*port)
                    .credentials(Credentials::new(username.clone(), password.clone()))
                    .build();
                Transport::Smtp(transport)
            }
            EmailTransportConfig::File { path } => {
                std::fs::create_dir_all(path).map_err(|e| Error::Configuration {
                    message: format!("cannot create email output directory '{path}': {e}"),
                })?;
                Transport::File(AsyncFileTransport::new(std::path::PathBuf::from(path)))
            }
        };

        Ok(Self {
            transport,
            from,
            booking_url: config.booking_url.clone(),
        })
    }

    /// Subject and plain-text body for a slot-found notification.
    pub fn compose_slot_found(&self, watch: &ScannableWatch, slot: &MatchedSlot) -> (String, String) {
        let date = slot.slot_date.format("%A, %B %-d");
        let time = slot.slot_time.format("%-I:%M %p");
        let subject = format!("Table found at {} on {date}", slot.location_name);

        let greeting = watch
            .user_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .map(|n| format!("Hi {n},"))
            .unwrap_or_else(|| "Hi,".to_string());

        let closing = if watch.watch.auto_book {
            "We're attempting to book it for you automatically. You'll hear from us again once the booking settles.".to_string()
        } else {
            format!("Tables at this time rarely last long. Book now: {}", self.booking_url)
        };

        let body = format!(
            "{greeting}\n\nA table for {party} at {location} just opened up on {date} at {time}.\n\n{closing}\n",
            party = slot.party_size,
            location = slot.location_name,
        );

        (subject, body)
    }

    pub async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse().map_err(|e| Error::TransientDispatch {
                channel: "email".to_string(),
                message: format!("invalid recipient '{to}': {e}"),
            })?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| Error::TransientDispatch {
                channel: "email".to_string(),
                message: format!("failed to build message: {e}"),
            })?;

        let result = match &self.transport {
            Transport::Smtp(transport) => transport.send(message).await.map(drop).map_err(|e| e.to_string()),
            Transport::File(transport) => transport.send(message).await.map(drop).map_err(|e| e.to_string()),
        };

        result.map_err(|message| Error::TransientDispatch {
            channel: "email".to_string(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Watch;
    use chrono::{NaiveDate, NaiveTime, Utc};
    use uuid::Uuid;

    fn fixture(auto_book: bool, name: Option<&str>) -> (ScannableWatch, MatchedSlot) {
        let watch = ScannableWatch {
            watch: Watch {
                id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                location_key: "peachtree".to_string(),
                party_size: 4,
                target_date: NaiveDate::from_ymd_opt(2026, 9, 12).unwrap(),
                time_start: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
                time_end: NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
                auto_book,
                book_first_name: None,
                book_last_name: None,
                book_phone: None,
                book_email: None,
                status: "active".to_string(),
                created_at: Utc::now(),
                last_scanned: None,
                notified_at: None,
                booked_at: None,
            },
            user_email: "diner@dinersclub.net".to_string(),
            user_name: name.map(str::to_string),
            user_phone: None,
        };
        let slot = MatchedSlot {
            location_key: "peachtree".to_string(),
            location_name: "Houston's - Peachtree".to_string(),
            slot_date: NaiveDate::from_ymd_opt(2026, 9, 12).unwrap(),
            slot_time: NaiveTime::from_hms_opt(19, 30, 0).unwrap(),
            party_size: 4,
            reserved_ts: Some(1_700_000_000),
            reservation_type_id: Some(1681),
        };
        (watch, slot)
    }

    fn file_service(dir: &std::path::Path) -> EmailService {
        EmailService::new(&EmailConfig {
            enabled: true,
            from_email: "notifications@slotwatch.local".to_string(),
            from_name: "Slotwatch".to_string(),
            booking_url: "https://book.example.org".to_string(),
            transport: EmailTransportConfig::File {
                path: dir.to_string_lossy().to_string(),
            },
        })
        .unwrap()
    }

    #[test]
    fn test_addresses_are_recognized() {
        assert!(is_test_address("someone@test.com"));
        assert!(is_test_address("someone@EXAMPLE.COM"));
        assert!(is_test_address("a@fake.com"));
        assert!(!is_test_address("someone@gmail.com"));
        assert!(!is_test_address("not-an-email"));
    }

    #[test]
    fn notify_body_includes_booking_link() {
        let dir = tempfile::tempdir().unwrap();
        let service = file_service(dir.path());
        let (watch, slot) = fixture(false, Some("Ada"));

        let (subject, body) = service.compose_slot_found(&watch, &slot);
        assert!(subject.contains("Houston's - Peachtree"));
        assert!(body.starts_with("Hi Ada,"));
        assert!(body.contains("7:30 PM"));
        assert!(body.contains("https://book.example.org"));
    }

    #[test]
    fn auto_book_body_omits_booking_link() {
        let dir = tempfile::tempdir().unwrap();
        let service = file_service(dir.path());
        let (watch, slot) = fixture(true, None);

        let (_, body) = service.compose_slot_found(&watch, &slot);
        assert!(body.starts_with("Hi,"));
        assert!(body.contains("book it for you automatically"));
        assert!(!body.contains("https://book.example.org"));
    }

    #[tokio::test]
    async fn file_transport_writes_an_eml() {
        let dir = tempfile::tempdir().unwrap();
        let service = file_service(dir.path());
        let (watch, slot) = fixture(false, None);
        let (subject, body) = service.compose_slot_found(&watch, &slot);

        service.send("diner@dinersclub.net", &subject, &body).await.unwrap();

        let written = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(written, 1);
    }
}
