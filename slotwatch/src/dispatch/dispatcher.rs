//! Background dispatcher for notification and auto-book actions.
//!
//! One task drains the action queue; each action is processed on its own
//! task under a semaphore so a slow SMTP handshake never stalls the
//! queue. Delivery is at-least-once attempted, exactly-once recorded:
//! the ledger's partial unique index arbitrates concurrent sends for the
//! same (watch, channel, slot).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::DispatchConfig;
use crate::db::handlers::{NotificationLog, Watches};
use crate::db::models::notifications::NewNotificationLogEntry;
use crate::dispatch::email::{self, EmailService};
use crate::dispatch::sms::{self, SmsSender};
use crate::dispatch::{ActionKind, DispatchAction};
use crate::errors::{Error, Result};
use crate::inventory::{BookingRequest, InventoryClient};
use crate::locations;
use crate::types::{Channel, WatchStatus, abbrev_uuid};

/// Cloneable producer side of the dispatch queue.
#[derive(Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<DispatchAction>,
}

impl DispatchHandle {
    pub fn sender(&self) -> mpsc::Sender<DispatchAction> {
        self.tx.clone()
    }
}

struct DispatchContext {
    pool: PgPool,
    inventory: Arc<InventoryClient>,
    email: Option<Arc<EmailService>>,
    sms: Option<Arc<SmsSender>>,
    config: DispatchConfig,
}

pub struct NotificationDispatcher;

impl NotificationDispatcher {
    /// Start the dispatcher task. Disabled channels are passed as `None`;
    /// actions for them are acknowledged and dropped.
    pub fn spawn(
        pool: PgPool,
        inventory: Arc<InventoryClient>,
        email: Option<Arc<EmailService>>,
        sms: Option<Arc<SmsSender>>,
        config: DispatchConfig,
        shutdown: CancellationToken,
    ) -> (DispatchHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let ctx = Arc::new(DispatchContext {
            pool,
            inventory,
            email,
            sms,
            config,
        });
        let task = tokio::spawn(run_dispatcher(ctx, rx, shutdown));
        (DispatchHandle { tx }, task)
    }
}

async fn run_dispatcher(ctx: Arc<DispatchContext>, mut rx: mpsc::Receiver<DispatchAction>, shutdown: CancellationToken) {
    let semaphore = Arc::new(Semaphore::new(ctx.config.max_concurrent_sends.max(1)));
    tracing::info!(
        email = ctx.email.is_some(),
        sms = ctx.sms.is_some(),
        "Dispatcher started"
    );

    loop {
        tokio::select! {
            maybe_action = rx.recv() => {
                let Some(action) = maybe_action else { break };
                let Ok(permit) = semaphore.clone().acquire_owned().await else { break };
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(error) = process_action(&ctx, &action).await {
                        tracing::error!(
                            watch_id = %abbrev_uuid(&action.watch.watch.id),
                            kind = ?action.kind,
                            %error,
                            "Dispatch action failed"
                        );
                    }
                });
            }
            _ = shutdown.cancelled() => {
                tracing::info!("Dispatcher shutting down");
                break;
            }
        }
    }
}

async fn process_action(ctx: &DispatchContext, action: &DispatchAction) -> Result<()> {
    match action.kind {
        ActionKind::Email => send_email(ctx, action).await,
        ActionKind::Sms => send_sms(ctx, action).await,
        ActionKind::AutoBook => attempt_booking(ctx, action).await,
    }
}

async fn send_email(ctx: &DispatchContext, action: &DispatchAction) -> Result<()> {
    let Some(service) = &ctx.email else {
        tracing::debug!("Email channel disabled, dropping action");
        return Ok(());
    };
    let recipient = action.watch.user_email.clone();
    if email::is_test_address(&recipient) {
        tracing::debug!(recipient, "Placeholder address, dropping action");
        return Ok(());
    }
    if already_sent(ctx, action, Channel::Email).await? {
        return Ok(());
    }

    let (subject, body) = service.compose_slot_found(&action.watch, &action.slot);
    let sent = with_retries(&ctx.config, || service.send(&recipient, &subject, &body)).await;
    record_outcome(ctx, action, Channel::Email, &recipient, Some(subject), body, sent).await
}

async fn send_sms(ctx: &DispatchContext, action: &DispatchAction) -> Result<()> {
    let Some(sender) = &ctx.sms else {
        tracing::debug!("SMS channel disabled, dropping action");
        return Ok(());
    };
    let Some(phone) = action.watch.notify_phone().map(str::to_string) else {
        return Ok(());
    };
    if already_sent(ctx, action, Channel::Sms).await? {
        return Ok(());
    }

    let body = sms::slot_found_body(&action.slot, action.watch.watch.auto_book);
    let sent = with_retries(&ctx.config, || sender.send(&phone, &body)).await;
    record_outcome(ctx, action, Channel::Sms, &phone, None, body, sent).await
}

async fn attempt_booking(ctx: &DispatchContext, action: &DispatchAction) -> Result<()> {
    let watch = &action.watch.watch;

    // The watch may have been cancelled, or booked by a faster cycle,
    // between match and dequeue.
    {
        let mut conn = ctx.pool.acquire().await?;
        match Watches::new(&mut conn).get_status(watch.id).await? {
            Some(status) if status == WatchStatus::Active.as_str() => {}
            Some(status) => {
                tracing::debug!(watch_id = %abbrev_uuid(&watch.id), status, "Watch no longer active, skipping booking");
                return Ok(());
            }
            None => return Ok(()),
        }
    }

    let location = locations::lookup(&action.slot.location_key).ok_or_else(|| Error::Configuration {
        message: format!("unknown location key '{}'", action.slot.location_key),
    })?;
    let Some(reserved_ts) = action.slot.reserved_ts else {
        tracing::warn!(watch_id = %abbrev_uuid(&watch.id), "Matched slot has no booking handle, skipping booking");
        return Ok(());
    };

    let request = BookingRequest {
        party_size: action.slot.party_size,
        first_name: watch.book_first_name.clone().unwrap_or_default(),
        last_name: watch.book_last_name.clone().unwrap_or_default(),
        email: action.watch.booking_email().to_string(),
        phone: watch.book_phone.clone().unwrap_or_default(),
        reserved_ts,
        reservation_type_id: action
            .slot
            .reservation_type_id
            .unwrap_or(i64::from(location.reservation_type_id)),
    };

    let confirmed = with_retries(&ctx.config, || ctx.inventory.book(location, &request)).await?;
    if !confirmed {
        // The slot was taken under us. The watch stays active and the
        // next cycle matches whatever is still open.
        tracing::info!(
            watch_id = %abbrev_uuid(&watch.id),
            location = location.key,
            "Booking rejected by provider, watch stays active"
        );
        return Ok(());
    }

    {
        let mut conn = ctx.pool.acquire().await?;
        Watches::new(&mut conn).mark_booked(watch.id, Utc::now()).await?;
    }
    tracing::info!(
        watch_id = %abbrev_uuid(&watch.id),
        location = location.key,
        date = %action.slot.slot_date,
        time = %action.slot.slot_time,
        "Auto-book confirmed"
    );

    // Best-effort confirmation text; the booking already stands.
    if let (Some(sender), Some(phone)) = (&ctx.sms, action.watch.notify_phone()) {
        let body = format!(
            "Slotwatch: booked! {} for {} on {} at {}.",
            action.slot.location_name,
            action.slot.party_size,
            action.slot.slot_date.format("%-m/%-d"),
            action.slot.slot_time.format("%-I:%M %p"),
        );
        if let Err(error) = sender.send(phone, &body).await {
            tracing::warn!(watch_id = %abbrev_uuid(&watch.id), %error, "Booking confirmation text failed");
        }
    }

    Ok(())
}

async fn already_sent(ctx: &DispatchContext, action: &DispatchAction, channel: Channel) -> Result<bool> {
    let mut conn = ctx.pool.acquire().await?;
    let sent = NotificationLog::new(&mut conn)
        .was_sent(action.watch.watch.id, channel, action.slot.slot_date, action.slot.slot_time)
        .await?;
    if sent {
        tracing::debug!(
            watch_id = %abbrev_uuid(&action.watch.watch.id),
            %channel,
            "Already notified for this slot, dropping action"
        );
    }
    Ok(sent)
}

/// Record the send outcome in the ledger and, on success, transition the
/// watch to notified. A unique violation on the success insert means a
/// concurrent dispatch won the slot; the action is abandoned quietly.
async fn record_outcome(
    ctx: &DispatchContext,
    action: &DispatchAction,
    channel: Channel,
    recipient: &str,
    subject: Option<String>,
    body: String,
    sent: Result<()>,
) -> Result<()> {
    let now = Utc::now();
    let mut conn = ctx.pool.acquire().await?;
    let mut entry = NewNotificationLogEntry {
        watch_id: action.watch.watch.id,
        user_id: action.watch.watch.user_id,
        channel: channel.as_str().to_string(),
        recipient: recipient.to_string(),
        subject,
        body,
        status: "sent".to_string(),
        error_message: None,
        slot_date: action.slot.slot_date,
        slot_time: action.slot.slot_time,
    };

    match sent {
        Ok(()) => {
            if let Err(db_error) = NotificationLog::new(&mut conn).append(&entry).await {
                let error = Error::from(db_error);
                if error.is_already_notified() {
                    tracing::debug!(
                        watch_id = %abbrev_uuid(&action.watch.watch.id),
                        %channel,
                        "Concurrent dispatch recorded this slot first"
                    );
                    return Ok(());
                }
                return Err(error);
            }
            let transitioned = Watches::new(&mut conn).mark_notified(action.watch.watch.id, now).await?;
            tracing::info!(
                watch_id = %abbrev_uuid(&action.watch.watch.id),
                %channel,
                recipient,
                transitioned,
                "Notification sent"
            );
            Ok(())
        }
        Err(error) => {
            entry.status = "failed".to_string();
            entry.error_message = Some(error.to_string());
            NotificationLog::new(&mut conn).append(&entry).await?;
            Err(error)
        }
    }
}

/// Exponential backoff delay before retry `attempt` (0-based): doubles
/// from the base, clamped at the cap.
pub(crate) fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt)).min(cap)
}

async fn with_retries<T, F, Fut>(config: &DispatchConfig, op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_error = None;
    for attempt in 0..config.max_attempts {
        if attempt > 0 {
            tokio::time::sleep(backoff_delay(attempt - 1, config.backoff_base, config.backoff_cap)).await;
        }
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                tracing::warn!(attempt = attempt + 1, max = config.max_attempts, %error, "Send attempt failed");
                last_error = Some(error);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| Error::Other(anyhow::anyhow!("retry loop made no attempts"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_doubles_from_base_and_clamps() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(30);
        assert_eq!(backoff_delay(0, base, cap), Duration::from_secs(1));
        assert_eq!(backoff_delay(1, base, cap), Duration::from_secs(2));
        assert_eq!(backoff_delay(2, base, cap), Duration::from_secs(4));
        assert_eq!(backoff_delay(10, base, cap), Duration::from_secs(30));
    }

    fn retry_config(max_attempts: u32) -> DispatchConfig {
        DispatchConfig {
            max_attempts,
            backoff_base: Duration::from_millis(10),
            backoff_cap: Duration::from_millis(40),
            ..DispatchConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_recover_from_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retries(&retry_config(3), || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(Error::TransientDispatch {
                        channel: "sms".to_string(),
                        message: "timeout".to_string(),
                    })
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_give_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retries(&retry_config(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(Error::TransientDispatch {
                    channel: "email".to_string(),
                    message: "connection refused".to_string(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    mod end_to_end {
        use super::*;
        use crate::config::{EmailConfig, EmailTransportConfig, InventoryConfig, SmsConfig};
        use crate::dispatch::MatchedSlot;
        use crate::test_utils::{WatchSeed, create_test_user, create_test_watch, scannable, sent_count, wait_until, watch_status};
        use chrono::NaiveTime;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn action(kind: ActionKind, watch: crate::db::models::ScannableWatch) -> DispatchAction {
            let slot_date = watch.watch.target_date;
            DispatchAction {
                kind,
                watch,
                slot: MatchedSlot {
                    location_key: "peachtree".to_string(),
                    location_name: locations::display_name("peachtree").to_string(),
                    slot_date,
                    slot_time: NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
                    party_size: 4,
                    reserved_ts: Some(1_700_000_000),
                    reservation_type_id: Some(1681),
                },
            }
        }

        fn spawn_dispatcher(
            pool: PgPool,
            server_uri: &str,
            email_dir: &std::path::Path,
            with_sms: bool,
        ) -> (DispatchHandle, CancellationToken) {
            let inventory = InventoryClient::new(&InventoryConfig {
                base_url: server_uri.to_string(),
                fetch_timeout: Duration::from_secs(2),
                booking_timeout: Duration::from_secs(2),
            })
            .unwrap();
            let email = EmailService::new(&EmailConfig {
                transport: EmailTransportConfig::File {
                    path: email_dir.to_string_lossy().into_owned(),
                },
                ..EmailConfig::default()
            })
            .unwrap();
            let sms = with_sms.then(|| {
                Arc::new(
                    SmsSender::new(&SmsConfig {
                        enabled: true,
                        account_sid: "AC123".to_string(),
                        auth_token: "secret".to_string(),
                        from_number: "+15550001111".to_string(),
                        base_url: server_uri.to_string(),
                        send_timeout: Duration::from_secs(2),
                    })
                    .unwrap(),
                )
            });
            let config = DispatchConfig {
                backoff_base: Duration::from_millis(10),
                backoff_cap: Duration::from_millis(40),
                ..DispatchConfig::default()
            };
            let shutdown = CancellationToken::new();
            let (handle, _task) = NotificationDispatcher::spawn(
                pool,
                Arc::new(inventory),
                Some(Arc::new(email)),
                sms,
                config,
                shutdown.clone(),
            );
            (handle, shutdown)
        }

        #[sqlx::test]
        async fn notification_is_ledgered_once_per_channel(pool: PgPool) {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/2010-04-01/Accounts/AC123/Messages.json"))
                .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"sid": "SM1"})))
                .mount(&server)
                .await;

            let user_id = create_test_user(&pool, "diner@dinersclub.net", Some("+14045559999")).await;
            let today = Utc::now().date_naive();
            let watch = create_test_watch(&pool, user_id, WatchSeed::on(today)).await;
            let watch_id = watch.id;
            let target = scannable(watch, "diner@dinersclub.net", Some("+14045559999"));

            let emails = tempfile::tempdir().unwrap();
            let (handle, shutdown) = spawn_dispatcher(pool.clone(), &server.uri(), emails.path(), true);

            let tx = handle.sender();
            tx.send(action(ActionKind::Email, target.clone())).await.unwrap();
            tx.send(action(ActionKind::Sms, target.clone())).await.unwrap();
            wait_until("both channels ledgered", || {
                let pool = pool.clone();
                async move { sent_count(&pool, watch_id).await == 2 }
            })
            .await;
            assert_eq!(watch_status(&pool, watch_id).await, "notified");

            // The same match re-emitted by a later cycle is dropped by the
            // ledger check and never re-sent.
            tx.send(action(ActionKind::Email, target.clone())).await.unwrap();
            tx.send(action(ActionKind::Sms, target)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
            assert_eq!(sent_count(&pool, watch_id).await, 2);
            assert_eq!(watch_status(&pool, watch_id).await, "notified");

            shutdown.cancel();
        }

        #[sqlx::test]
        async fn confirmed_auto_book_marks_the_watch_booked(pool: PgPool) {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/v2/web/reservations"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"party": {"id": 42}})))
                .expect(1)
                .mount(&server)
                .await;

            let user_id = create_test_user(&pool, "diner@dinersclub.net", None).await;
            let today = Utc::now().date_naive();
            let watch = create_test_watch(&pool, user_id, WatchSeed::on(today).auto_book()).await;
            let watch_id = watch.id;
            let target = scannable(watch, "diner@dinersclub.net", None);

            let emails = tempfile::tempdir().unwrap();
            let (handle, shutdown) = spawn_dispatcher(pool.clone(), &server.uri(), emails.path(), false);

            handle.sender().send(action(ActionKind::AutoBook, target)).await.unwrap();
            wait_until("watch booked", || {
                let pool = pool.clone();
                async move { watch_status(&pool, watch_id).await == "booked" }
            })
            .await;

            shutdown.cancel();
        }

        #[sqlx::test]
        async fn inactive_watch_is_not_booked(pool: PgPool) {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/v2/web/reservations"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"party": {"id": 42}})))
                .expect(0)
                .mount(&server)
                .await;

            let user_id = create_test_user(&pool, "diner@dinersclub.net", None).await;
            let today = Utc::now().date_naive();
            let watch = create_test_watch(&pool, user_id, WatchSeed::on(today).auto_book().status("cancelled")).await;
            let watch_id = watch.id;
            let target = scannable(watch, "diner@dinersclub.net", None);

            let emails = tempfile::tempdir().unwrap();
            let (handle, shutdown) = spawn_dispatcher(pool.clone(), &server.uri(), emails.path(), false);

            handle.sender().send(action(ActionKind::AutoBook, target)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
            assert_eq!(watch_status(&pool, watch_id).await, "cancelled");

            shutdown.cancel();
        }
    }
}
