//! Database repository for the append-only notification ledger.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;

use crate::db::errors::Result;
use crate::db::models::notifications::{NewNotificationLogEntry, NotificationLogEntry};
use crate::types::{Channel, WatchId, abbrev_uuid};

/// Repository for notification ledger operations. Entries are only ever
/// inserted; no past entry is mutated.
pub struct NotificationLog<'c> {
    db: &'c mut PgConnection,
}

impl<'c> NotificationLog<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Whether a successful entry already exists for this (watch, channel,
    /// slot identity). This is the pre-dispatch dedup check; the partial
    /// unique index enforces the same key on insert.
    #[instrument(skip(self), fields(watch_id = %abbrev_uuid(&watch_id), channel = %channel), err)]
    pub async fn was_sent(
        &mut self,
        watch_id: WatchId,
        channel: Channel,
        slot_date: NaiveDate,
        slot_time: NaiveTime,
    ) -> Result<bool> {
        let exists: Option<(i32,)> = sqlx::query_as(
            r#"
            SELECT 1 FROM notification_log
            WHERE watch_id = $1 AND channel = $2 AND slot_date = $3 AND slot_time = $4
              AND status = 'sent'
            LIMIT 1
            "#,
        )
        .bind(watch_id)
        .bind(channel.as_str())
        .bind(slot_date)
        .bind(slot_time)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(exists.is_some())
    }

    /// Append one dispatch attempt. A `DbError::UniqueViolation` here means
    /// a concurrent attempt recorded a success first; callers treat it as
    /// "already notified" and abandon the attempt.
    #[instrument(skip(self, entry), fields(watch_id = %abbrev_uuid(&entry.watch_id), channel = %entry.channel, status = %entry.status), err)]
    pub async fn append(&mut self, entry: &NewNotificationLogEntry) -> Result<NotificationLogEntry> {
        let row = sqlx::query_as::<_, NotificationLogEntry>(
            r#"
            INSERT INTO notification_log
                (watch_id, user_id, channel, recipient, subject, body, status,
                 error_message, slot_date, slot_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(entry.watch_id)
        .bind(entry.user_id)
        .bind(&entry.channel)
        .bind(&entry.recipient)
        .bind(&entry.subject)
        .bind(&entry.body)
        .bind(&entry.status)
        .bind(&entry.error_message)
        .bind(entry.slot_date)
        .bind(entry.slot_time)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(row)
    }

    /// Cleanup sweep: drop failed attempts older than the retention window.
    /// Successful entries are kept indefinitely; they are the dedup record.
    #[instrument(skip(self), err)]
    pub async fn purge_failed_before(&mut self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM notification_log WHERE status = 'failed' AND created_at < $1")
            .bind(cutoff)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::errors::DbError;
    use crate::errors::Error;
    use crate::test_utils::{WatchSeed, create_test_user, create_test_watch};
    use chrono::NaiveTime;
    use sqlx::PgPool;

    fn entry(watch_id: uuid::Uuid, user_id: uuid::Uuid, channel: Channel, status: &str) -> NewNotificationLogEntry {
        NewNotificationLogEntry {
            watch_id,
            user_id,
            channel: channel.as_str().to_string(),
            recipient: "diner@dinersclub.net".to_string(),
            subject: Some("Table found".to_string()),
            body: "A table opened up".to_string(),
            status: status.to_string(),
            error_message: None,
            slot_date: Utc::now().date_naive(),
            slot_time: NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
        }
    }

    #[sqlx::test]
    async fn duplicate_sent_entries_are_rejected(pool: PgPool) {
        let user_id = create_test_user(&pool, "diner@dinersclub.net", None).await;
        let watch = create_test_watch(&pool, user_id, WatchSeed::on(Utc::now().date_naive())).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut log = NotificationLog::new(&mut conn);
        let first = entry(watch.id, user_id, Channel::Email, "sent");

        assert!(!log.was_sent(watch.id, Channel::Email, first.slot_date, first.slot_time).await.unwrap());
        log.append(&first).await.unwrap();
        assert!(log.was_sent(watch.id, Channel::Email, first.slot_date, first.slot_time).await.unwrap());

        let err = log.append(&first).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
        assert!(Error::from(err).is_already_notified());
    }

    #[sqlx::test]
    async fn dedup_is_per_channel(pool: PgPool) {
        let user_id = create_test_user(&pool, "diner@dinersclub.net", None).await;
        let watch = create_test_watch(&pool, user_id, WatchSeed::on(Utc::now().date_naive())).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut log = NotificationLog::new(&mut conn);
        log.append(&entry(watch.id, user_id, Channel::Email, "sent")).await.unwrap();

        // The email send does not block the SMS for the same slot.
        let sms = entry(watch.id, user_id, Channel::Sms, "sent");
        assert!(!log.was_sent(watch.id, Channel::Sms, sms.slot_date, sms.slot_time).await.unwrap());
        log.append(&sms).await.unwrap();
    }

    #[sqlx::test]
    async fn failed_attempts_do_not_dedup(pool: PgPool) {
        let user_id = create_test_user(&pool, "diner@dinersclub.net", None).await;
        let watch = create_test_watch(&pool, user_id, WatchSeed::on(Utc::now().date_naive())).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut log = NotificationLog::new(&mut conn);
        let failed = entry(watch.id, user_id, Channel::Email, "failed");
        log.append(&failed).await.unwrap();
        log.append(&failed).await.unwrap();

        // Failures leave the slot eligible for a retry.
        assert!(!log.was_sent(watch.id, Channel::Email, failed.slot_date, failed.slot_time).await.unwrap());
        log.append(&entry(watch.id, user_id, Channel::Email, "sent")).await.unwrap();
    }

    #[sqlx::test]
    async fn purge_drops_only_old_failures(pool: PgPool) {
        let user_id = create_test_user(&pool, "diner@dinersclub.net", None).await;
        let watch = create_test_watch(&pool, user_id, WatchSeed::on(Utc::now().date_naive())).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut log = NotificationLog::new(&mut conn);
        log.append(&entry(watch.id, user_id, Channel::Email, "sent")).await.unwrap();
        log.append(&entry(watch.id, user_id, Channel::Sms, "failed")).await.unwrap();

        let purged = log.purge_failed_before(Utc::now() + chrono::Duration::hours(1)).await.unwrap();
        assert_eq!(purged, 1);
        // The sent entry survives; it is the dedup record.
        let sent = entry(watch.id, user_id, Channel::Email, "sent");
        assert!(log.was_sent(watch.id, Channel::Email, sent.slot_date, sent.slot_time).await.unwrap());
    }
}
