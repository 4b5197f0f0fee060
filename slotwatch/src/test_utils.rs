//! Shared fixtures for database-backed tests.

use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{ScannableWatch, Watch};

pub async fn create_test_user(pool: &PgPool, email: &str, phone: Option<&str>) -> Uuid {
    let row: (Uuid,) = sqlx::query_as("INSERT INTO users (email, name, phone) VALUES ($1, $2, $3) RETURNING id")
        .bind(email)
        .bind("Test Diner")
        .bind(phone)
        .fetch_one(pool)
        .await
        .expect("failed to create test user");
    row.0
}

/// Watch insert parameters with sensible defaults: an active watch on
/// "peachtree" for 4, window 18:00-21:00.
pub struct WatchSeed {
    pub location_key: &'static str,
    pub party_size: i32,
    pub target_date: NaiveDate,
    pub time_start: NaiveTime,
    pub time_end: NaiveTime,
    pub auto_book: bool,
    pub status: &'static str,
}

impl WatchSeed {
    pub fn on(target_date: NaiveDate) -> Self {
        Self {
            location_key: "peachtree",
            party_size: 4,
            target_date,
            time_start: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            time_end: NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
            auto_book: false,
            status: "active",
        }
    }

    pub fn status(mut self, status: &'static str) -> Self {
        self.status = status;
        self
    }

    /// Auto-book watches carry the contact fields booking needs.
    pub fn auto_book(mut self) -> Self {
        self.auto_book = true;
        self
    }
}

pub async fn create_test_watch(pool: &PgPool, user_id: Uuid, seed: WatchSeed) -> Watch {
    let (first, last, phone) = if seed.auto_book {
        (Some("Ada"), Some("Lovelace"), Some("+14045551234"))
    } else {
        (None, None, None)
    };
    sqlx::query_as::<_, Watch>(
        r#"
        INSERT INTO watches
            (user_id, location_key, party_size, target_date, time_start, time_end,
             auto_book, book_first_name, book_last_name, book_phone, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(seed.location_key)
    .bind(seed.party_size)
    .bind(seed.target_date)
    .bind(seed.time_start)
    .bind(seed.time_end)
    .bind(seed.auto_book)
    .bind(first)
    .bind(last)
    .bind(phone)
    .bind(seed.status)
    .fetch_one(pool)
    .await
    .expect("failed to create test watch")
}

pub fn scannable(watch: Watch, email: &str, phone: Option<&str>) -> ScannableWatch {
    ScannableWatch {
        watch,
        user_email: email.to_string(),
        user_name: Some("Test Diner".to_string()),
        user_phone: phone.map(str::to_string),
    }
}

pub async fn watch_status(pool: &PgPool, id: Uuid) -> String {
    let row: (String,) = sqlx::query_as("SELECT status FROM watches WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("watch should exist");
    row.0
}

pub async fn sent_count(pool: &PgPool, watch_id: Uuid) -> i64 {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notification_log WHERE watch_id = $1 AND status = 'sent'")
        .bind(watch_id)
        .fetch_one(pool)
        .await
        .expect("ledger count query failed");
    row.0
}

/// Poll until `check` passes; panics after ~5s. For asserting on work the
/// dispatcher does asynchronously.
pub async fn wait_until<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {what}");
}
