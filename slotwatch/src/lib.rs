//! Slotwatch: reservation slot scanning and notification dispatch.
//!
//! The engine polls restaurant inventory on a two-tier cadence, matches
//! returned slots against standing watches, and pushes matches onto an
//! asynchronous dispatch queue for email, SMS, and auto-booking. A thin
//! HTTP surface exposes health, a manual scan trigger, and cancellation.

pub mod api;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod errors;
pub mod inventory;
pub mod locations;
pub mod scan;
pub mod telemetry;
#[cfg(test)]
pub mod test_utils;
pub mod types;

use std::sync::Arc;

use axum::Router;
use chrono::Utc;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db::handlers::{NotificationLog, Sessions, Watches};
use crate::dispatch::{EmailService, NotificationDispatcher, SmsSender};
use crate::inventory::InventoryClient;
use crate::scan::{ScanExecutor, Scheduler};
use crate::types::ScanTier;

pub fn migrator() -> Migrator {
    sqlx::migrate!("./migrations")
}

async fn setup_database(config: &Config) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await?;

    migrator().run(&pool).await?;

    let mut conn = pool.acquire().await?;
    let active = Watches::new(&mut conn).count_active().await?;
    tracing::info!(active_watches = active, "Database ready");

    Ok(pool)
}

/// Handles for the background half of the service. Shut down after the
/// HTTP server has stopped accepting requests.
pub struct BackgroundServices {
    shutdown: CancellationToken,
    scheduler: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

impl BackgroundServices {
    pub async fn stop(self) {
        self.shutdown.cancel();
        let _ = self.scheduler.await;
        let _ = self.dispatcher.await;
    }
}

pub struct Application {
    config: Config,
    pool: PgPool,
    router: Router,
    background: BackgroundServices,
}

impl Application {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let pool = setup_database(&config).await?;
        let shutdown = CancellationToken::new();

        let inventory = Arc::new(InventoryClient::new(&config.inventory)?);
        let email = if config.email.enabled {
            Some(Arc::new(EmailService::new(&config.email)?))
        } else {
            tracing::warn!("Email channel disabled");
            None
        };
        let sms = if config.sms.enabled {
            Some(Arc::new(SmsSender::new(&config.sms)?))
        } else {
            None
        };

        let (dispatch_handle, dispatcher) = NotificationDispatcher::spawn(
            pool.clone(),
            inventory.clone(),
            email,
            sms,
            config.dispatch.clone(),
            shutdown.clone(),
        );

        let executor = Arc::new(ScanExecutor::new(
            pool.clone(),
            inventory,
            dispatch_handle.sender(),
            config.scanner.clone(),
        ));

        let scheduler = Self::build_scheduler(&config, pool.clone(), executor.clone());
        let scheduler = tokio::spawn(scheduler.run(shutdown.clone()));

        let router = api::router(api::ApiState {
            pool: pool.clone(),
            executor,
            scan_access_key: config.scan_access_key.clone(),
        })
        .layer(tower_http::trace::TraceLayer::new_for_http());

        Ok(Self {
            config,
            pool,
            router,
            background: BackgroundServices {
                shutdown,
                scheduler,
                dispatcher,
            },
        })
    }

    fn build_scheduler(config: &Config, pool: PgPool, executor: Arc<ScanExecutor>) -> Scheduler {
        let scanner = &config.scanner;
        tracing::info!(
            urgent = %humantime::format_duration(scanner.urgent_interval),
            normal = %humantime::format_duration(scanner.normal_interval),
            expiry = %humantime::format_duration(scanner.expiry_interval),
            cleanup = %humantime::format_duration(scanner.cleanup_interval),
            "Scheduling background jobs"
        );

        let mut scheduler = Scheduler::new(scanner.tick_interval);

        let urgent_executor = executor.clone();
        scheduler.add_job("scan_urgent", scanner.urgent_interval, move || {
            let executor = urgent_executor.clone();
            async move {
                executor.run_cycle(ScanTier::Urgent).await?;
                Ok(())
            }
        });

        scheduler.add_job("scan_normal", scanner.normal_interval, move || {
            let executor = executor.clone();
            async move {
                executor.run_cycle(ScanTier::Normal).await?;
                Ok(())
            }
        });

        let expiry_pool = pool.clone();
        scheduler.add_job("expire_watches", scanner.expiry_interval, move || {
            let pool = expiry_pool.clone();
            async move {
                let mut conn = pool.acquire().await?;
                let expired = Watches::new(&mut conn).expire_past(Utc::now().date_naive()).await?;
                if expired > 0 {
                    tracing::info!(expired, "Expired past-date watches");
                }
                Ok(())
            }
        });

        let retention = config.dispatch.failed_retention;
        scheduler.add_job("cleanup", scanner.cleanup_interval, move || {
            let pool = pool.clone();
            async move {
                let now = Utc::now();
                let mut conn = pool.acquire().await?;
                let sessions = Sessions::new(&mut conn).delete_expired(now).await?;
                let cutoff = now - chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::days(7));
                let purged = NotificationLog::new(&mut conn).purge_failed_before(cutoff).await?;
                if sessions > 0 || purged > 0 {
                    tracing::info!(sessions, purged, "Cleanup sweep finished");
                }
                Ok(())
            }
        });

        scheduler
    }

    /// Serve until the provided future resolves, then stop background work
    /// and close the pool.
    pub async fn serve<F>(self, shutdown_signal: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let address = self.config.bind_address();
        let listener = tokio::net::TcpListener::bind(&address).await?;
        tracing::info!(%address, "Listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal)
            .await?;

        self.background.stop().await;
        self.pool.close().await;
        tracing::info!("Shutdown complete");
        Ok(())
    }
}
