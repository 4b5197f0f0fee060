//! Thin HTTP surface: health, a key-gated manual scan trigger, and watch
//! cancellation. Everything else happens on the background schedules.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use axum::routing::{delete, get, post};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::handlers::Watches;
use crate::errors::Error;
use crate::scan::ScanExecutor;
use crate::types::{ScanTier, abbrev_uuid};

#[derive(Clone)]
pub struct ApiState {
    pub pool: PgPool,
    pub executor: Arc<ScanExecutor>,
    /// Required in the X-Access-Key header for the scan trigger; `None`
    /// disables the endpoint entirely.
    pub scan_access_key: Option<String>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/scan", post(trigger_scan))
        .route("/api/watches/{id}", delete(cancel_watch))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

fn default_tier() -> ScanTier {
    ScanTier::Normal
}

#[derive(Debug, Deserialize)]
struct ScanParams {
    #[serde(default = "default_tier")]
    tier: ScanTier,
}

async fn trigger_scan(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(params): Query<ScanParams>,
) -> Response {
    let Some(expected) = &state.scan_access_key else {
        return (StatusCode::NOT_FOUND, "manual scan trigger is not enabled").into_response();
    };
    let provided = headers.get("x-access-key").and_then(|v| v.to_str().ok());
    if provided != Some(expected.as_str()) {
        return (StatusCode::UNAUTHORIZED, "invalid access key").into_response();
    }

    tracing::info!(tier = %params.tier, "Manual scan triggered");
    match state.executor.run_cycle(params.tier).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(error) => {
            tracing::error!(%error, "Manual scan failed");
            error_response(error)
        }
    }
}

async fn cancel_watch(State(state): State<ApiState>, Path(id): Path<Uuid>) -> Response {
    let mut conn = match state.pool.acquire().await {
        Ok(conn) => conn,
        Err(error) => return error_response(Error::from(error)),
    };
    match Watches::new(&mut conn).cancel(id).await {
        Ok(true) => {
            tracing::info!(watch_id = %abbrev_uuid(&id), "Watch cancelled");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => error_response(Error::NotFound {
            resource: "watch".to_string(),
            id: id.to_string(),
        }),
        Err(error) => error_response(Error::from(error)),
    }
}

fn error_response(error: Error) -> Response {
    let status = match &error {
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        Error::TransientFetch { .. } | Error::TransientDispatch { .. } => StatusCode::BAD_GATEWAY,
        Error::Database(_) | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, error.to_string()).into_response()
}
