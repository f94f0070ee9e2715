//! API request handlers

use axum::{
    extract::{Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::audit::{LogRecorder, LogStatus};
use crate::config::Config;
use crate::db;
use crate::mailbox::ImapMailbox;
use crate::registry::ServerRegistry;
use crate::sync::SyncEngine;
use crate::webdav::WebDavUploader;

/// How long the trigger waits for the worker dispatch before treating the
/// run as handed off.
const DISPATCH_TIMEOUT: Duration = Duration::from_millis(500);

/// Shared application state
pub struct AppState {
    pub pool: sqlx::SqlitePool,
    pub config: Arc<Config>,
    pub engine: SyncEngine<WebDavUploader>,
    pub recorder: LogRecorder,
    pub registry: ServerRegistry,
    pub http: reqwest::Client,
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

impl ApiError {
    pub fn new(msg: &str) -> Self {
        Self {
            error: msg.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub q: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub entries: Vec<crate::audit::LogEntry>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
pub struct LogStats {
    pub total: i64,
    pub success: i64,
    pub failed: i64,
    pub skipped: i64,
}

#[derive(Debug, Deserialize)]
pub struct HealthQuery {
    pub deep: Option<bool>,
}

/// Compare the request's bearer token against the expected credential.
pub fn check_bearer(headers: &HeaderMap, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));
    token == Some(expected)
}

/// The URL under which the internal worker endpoint reaches this instance.
pub fn worker_url(config: &Config) -> String {
    let base = match &config.http.advertise_url {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => {
            let port = config
                .http
                .listen_addr
                .rsplit(':')
                .next()
                .unwrap_or("8080");
            format!("http://127.0.0.1:{}", port)
        }
    };
    format!("{}/api/internal/worker", base)
}

/// POST /api/run-task - trigger a run without waiting for it
///
/// Dispatches to the internal worker endpoint with a short timeout; the
/// timeout firing is the expected fire-and-forget path. The caller is never
/// blocked on the full run duration.
pub async fn run_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !check_bearer(&headers, &state.config.api.secret_key) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiError::new("Invalid or missing API key")),
        )
            .into_response();
    }

    let url = worker_url(&state.config);
    let dispatch = state
        .http
        .post(&url)
        .bearer_auth(&state.config.api.internal_key)
        .timeout(DISPATCH_TIMEOUT)
        .send()
        .await;

    match dispatch {
        Ok(response) => {
            // A run that finishes inside the dispatch window was either a
            // busy-skip or trivially small; report the busy case as such.
            if let Ok(body) = response.json::<serde_json::Value>().await {
                if body.get("outcome").and_then(|v| v.as_str()) == Some("skipped_busy") {
                    info!("Sync run skipped; another run is active");
                    return (
                        StatusCode::OK,
                        Json(TriggerResponse {
                            status: "skipped".to_string(),
                            message: "Another run is active".to_string(),
                        }),
                    )
                        .into_response();
                }
            }
        }
        Err(e) if e.is_timeout() => {
            // Expected: the worker keeps running past the dispatch window.
        }
        Err(e) => {
            error!("Failed to dispatch worker: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::new("Failed to dispatch worker")),
            )
                .into_response();
        }
    }

    info!("Sync run dispatched");
    (
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            status: "dispatched".to_string(),
            message: "Sync run triggered".to_string(),
        }),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct WorkerQuery {
    /// Upload to this named store instead of the default.
    pub server: Option<String>,
}

/// POST /api/internal/worker - execute a run
///
/// Only the trigger endpoint holds the internal credential; the run lock
/// makes concurrent invocations safe regardless.
pub async fn internal_worker(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<WorkerQuery>,
) -> impl IntoResponse {
    if !check_bearer(&headers, &state.config.api.internal_key) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiError::new("Unauthorized")),
        )
            .into_response();
    }

    let imap = state.config.imap.clone();
    let result = state
        .engine
        .run(|| ImapMailbox::connect(&imap), query.server.as_deref())
        .await;

    match result {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => {
            // Log the detail, return a generic message.
            error!("Sync run failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::new("Sync run failed; see server logs")),
            )
                .into_response()
        }
    }
}

/// GET /health - durable store (and optionally remote store) reachability
pub async fn health(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HealthQuery>,
) -> impl IntoResponse {
    if let Err(e) = db::ping(&state.pool).await {
        error!("Health check failed: {}", e);
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "unhealthy",
                "database": "disconnected",
            })),
        );
    }

    let mut body = serde_json::json!({
        "status": "healthy",
        "database": "connected",
    });

    if query.deep.unwrap_or(false) {
        let remote = match state.registry.resolve_default().await {
            Ok(server) => match state.registry.test_connection(&server).await {
                Ok(()) => "reachable",
                Err(e) => {
                    warn!("Default server unreachable: {}", e);
                    "unreachable"
                }
            },
            Err(_) => "unconfigured",
        };
        body["remote_store"] = serde_json::Value::String(remote.to_string());
    }

    (StatusCode::OK, Json(body))
}

/// GET /api/logs - paginated audit trail, filterable by filename substring
pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<LogsQuery>,
) -> impl IntoResponse {
    if !check_bearer(&headers, &state.config.api.secret_key) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiError::new("Invalid or missing API key")),
        )
            .into_response();
    }

    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
    let filter = query.q.as_deref();

    let entries = state.recorder.recent(page, per_page, filter).await;
    let total = state.recorder.count(filter).await;

    match (entries, total) {
        (Ok(entries), Ok(total)) => {
            let total_pages = (total + per_page as i64 - 1) / per_page as i64;
            (
                StatusCode::OK,
                Json(LogsResponse {
                    entries,
                    page,
                    per_page,
                    total,
                    total_pages,
                }),
            )
                .into_response()
        }
        (Err(e), _) | (_, Err(e)) => {
            error!("Failed to read logs: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::new("Failed to read logs")),
            )
                .into_response()
        }
    }
}

/// GET /api/logs/stats - per-status totals for the dashboard
pub async fn log_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !check_bearer(&headers, &state.config.api.secret_key) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiError::new("Invalid or missing API key")),
        )
            .into_response();
    }

    let stats = async {
        Ok::<_, crate::error::BridgeError>(LogStats {
            total: state.recorder.count(None).await?,
            success: state.recorder.count_by_status(LogStatus::Success).await?,
            failed: state.recorder.count_by_status(LogStatus::Failed).await?,
            skipped: state.recorder.count_by_status(LogStatus::Skipped).await?,
        })
    }
    .await;

    match stats {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => {
            error!("Failed to read log stats: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::new("Failed to read log stats")),
            )
                .into_response()
        }
    }
}
