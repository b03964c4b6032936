//! HTTP Endpoints
//!
//! REST API for the knowledge-base assistant.

use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::{HeaderValue, Method, StatusCode},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use civic_qa_config::constants::timeouts;
use civic_qa_core::{EntryId, KnowledgeEntry};
use civic_qa_rag::{SearchOutcome, SearchRequest};

use crate::state::AppState;
use crate::ServerError;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let server = &state.config().server;
    let cors_layer = build_cors_layer(&server.cors_origins, server.cors_enabled);
    let request_timeout = Duration::from_secs(server.timeout_seconds);

    Router::new()
        .route("/api/search", post(search))
        .route("/api/sync", post(sync))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout))
                .layer(CompressionLayer::new())
                .layer(cors_layer),
        )
        .with_state(state)
}

const LOCAL_ORIGIN: &str = "http://localhost:3000";

fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        if origins.is_empty() {
            tracing::info!("No CORS origins configured, defaulting to {}", LOCAL_ORIGIN);
        } else {
            tracing::error!("All configured CORS origins are invalid, falling back to localhost");
        }
        return CorsLayer::new()
            .allow_origin(HeaderValue::from_static(LOCAL_ORIGIN))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Answer a citizen question
async fn search(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchOutcome>, ServerError> {
    let Json(request) = payload.map_err(|e| ServerError::InvalidRequest(e.body_text()))?;
    let outcome = state.pipeline.search(&request).await?;
    Ok(Json(outcome))
}

/// Sync request from the content-management backend
#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub action: String,
    #[serde(default)]
    pub content: serde_json::Value,
}

/// Delete payload; the id may arrive as a number or a numeric string
#[derive(Debug, Deserialize)]
struct DeleteContent {
    #[serde(deserialize_with = "civic_qa_core::deserialize_entry_id")]
    id: EntryId,
}

/// Sync response
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<EntryId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_synced: Option<usize>,
}

impl SyncResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            message: message.into(),
            id: None,
            total_synced: None,
        }
    }
}

fn parse_content<T: serde::de::DeserializeOwned>(
    action: &str,
    content: serde_json::Value,
) -> Result<T, ServerError> {
    serde_json::from_value(content)
        .map_err(|e| ServerError::InvalidRequest(format!("Invalid content for '{}': {}", action, e)))
}

/// Apply one add/update/delete/bulk_sync action to every index
async fn sync(
    State(state): State<AppState>,
    payload: Result<Json<SyncRequest>, JsonRejection>,
) -> Result<Json<SyncResponse>, ServerError> {
    let Json(SyncRequest { action, content }) =
        payload.map_err(|e| ServerError::InvalidRequest(e.body_text()))?;

    tracing::debug!(action = %action, "Sync request");

    let response = match action.as_str() {
        "bulk_sync" => {
            let entries: Vec<KnowledgeEntry> = parse_content(&action, content)?;
            let total = state.sync.bulk_sync(&entries).await?;
            SyncResponse {
                total_synced: Some(total),
                ..SyncResponse::success(format!(
                    "Berhasil sinkronisasi {} data Knowledge Bank",
                    total
                ))
            }
        },
        "add" => {
            let entry: KnowledgeEntry = parse_content(&action, content)?;
            let id = state.sync.add(&entry).await?;
            SyncResponse {
                id: Some(id),
                ..SyncResponse::success("Data berhasil ditambahkan ke Knowledge Bank")
            }
        },
        "update" => {
            let entry: KnowledgeEntry = parse_content(&action, content)?;
            state.sync.update(&entry).await?;
            SyncResponse {
                id: Some(entry.id),
                ..SyncResponse::success("Data berhasil diupdate di Knowledge Bank")
            }
        },
        "delete" => {
            let DeleteContent { id } = parse_content(&action, content)?;
            state.sync.delete(id).await?;
            SyncResponse {
                id: Some(id),
                ..SyncResponse::success("Data berhasil dihapus dari Knowledge Bank")
            }
        },
        other => {
            return Err(ServerError::InvalidRequest(format!(
                "Action '{}' tidak dikenali",
                other
            )))
        },
    };

    Ok(Json(response))
}

/// Liveness: the index of record answers a point count
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let (healthy, index) = match state.sync.count().await {
        Ok(count) => (true, serde_json::json!({ "status": "ok", "count": count })),
        Err(e) => (
            false,
            serde_json::json!({ "status": "error", "message": e.to_string() }),
        ),
    };

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(serde_json::json!({
            "status": if healthy { "healthy" } else { "degraded" },
            "version": env!("CARGO_PKG_VERSION"),
            "checks": { "index": index }
        })),
    )
}

/// Readiness: index and judge reachability, each probe bounded
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let probe = Duration::from_millis(timeouts::READINESS_PROBE_MS);
    let mut checks = serde_json::Map::new();

    // The index is mandatory; the judge only backs advisory stages
    let index_status = match tokio::time::timeout(probe, state.sync.count()).await {
        Ok(Ok(_)) => "ok",
        Ok(Err(_)) => "unreachable",
        Err(_) => "timeout",
    };
    let ready = index_status == "ok";
    checks.insert(
        "index".to_string(),
        serde_json::json!({ "status": index_status }),
    );

    let judge_status = match &state.judge {
        None => "disabled",
        Some(judge) => match tokio::time::timeout(probe, judge.is_available()).await {
            Ok(true) => "ok",
            Ok(false) => "unreachable",
            Err(_) => "timeout",
        },
    };
    checks.insert(
        "judge".to_string(),
        serde_json::json!({
            "status": judge_status,
            "name": state.judge.as_ref().map(|j| j.name().to_string()),
        }),
    );

    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(serde_json::json!({
            "status": if ready { "ready" } else { "not_ready" },
            "checks": checks
        })),
    )
}
