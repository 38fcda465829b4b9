use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use hubsync_common::types::ServiceInfo;

use crate::scheduler::{SyncTrigger, TriggerOutcome};
use crate::state::{StatusSnapshot, SyncStateStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SyncStateStore>,
    pub trigger: Arc<dyn SyncTrigger>,
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn info() -> Json<ServiceInfo> {
    Json(ServiceInfo::new("hubsync-relay"))
}

async fn sync_status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.store.snapshot().await)
}

async fn trigger_sync(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match state.trigger.trigger() {
        TriggerOutcome::Started => {
            tracing::info!("manual sync triggered");
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({ "status": "started" })),
            )
        }
        TriggerOutcome::AlreadyRunning => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "status": "already_running" })),
        ),
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/info", get(info))
        .route("/sync/status", get(sync_status))
        .route("/sync/trigger", post(trigger_sync))
        .with_state(state)
}
