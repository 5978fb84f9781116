//! Receiving ends of the HTTP sync transport, plus operator endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use relay_core::{ResyncReport, StepResultEvent, WorkflowSnapshot};
use relay_monitoring::SyncMetricsSnapshot;
use relay_sync::DeadLetter;

use super::ApiError;
use crate::error::ServerError;
use crate::server::RelayServer;

/// POST /internal/sync/snapshots
pub async fn receive_snapshot(
    State(server): State<Arc<RelayServer>>,
    Json(snapshot): Json<WorkflowSnapshot>,
) -> Result<StatusCode, ApiError> {
    let outcome = server.projection()?.ingest_snapshot(snapshot).await?;
    debug!(outcome = ?outcome, "Snapshot received over HTTP");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /internal/sync/results
pub async fn receive_step_result(
    State(server): State<Arc<RelayServer>>,
    Json(event): Json<StepResultEvent>,
) -> Result<StatusCode, ApiError> {
    let transition = server.workflows()?.apply_result(event).await?;
    debug!(transition = ?transition, "Step result received over HTTP");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /internal/sync/in-progress
pub async fn in_progress(State(server): State<Arc<RelayServer>>) -> Result<Json<Vec<WorkflowSnapshot>>, ApiError> {
    Ok(Json(server.workflows()?.list_in_progress().await?))
}

/// POST /internal/sync/resync
pub async fn resync(State(server): State<Arc<RelayServer>>) -> Result<Json<ResyncReport>, ApiError> {
    Ok(Json(server.resync()?.resync().await?))
}

/// GET /internal/sync/dead-letters
pub async fn dead_letters(State(server): State<Arc<RelayServer>>) -> Result<Json<Vec<DeadLetter>>, ApiError> {
    let bus = server
        .bus()
        .ok_or_else(|| ServerError::Unavailable("dead letters exist only in queued mode".to_string()))?;
    Ok(Json(bus.dead_letters().await))
}

/// POST /internal/sync/dead-letters/redeliver
pub async fn redeliver_dead_letters(State(server): State<Arc<RelayServer>>) -> Result<Json<Value>, ApiError> {
    let bus = server
        .bus()
        .ok_or_else(|| ServerError::Unavailable("dead letters exist only in queued mode".to_string()))?;
    let requeued = bus.redeliver_dead_letters().await?;
    Ok(Json(json!({ "requeued": requeued })))
}

/// GET /internal/sync/metrics
pub async fn metrics(State(server): State<Arc<RelayServer>>) -> Json<SyncMetricsSnapshot> {
    Json(server.metrics().snapshot())
}
