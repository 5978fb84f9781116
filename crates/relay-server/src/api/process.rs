//! Pending approval endpoints, served by the projection owner

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use relay_core::{PersonId, RequestId, StepNumber, StepStatus, WorkflowSnapshot};

use super::ApiError;
use crate::error::ServerError;
use crate::server::RelayServer;

/// Body of a decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequest {
    /// `approved` or `rejected`
    pub status: String,

    /// Optional approver comment
    #[serde(default)]
    pub comment: Option<String>,
}

/// Result of a recorded decision
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    pub request_id: RequestId,
    pub approver_id: PersonId,
    pub step_number: StepNumber,
    pub status: StepStatus,
    pub message: String,
}

/// GET /process/:approver_id
pub async fn list_pending(
    State(server): State<Arc<RelayServer>>,
    Path(approver_id): Path<u64>,
) -> Result<Json<Vec<WorkflowSnapshot>>, ApiError> {
    Ok(Json(server.projection()?.list_pending(PersonId(approver_id)).await?))
}

/// POST /process/:approver_id/:request_id
pub async fn record_decision(
    State(server): State<Arc<RelayServer>>,
    Path((approver_id, request_id)): Path<(u64, u64)>,
    Json(request): Json<ProcessRequest>,
) -> Result<Json<ProcessResponse>, ApiError> {
    if request.status.trim().is_empty() {
        return Err(ServerError::ValidationError("status is required (approved or rejected)".to_string()).into());
    }

    let event = server
        .projection()?
        .record_decision(PersonId(approver_id), RequestId(request_id), &request.status, request.comment)
        .await?;

    Ok(Json(ProcessResponse {
        request_id: event.request_id,
        approver_id: event.approver_id,
        step_number: event.step_number,
        status: event.status,
        message: format!("Step {} {}", event.step_number, event.status),
    }))
}
