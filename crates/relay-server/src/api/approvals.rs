//! Approval record endpoints, served by the record owner

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use relay_core::{FinalStatus, NewWorkflow, PersonId, RequestId, WorkflowRecord};

use super::ApiError;
use crate::server::RelayServer;

/// Response for a created approval
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalIdResponse {
    /// Assigned id
    pub request_id: RequestId,
}

/// Filters for listing approvals
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListApprovalsQuery {
    /// Only records of this requester
    pub requester_id: Option<u64>,
    /// Only records with this final status
    pub final_status: Option<FinalStatus>,
}

/// POST /approvals
pub async fn create_approval(
    State(server): State<Arc<RelayServer>>,
    Json(request): Json<NewWorkflow>,
) -> Result<(StatusCode, Json<ApprovalIdResponse>), ApiError> {
    let record = server.workflows()?.create(request).await?;
    info!(request_id = %record.request_id, "Approval request created");
    Ok((StatusCode::CREATED, Json(ApprovalIdResponse { request_id: record.request_id })))
}

/// GET /approvals
pub async fn list_approvals(
    State(server): State<Arc<RelayServer>>,
    Query(query): Query<ListApprovalsQuery>,
) -> Result<Json<Vec<WorkflowRecord>>, ApiError> {
    let records = server
        .workflows()?
        .list(query.requester_id.map(PersonId), query.final_status)
        .await?;
    Ok(Json(records))
}

/// GET /approvals/:request_id
pub async fn get_approval(
    State(server): State<Arc<RelayServer>>,
    Path(request_id): Path<u64>,
) -> Result<Json<WorkflowRecord>, ApiError> {
    Ok(Json(server.workflows()?.get(RequestId(request_id)).await?))
}
