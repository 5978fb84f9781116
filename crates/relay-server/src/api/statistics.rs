use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use relay_core::{ApprovalStatistics, PersonId};

use super::ApiError;
use crate::server::RelayServer;

/// GET /statistics
pub async fn overall(State(server): State<Arc<RelayServer>>) -> Result<Json<ApprovalStatistics>, ApiError> {
    Ok(Json(server.statistics()?.overall().await?))
}

/// GET /statistics/requester/:requester_id
pub async fn for_requester(
    State(server): State<Arc<RelayServer>>,
    Path(requester_id): Path<u64>,
) -> Result<Json<ApprovalStatistics>, ApiError> {
    Ok(Json(server.statistics()?.for_requester(PersonId(requester_id)).await?))
}
