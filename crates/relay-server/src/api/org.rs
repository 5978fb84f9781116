//! Read-only people directory endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use relay_core::{IdentityDirectory, OrgChart, Person, PersonId};

use super::ApiError;
use crate::error::ServerError;
use crate::server::RelayServer;

/// GET /employees/:id/exists
pub async fn person_exists(
    State(server): State<Arc<RelayServer>>,
    Path(id): Path<u64>,
) -> Result<Json<bool>, ApiError> {
    Ok(Json(server.directory()?.exists(PersonId(id)).await?))
}

/// GET /employees/:id/subordinates
pub async fn subordinates(
    State(server): State<Arc<RelayServer>>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<Person>>, ApiError> {
    Ok(Json(server.directory()?.children(PersonId(id)).await?))
}

/// GET /employees/:id/manager
pub async fn manager(
    State(server): State<Arc<RelayServer>>,
    Path(id): Path<u64>,
) -> Result<Json<Person>, ApiError> {
    let manager = server
        .directory()?
        .parent(PersonId(id))
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("Manager of {}", id)))?;
    Ok(Json(manager))
}
