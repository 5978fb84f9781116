//! Health check endpoint for the Relay server

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::server::RelayServer;

/// Health check handler
///
/// Reports the role, the sync mode and the state of each hosted component.
/// Parked dead letters degrade the report but do not fail it.
pub async fn health_check(State(server): State<Arc<RelayServer>>) -> impl IntoResponse {
    debug!("Health check requested");

    let mut response = json!({
        "status": "UP",
        "version": env!("CARGO_PKG_VERSION"),
        "role": server.config.role.to_string(),
        "syncMode": server.config.sync.mode.to_string(),
        "deliveryPolicy": server.config.sync.delivery_policy.to_string(),
        "components": {},
    });
    let mut down = false;

    if let Ok(workflows) = server.workflows() {
        response["components"]["approvalRecords"] = match workflows.list_in_progress().await {
            Ok(in_progress) => json!({ "status": "UP", "inProgress": in_progress.len() }),
            Err(e) => {
                down = true;
                json!({ "status": "DOWN", "error": e.to_string() })
            }
        };
    }

    if let Ok(projection) = server.projection() {
        response["components"]["pendingQueue"] = match projection.pending_count().await {
            Ok(pending) => json!({ "status": "UP", "pending": pending }),
            Err(e) => {
                down = true;
                json!({ "status": "DOWN", "error": e.to_string() })
            }
        };
    }

    if let Some(bus) = server.bus() {
        let parked = bus.dead_letters().await.len();
        let status = if parked == 0 { "UP" } else { "DEGRADED" };
        response["components"]["messageBus"] = json!({
            "status": status,
            "partitions": bus.partition_count(),
            "deadLetters": parked,
        });
    }

    let status_code = if down {
        response["status"] = json!("DOWN");
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(response))
}
