//! API module for the Relay server
//!
//! Routes are mounted per role: a process only exposes the services it hosts.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use relay_sync::http::{IN_PROGRESS_PATH, RESULTS_PATH, SNAPSHOTS_PATH};

pub mod approvals;
pub mod errors;
pub mod health;
pub mod org;
pub mod process;
pub mod statistics;
pub mod sync;

use crate::server::RelayServer;

pub use errors::ApiError;

/// Build the router for API endpoints
pub fn build_router(server: Arc<RelayServer>) -> Router {
    let role = server.config.role;

    let mut router = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // People directory
        .route("/employees/:id/exists", get(org::person_exists))
        .route("/employees/:id/subordinates", get(org::subordinates))
        .route("/employees/:id/manager", get(org::manager))
        .route("/internal/sync/metrics", get(sync::metrics));

    if role.has_authority() {
        router = router
            .route("/approvals", post(approvals::create_approval).get(approvals::list_approvals))
            .route("/approvals/:request_id", get(approvals::get_approval))
            .route("/statistics", get(statistics::overall))
            .route("/statistics/requester/:requester_id", get(statistics::for_requester))
            .route(RESULTS_PATH, post(sync::receive_step_result))
            .route(IN_PROGRESS_PATH, get(sync::in_progress));
    }

    if role.has_projection() {
        router = router
            .route("/process/:approver_id", get(process::list_pending))
            .route("/process/:approver_id/:request_id", post(process::record_decision))
            .route(SNAPSHOTS_PATH, post(sync::receive_snapshot))
            .route("/internal/sync/resync", post(sync::resync))
            .route("/internal/sync/dead-letters", get(sync::dead_letters))
            .route("/internal/sync/dead-letters/redeliver", post(sync::redeliver_dead_letters));
    }

    router.with_state(server)
}
