/// Sync channel contracts and delivery policy
pub mod sync_channel;

/// Workflow state machine service (record owner)
pub mod workflow_service;

/// Pending-queue projection service (projection owner)
pub mod pending_queue_service;

/// Statistics over workflow records
pub mod statistics;
