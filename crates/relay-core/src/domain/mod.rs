/// Step sequence validation
pub mod validation;

/// Workflow record aggregate and its state machine
pub mod workflow_record;

/// Sync channel messages
pub mod snapshot;

/// Domain events
pub mod events;

/// Repository interfaces
pub mod repository;

/// External collaborator interfaces
pub mod collaborators;
