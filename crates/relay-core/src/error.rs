use thiserror::Error;

use crate::types::{PersonId, RequestId, StepNumber};

/// Broad classification of a [`CoreError`], used by callers to decide how to
/// surface or recover from a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any mutation, a client error
    Validation,
    /// Unknown record or pending entry, a client error
    NotFound,
    /// Sync channel unreachable or slow, eligible for retry and resync
    Transport,
    /// Data reached a component in a shape validation should have prevented
    Invariant,
    /// Persistence failure
    Storage,
}

/// Core error type for the Relay approval engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Step numbers are not exactly 1..N
    #[error("Invalid step order: {0}")]
    InvalidStepOrder(String),

    /// Decision status is not approved or rejected
    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    /// Generic validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Identity collaborator does not know this person
    #[error("Person not found: {0}")]
    UnknownPerson(PersonId),

    /// A step result contradicts the already recorded status of that step
    #[error("Step {step_number} of request {request_id} is already {recorded}")]
    ConflictingResult {
        /// Workflow record
        request_id: RequestId,
        /// Step that was targeted
        step_number: StepNumber,
        /// Status already recorded on the step
        recorded: String,
    },

    /// A step result targets a step that is not the actionable one
    #[error("Step {step_number} of request {request_id} is not actionable yet")]
    StepNotActionable {
        /// Workflow record
        request_id: RequestId,
        /// Step that was targeted
        step_number: StepNumber,
    },

    /// The record already reached a terminal status
    #[error("Request {request_id} is already {final_status}")]
    RecordTerminal {
        /// Workflow record
        request_id: RequestId,
        /// Terminal status of the record
        final_status: String,
    },

    /// Remote service answered that the addressed resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unknown workflow record
    #[error("Approval request not found: {0}")]
    RecordNotFound(RequestId),

    /// No pending entry for this approver and request
    #[error("Pending approval not found: approver_id={approver_id}, request_id={request_id}")]
    PendingEntryNotFound {
        /// Approver whose queue was searched
        approver_id: PersonId,
        /// Request that was looked up
        request_id: RequestId,
    },

    /// Sync channel delivery failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Sync channel call did not complete in time
    #[error("Transport timeout after {0}ms")]
    Timeout(u64),

    /// Internal invariant broken
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// State store error
    #[error("State store error: {0}")]
    StateStoreError(String),

    /// Optimistic concurrency check failed
    #[error("Version conflict on request {request_id}: expected {expected}, found {found}")]
    VersionConflict {
        /// Workflow record
        request_id: RequestId,
        /// Version the writer read
        expected: u64,
        /// Version currently stored
        found: u64,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl CoreError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidStepOrder(_)
            | CoreError::InvalidStatus(_)
            | CoreError::ValidationError(_)
            | CoreError::ConflictingResult { .. }
            | CoreError::StepNotActionable { .. }
            | CoreError::RecordTerminal { .. } => ErrorKind::Validation,
            CoreError::UnknownPerson(_)
            | CoreError::NotFound(_)
            | CoreError::RecordNotFound(_)
            | CoreError::PendingEntryNotFound { .. } => ErrorKind::NotFound,
            CoreError::Transport(_) | CoreError::Timeout(_) => ErrorKind::Transport,
            CoreError::InvariantViolation(_) => ErrorKind::Invariant,
            CoreError::StateStoreError(_)
            | CoreError::VersionConflict { .. }
            | CoreError::SerializationError(_) => ErrorKind::Storage,
        }
    }

    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}
