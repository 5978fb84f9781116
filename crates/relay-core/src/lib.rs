//!
//! Relay Core - sequential approval workflows across a service boundary
//!
//! This crate holds the workflow state machine owned by the record service,
//! the per-approver pending-queue projection owned by the approver-facing
//! service, and the sync channel contracts that keep the two consistent.
//! Storage and transports are plugged in from other crates.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - records, snapshots, events and repository interfaces
pub mod domain;

/// Application services - state machine, projection and statistics
pub mod application;

/// Core types
pub mod types;

/// Error types
pub mod error;

/// Fakes for collaborators and sync endpoints
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export key types
pub use error::{CoreError, ErrorKind};
pub use types::{FinalStatus, PersonId, RequestId, StepNumber, StepStatus};

pub use domain::collaborators::{IdentityDirectory, NotificationDispatcher, OrgChart, Person};
pub use domain::events::{OutcomeNotification, StepProgress};
pub use domain::repository::{ApprovalRecordRepository, IngestOutcome, PendingQueueStore};
pub use domain::snapshot::{StepResultEvent, StepSnapshot, WorkflowSnapshot};
pub use domain::validation::{validate_step_sequence, StepRequest};
pub use domain::workflow_record::{StepState, Transition, WorkflowRecord};

pub use application::pending_queue_service::{PendingQueueService, ResyncReport};
pub use application::statistics::{ApprovalStatistics, StatisticsService};
pub use application::sync_channel::{
    AuthoritySource, DeliveryPolicy, SnapshotPublisher, SnapshotSink, StepResultReporter,
    StepResultSink,
};
pub use application::workflow_service::{NewWorkflow, WorkflowService};
