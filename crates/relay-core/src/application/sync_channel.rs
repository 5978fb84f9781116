//! Sync channel contracts
//!
//! Two messages cross the service boundary: snapshots flow from the record
//! owner to the projection owner, step results flow back. The sending side
//! talks to a [`SnapshotPublisher`] / [`StepResultReporter`]; the receiving
//! side exposes a [`SnapshotSink`] / [`StepResultSink`]. Transports in
//! `relay-sync` connect one to the other. [`AuthoritySource`] is the pull used
//! for cold-start resync.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::snapshot::{StepResultEvent, WorkflowSnapshot};
use crate::CoreError;

/// Sends snapshots to the projection owner
#[async_trait]
pub trait SnapshotPublisher: Send + Sync {
    /// Deliver a full snapshot
    async fn push_snapshot(&self, snapshot: WorkflowSnapshot) -> Result<(), CoreError>;
}

/// Sends step results to the record owner
#[async_trait]
pub trait StepResultReporter: Send + Sync {
    /// Deliver a decision
    async fn report_step_result(&self, event: StepResultEvent) -> Result<(), CoreError>;
}

/// Receiving end of snapshot delivery, implemented by the projection owner
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Handle one delivered snapshot
    async fn receive_snapshot(&self, snapshot: WorkflowSnapshot) -> Result<(), CoreError>;
}

/// Receiving end of step result delivery, implemented by the record owner
#[async_trait]
pub trait StepResultSink: Send + Sync {
    /// Handle one delivered step result
    async fn receive_step_result(&self, event: StepResultEvent) -> Result<(), CoreError>;
}

/// Point-in-time full state query against the record owner
#[async_trait]
pub trait AuthoritySource: Send + Sync {
    /// Snapshots of every record still in progress
    async fn fetch_in_progress(&self) -> Result<Vec<WorkflowSnapshot>, CoreError>;
}

/// Ordering between removing a pending entry and reporting the decision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Remove the entry, then report. A failed report leaves the decision to
    /// be recovered by resync.
    #[default]
    CommitThenSend,

    /// Report first and remove only once delivery succeeded. A failed report
    /// keeps the entry and fails the call.
    SendThenCommit,
}

impl fmt::Display for DeliveryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryPolicy::CommitThenSend => f.write_str("commit_then_send"),
            DeliveryPolicy::SendThenCommit => f.write_str("send_then_commit"),
        }
    }
}
