//! Messages carried by the sync channel
//!
//! A snapshot is a self-contained copy of a workflow record at push time, never
//! a delta, so re-applying one is always safe.

use serde::{Deserialize, Serialize};

use crate::types::{PersonId, RequestId, StepNumber, StepStatus};

/// Step as seen by the projection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSnapshot {
    /// Position in the chain
    #[serde(alias = "step")]
    pub step_number: StepNumber,
    /// Assigned approver
    pub approver_id: PersonId,
    /// Status at push time
    pub status: StepStatus,
}

/// Full copy of a workflow record pushed from the record owner to the projection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSnapshot {
    /// Workflow record
    pub request_id: RequestId,
    /// Person who submitted the workflow
    pub requester_id: PersonId,
    /// Title of the request
    pub title: String,
    /// Body of the request
    pub content: String,
    /// Steps in ascending step order
    pub steps: Vec<StepSnapshot>,
    /// Record version the snapshot was taken from
    #[serde(default)]
    pub version: u64,
}

impl WorkflowSnapshot {
    /// The lowest-numbered step still pending.
    ///
    /// Steps are sorted by step number before the lookup, so a sender that
    /// emits steps out of order cannot misroute the entry.
    pub fn actionable_step(&self) -> Option<&StepSnapshot> {
        let mut ordered: Vec<&StepSnapshot> = self.steps.iter().collect();
        ordered.sort_by_key(|s| s.step_number);
        ordered.into_iter().find(|s| s.status == StepStatus::Pending)
    }

    /// Approver the projection should index this snapshot under
    pub fn actionable_approver(&self) -> Option<PersonId> {
        self.actionable_step().map(|s| s.approver_id)
    }

    /// Pending step assigned to `approver_id`, if any
    pub fn pending_step_for(&self, approver_id: PersonId) -> Option<StepNumber> {
        self.steps
            .iter()
            .filter(|s| s.approver_id == approver_id && s.status == StepStatus::Pending)
            .map(|s| s.step_number)
            .min()
    }
}

/// Outcome of an approver's decision, sent from the projection owner to the
/// record owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResultEvent {
    /// Workflow record
    pub request_id: RequestId,
    /// Step the decision applies to
    #[serde(alias = "step")]
    pub step_number: StepNumber,
    /// Approver who decided
    pub approver_id: PersonId,
    /// Decision
    pub status: StepStatus,
    /// Optional remark from the approver
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}
