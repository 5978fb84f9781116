use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::workflow_record::{Transition, WorkflowRecord};
use crate::types::{FinalStatus, PersonId, RequestId, StepNumber};

/// Progress through the chain, attached to intermediate outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepProgress {
    /// Step that was just approved
    pub current_step: StepNumber,

    /// Number of steps in the chain
    pub total_steps: usize,
}

/// Event: outcome sent to the requester of a workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeNotification {
    /// Workflow record
    pub request_id: RequestId,

    /// Person to notify
    pub requester_id: PersonId,

    /// Record status after the transition
    pub outcome: FinalStatus,

    /// Approver whose decision caused the outcome
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<PersonId>,

    /// Set on intermediate outcomes only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_info: Option<StepProgress>,

    /// When the transition happened
    pub timestamp: DateTime<Utc>,
}

impl OutcomeNotification {
    /// Build the notification for a transition, `None` when nothing changed
    pub fn for_transition(record: &WorkflowRecord, transition: &Transition) -> Option<Self> {
        let (outcome, actor_id, step_info) = match *transition {
            Transition::Unchanged => return None,
            Transition::Advanced { approved_step, approved_by, .. } => (
                FinalStatus::InProgress,
                approved_by,
                Some(StepProgress {
                    current_step: approved_step,
                    total_steps: record.total_steps(),
                }),
            ),
            Transition::Approved { approved_by } => (FinalStatus::Approved, approved_by, None),
            Transition::Rejected { rejected_by, .. } => (FinalStatus::Rejected, rejected_by, None),
        };

        Some(Self {
            request_id: record.request_id,
            requester_id: record.requester_id,
            outcome,
            actor_id: Some(actor_id),
            step_info,
            timestamp: record.updated_at,
        })
    }

    /// Returns the type of the event as a string
    pub fn event_type(&self) -> &'static str {
        match self.outcome {
            FinalStatus::InProgress => "workflow.step_approved",
            FinalStatus::Approved => "workflow.approved",
            FinalStatus::Rejected => "workflow.rejected",
        }
    }

    /// Whether the notification reports a terminal outcome
    pub fn is_final(&self) -> bool {
        self.outcome.is_terminal()
    }
}
