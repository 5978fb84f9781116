use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::snapshot::{StepSnapshot, WorkflowSnapshot};
use super::validation::StepRequest;
use crate::types::{FinalStatus, PersonId, RequestId, StepNumber, StepStatus};
use crate::CoreError;

/// State of one step inside a workflow record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepState {
    /// Position in the chain, 1-based
    pub step_number: StepNumber,

    /// Person who must act on this step
    pub approver_id: PersonId,

    /// Current status
    pub status: StepStatus,

    /// Remark left with the decision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// When the decision was recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Aggregate: the authoritative approval document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRecord {
    /// Unique identifier assigned by the record store
    pub request_id: RequestId,

    /// Person who submitted the workflow
    pub requester_id: PersonId,

    /// Title
    pub title: String,

    /// Body
    pub content: String,

    /// Steps in ascending step order
    pub steps: Vec<StepState>,

    /// Overall status
    pub final_status: FinalStatus,

    /// Optimistic concurrency version, bumped on every save
    pub version: u64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

/// What a step result did to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Same decision was already recorded, nothing changed
    Unchanged,

    /// Step approved and the chain moved to the next pending step
    Advanced {
        /// Step that was approved
        approved_step: StepNumber,
        /// Approver of that step
        approved_by: PersonId,
        /// New actionable step
        next_step: StepNumber,
        /// Approver of the new actionable step
        next_approver: PersonId,
    },

    /// Last pending step approved, record is now approved
    Approved {
        /// Approver of the last step
        approved_by: PersonId,
    },

    /// Step rejected, record is now rejected
    Rejected {
        /// Step that was rejected
        step_number: StepNumber,
        /// Approver who rejected
        rejected_by: PersonId,
    },
}

impl Transition {
    /// Whether the record changed and must be persisted
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Transition::Unchanged)
    }
}

impl WorkflowRecord {
    /// Create a new record with every step pending.
    ///
    /// `steps` must already have passed
    /// [`validate_step_sequence`](super::validation::validate_step_sequence).
    pub fn new(
        request_id: RequestId,
        requester_id: PersonId,
        title: impl Into<String>,
        content: impl Into<String>,
        steps: &[StepRequest],
    ) -> Result<Self, CoreError> {
        let now = Utc::now();
        let record = Self {
            request_id,
            requester_id,
            title: title.into(),
            content: content.into(),
            steps: steps
                .iter()
                .map(|s| StepState {
                    step_number: s.step_number,
                    approver_id: s.approver_id,
                    status: StepStatus::Pending,
                    comment: None,
                    updated_at: None,
                })
                .collect(),
            final_status: FinalStatus::InProgress,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        record.check_invariants()?;
        Ok(record)
    }

    /// Total number of steps
    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    /// Lowest-numbered pending step, if the record is still in progress
    pub fn actionable_step(&self) -> Option<&StepState> {
        if self.final_status.is_terminal() {
            return None;
        }
        self.steps.iter().find(|s| s.status == StepStatus::Pending)
    }

    /// Verify step numbering and status consistency.
    ///
    /// A failure here means data reached the state machine without passing
    /// validation, or was corrupted in storage.
    pub fn check_invariants(&self) -> Result<(), CoreError> {
        if self.steps.is_empty() {
            return Err(CoreError::InvariantViolation(format!(
                "request {} has no steps",
                self.request_id
            )));
        }

        for (index, step) in self.steps.iter().enumerate() {
            let expected = index as StepNumber + 1;
            if step.step_number != expected {
                return Err(CoreError::InvariantViolation(format!(
                    "request {} has step {} at position {}",
                    self.request_id, step.step_number, expected
                )));
            }
        }

        let derived = Self::derive_final_status(&self.steps);
        if derived != self.final_status {
            return Err(CoreError::InvariantViolation(format!(
                "request {} is marked {} but its steps imply {}",
                self.request_id, self.final_status, derived
            )));
        }

        Ok(())
    }

    fn derive_final_status(steps: &[StepState]) -> FinalStatus {
        if steps.iter().any(|s| s.status == StepStatus::Rejected) {
            FinalStatus::Rejected
        } else if steps.iter().all(|s| s.status == StepStatus::Approved) {
            FinalStatus::Approved
        } else {
            FinalStatus::InProgress
        }
    }

    /// Apply an approver's decision to the step it targets.
    ///
    /// Re-applying the decision already recorded on a step returns
    /// [`Transition::Unchanged`], which makes redelivered results harmless.
    pub fn apply_step_result(
        &mut self,
        step_number: StepNumber,
        approver_id: PersonId,
        status: StepStatus,
        comment: Option<String>,
    ) -> Result<Transition, CoreError> {
        self.check_invariants()?;

        if !status.is_decision() {
            return Err(CoreError::InvalidStatus(status.to_string()));
        }

        let index = self
            .steps
            .iter()
            .position(|s| s.step_number == step_number && s.approver_id == approver_id)
            .ok_or_else(|| {
                CoreError::ValidationError(format!(
                    "request {} has no step {} assigned to approver {}",
                    self.request_id, step_number, approver_id
                ))
            })?;

        let recorded = self.steps[index].status;
        if recorded == status {
            return Ok(Transition::Unchanged);
        }
        if recorded != StepStatus::Pending {
            return Err(CoreError::ConflictingResult {
                request_id: self.request_id,
                step_number,
                recorded: recorded.to_string(),
            });
        }
        if self.final_status.is_terminal() {
            return Err(CoreError::RecordTerminal {
                request_id: self.request_id,
                final_status: self.final_status.to_string(),
            });
        }
        if self.steps[..index].iter().any(|s| s.status == StepStatus::Pending) {
            return Err(CoreError::StepNotActionable {
                request_id: self.request_id,
                step_number,
            });
        }

        let now = Utc::now();
        let step = &mut self.steps[index];
        step.status = status;
        step.comment = comment;
        step.updated_at = Some(now);
        self.updated_at = now;

        let transition = match status {
            StepStatus::Rejected => {
                self.final_status = FinalStatus::Rejected;
                Transition::Rejected { step_number, rejected_by: approver_id }
            }
            _ => match self.steps.iter().find(|s| s.status == StepStatus::Pending) {
                Some(next) => Transition::Advanced {
                    approved_step: step_number,
                    approved_by: approver_id,
                    next_step: next.step_number,
                    next_approver: next.approver_id,
                },
                None => {
                    self.final_status = FinalStatus::Approved;
                    Transition::Approved { approved_by: approver_id }
                }
            },
        };

        Ok(transition)
    }

    /// Full copy of this record for the sync channel, steps in ascending order
    pub fn snapshot(&self) -> WorkflowSnapshot {
        let mut steps: Vec<StepSnapshot> = self
            .steps
            .iter()
            .map(|s| StepSnapshot {
                step_number: s.step_number,
                approver_id: s.approver_id,
                status: s.status,
            })
            .collect();
        steps.sort_by_key(|s| s.step_number);

        WorkflowSnapshot {
            request_id: self.request_id,
            requester_id: self.requester_id,
            title: self.title.clone(),
            content: self.content.clone(),
            steps,
            version: self.version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(approvers: &[u64]) -> WorkflowRecord {
        let steps: Vec<StepRequest> = approvers
            .iter()
            .enumerate()
            .map(|(i, a)| StepRequest::new(i as StepNumber + 1, PersonId(*a)))
            .collect();
        WorkflowRecord::new(RequestId(1), PersonId(1), "Trip", "Conference in Lisbon", &steps)
            .unwrap()
    }

    #[test]
    fn test_new_record_is_pending() {
        let r = record(&[10, 20]);
        assert_eq!(r.final_status, FinalStatus::InProgress);
        assert!(r.steps.iter().all(|s| s.status == StepStatus::Pending));
        assert_eq!(r.actionable_step().map(|s| s.approver_id), Some(PersonId(10)));
        assert_eq!(r.version, 1);
    }

    #[test]
    fn test_approve_advances_then_completes() {
        let mut r = record(&[10, 20]);

        let t = r.apply_step_result(1, PersonId(10), StepStatus::Approved, None).unwrap();
        assert_eq!(
            t,
            Transition::Advanced {
                approved_step: 1,
                approved_by: PersonId(10),
                next_step: 2,
                next_approver: PersonId(20),
            }
        );
        assert_eq!(r.final_status, FinalStatus::InProgress);

        let t = r.apply_step_result(2, PersonId(20), StepStatus::Approved, None).unwrap();
        assert_eq!(t, Transition::Approved { approved_by: PersonId(20) });
        assert_eq!(r.final_status, FinalStatus::Approved);
        assert!(r.actionable_step().is_none());
    }

    #[test]
    fn test_reject_is_terminal() {
        let mut r = record(&[10, 20]);
        let t = r
            .apply_step_result(1, PersonId(10), StepStatus::Rejected, Some("no budget".into()))
            .unwrap();
        assert_eq!(t, Transition::Rejected { step_number: 1, rejected_by: PersonId(10) });
        assert_eq!(r.final_status, FinalStatus::Rejected);
        assert_eq!(r.steps[0].comment.as_deref(), Some("no budget"));
        assert!(r.steps[0].updated_at.is_some());
        assert_eq!(r.steps[1].status, StepStatus::Pending);

        let err = r.apply_step_result(2, PersonId(20), StepStatus::Approved, None).unwrap_err();
        assert!(matches!(err, CoreError::RecordTerminal { .. }));
    }

    #[test]
    fn test_same_result_twice_is_noop() {
        let mut r = record(&[10, 20]);
        r.apply_step_result(1, PersonId(10), StepStatus::Rejected, None).unwrap();
        let before = r.clone();

        let t = r.apply_step_result(1, PersonId(10), StepStatus::Rejected, None).unwrap();
        assert_eq!(t, Transition::Unchanged);
        assert!(!t.is_mutation());
        assert_eq!(r, before);
    }

    #[test]
    fn test_contradicting_result_is_refused() {
        let mut r = record(&[10, 20]);
        r.apply_step_result(1, PersonId(10), StepStatus::Approved, None).unwrap();
        let err = r.apply_step_result(1, PersonId(10), StepStatus::Rejected, None).unwrap_err();
        assert!(matches!(err, CoreError::ConflictingResult { step_number: 1, .. }));
        assert_eq!(r.final_status, FinalStatus::InProgress);
    }

    #[test]
    fn test_out_of_order_result_is_refused() {
        let mut r = record(&[10, 20]);
        let err = r.apply_step_result(2, PersonId(20), StepStatus::Approved, None).unwrap_err();
        assert!(matches!(err, CoreError::StepNotActionable { step_number: 2, .. }));
    }

    #[test]
    fn test_unknown_step_or_approver() {
        let mut r = record(&[10, 20]);
        assert!(matches!(
            r.apply_step_result(1, PersonId(20), StepStatus::Approved, None),
            Err(CoreError::ValidationError(_))
        ));
        assert!(matches!(
            r.apply_step_result(7, PersonId(10), StepStatus::Approved, None),
            Err(CoreError::ValidationError(_))
        ));
    }

    #[test]
    fn test_pending_is_not_a_decision() {
        let mut r = record(&[10]);
        assert!(matches!(
            r.apply_step_result(1, PersonId(10), StepStatus::Pending, None),
            Err(CoreError::InvalidStatus(_))
        ));
    }

    #[test]
    fn test_gap_is_an_invariant_violation() {
        let mut r = record(&[10, 20]);
        r.steps[1].step_number = 3;
        let err = r.apply_step_result(1, PersonId(10), StepStatus::Approved, None).unwrap_err();
        assert!(matches!(err, CoreError::InvariantViolation(_)));
        assert_eq!(r.steps[0].status, StepStatus::Pending);
    }

    #[test]
    fn test_same_approver_on_consecutive_steps() {
        let mut r = record(&[10, 10]);
        let t = r.apply_step_result(1, PersonId(10), StepStatus::Approved, None).unwrap();
        assert!(matches!(t, Transition::Advanced { next_approver: PersonId(10), .. }));
        r.apply_step_result(2, PersonId(10), StepStatus::Approved, None).unwrap();
        assert_eq!(r.final_status, FinalStatus::Approved);
    }

    #[test]
    fn test_snapshot_copies_state() {
        let mut r = record(&[10, 20, 30]);
        r.apply_step_result(1, PersonId(10), StepStatus::Approved, None).unwrap();
        r.version = 2;

        let snap = r.snapshot();
        assert_eq!(snap.request_id, r.request_id);
        assert_eq!(snap.version, 2);
        let numbers: Vec<_> = snap.steps.iter().map(|s| s.step_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(snap.actionable_approver(), Some(PersonId(20)));
    }
}
