//! Step sequence validation
//!
//! Runs before a workflow record is created. Approver identity is checked
//! elsewhere; this module only looks at step numbering.

use serde::{Deserialize, Serialize};

use crate::types::{PersonId, StepNumber};
use crate::CoreError;

/// One proposed step of a new workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRequest {
    /// Requested position in the chain
    #[serde(alias = "step")]
    pub step_number: StepNumber,

    /// Person who must act on this step
    pub approver_id: PersonId,
}

impl StepRequest {
    /// Create a step request
    pub fn new(step_number: StepNumber, approver_id: PersonId) -> Self {
        Self { step_number, approver_id }
    }
}

/// Validate that the step numbers, once sorted, are exactly `1..=N`.
///
/// Returns the steps in ascending step order, which is the order every
/// downstream component relies on. An empty list is rejected because a
/// workflow without approvers could never reach a terminal status.
pub fn validate_step_sequence(steps: &[StepRequest]) -> Result<Vec<StepRequest>, CoreError> {
    if steps.is_empty() {
        return Err(CoreError::InvalidStepOrder(
            "at least one approval step is required".to_string(),
        ));
    }

    let mut sorted = steps.to_vec();
    sorted.sort_by_key(|s| s.step_number);

    for (index, step) in sorted.iter().enumerate() {
        let expected = index as StepNumber + 1;
        if step.step_number != expected {
            return Err(CoreError::InvalidStepOrder(format!(
                "expected step {} but found step {}",
                expected, step.step_number
            )));
        }
    }

    Ok(sorted)
}
