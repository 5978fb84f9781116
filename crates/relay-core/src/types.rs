//! Value objects and status enums shared by every Relay component.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// Value object: workflow record identifier, assigned by the record store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

/// Value object: identifier of a requester or approver
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PersonId(pub u64);

/// Position of a step in the approval chain, starting at 1
pub type StepNumber = u32;

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a single approval step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Waiting for the approver
    Pending,
    /// Approver accepted
    Approved,
    /// Approver declined
    Rejected,
}

impl StepStatus {
    /// Wire name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Approved => "approved",
            StepStatus::Rejected => "rejected",
        }
    }

    /// Whether this is a decision an approver can submit
    pub fn is_decision(&self) -> bool {
        !matches!(self, StepStatus::Pending)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StepStatus::Pending),
            "approved" => Ok(StepStatus::Approved),
            "rejected" => Ok(StepStatus::Rejected),
            other => Err(CoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// Overall status of a workflow record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    /// At least one step still pending and none rejected
    InProgress,
    /// Every step approved (terminal)
    Approved,
    /// Some step rejected (terminal)
    Rejected,
}

impl FinalStatus {
    /// Wire name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalStatus::InProgress => "in_progress",
            FinalStatus::Approved => "approved",
            FinalStatus::Rejected => "rejected",
        }
    }

    /// Terminal records accept no further transitions
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FinalStatus::InProgress)
    }
}

impl fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
