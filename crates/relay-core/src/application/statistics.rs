//! Aggregate statistics over workflow records

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::repository::ApprovalRecordRepository;
use crate::domain::workflow_record::WorkflowRecord;
use crate::types::{FinalStatus, PersonId};
use crate::CoreError;

/// Counts and rates over a set of workflow records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalStatistics {
    /// Records considered
    pub total_requests: usize,
    /// Records approved
    pub approved_count: usize,
    /// Records rejected
    pub rejected_count: usize,
    /// Records still in progress
    pub in_progress_count: usize,
    /// Percentage of completed records that were approved
    pub approval_rate: f64,
    /// Percentage of completed records that were rejected
    pub rejection_rate: f64,
    /// Mean number of steps per record
    pub avg_steps_count: f64,
    /// Record count per requester, omitted for per-requester statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_by_requester: Option<BTreeMap<PersonId, usize>>,
    /// Record count per final status, omitted for per-requester statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_distribution: Option<BTreeMap<FinalStatus, usize>>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl ApprovalStatistics {
    /// Compute counts and rates, without the breakdowns
    pub fn summarize(records: &[WorkflowRecord]) -> Self {
        if records.is_empty() {
            return Self::default();
        }

        let count = |status| records.iter().filter(|r| r.final_status == status).count();
        let approved = count(FinalStatus::Approved);
        let rejected = count(FinalStatus::Rejected);
        let in_progress = count(FinalStatus::InProgress);

        let completed = approved + rejected;
        let rate = |n: usize| {
            if completed == 0 {
                0.0
            } else {
                round2(n as f64 * 100.0 / completed as f64)
            }
        };

        let steps: usize = records.iter().map(WorkflowRecord::total_steps).sum();

        Self {
            total_requests: records.len(),
            approved_count: approved,
            rejected_count: rejected,
            in_progress_count: in_progress,
            approval_rate: rate(approved),
            rejection_rate: rate(rejected),
            avg_steps_count: round2(steps as f64 / records.len() as f64),
            requests_by_requester: None,
            status_distribution: None,
        }
    }

    /// Compute counts, rates and both breakdowns
    pub fn with_breakdowns(records: &[WorkflowRecord]) -> Self {
        let mut by_requester = BTreeMap::new();
        let mut by_status = BTreeMap::new();
        for record in records {
            *by_requester.entry(record.requester_id).or_insert(0) += 1;
            *by_status.entry(record.final_status).or_insert(0) += 1;
        }

        Self {
            requests_by_requester: Some(by_requester),
            status_distribution: Some(by_status),
            ..Self::summarize(records)
        }
    }
}

/// Read-only statistics over the record store
pub struct StatisticsService {
    records: Arc<dyn ApprovalRecordRepository>,
}

impl StatisticsService {
    /// Create a new statistics service
    pub fn new(records: Arc<dyn ApprovalRecordRepository>) -> Self {
        Self { records }
    }

    /// Statistics over every record
    pub async fn overall(&self) -> Result<ApprovalStatistics, CoreError> {
        let records = self.records.list_records(None, None).await?;
        Ok(ApprovalStatistics::with_breakdowns(&records))
    }

    /// Statistics over one requester's records
    pub async fn for_requester(&self, requester_id: PersonId) -> Result<ApprovalStatistics, CoreError> {
        let records = self.records.list_records(Some(requester_id), None).await?;
        Ok(ApprovalStatistics::summarize(&records))
    }
}
