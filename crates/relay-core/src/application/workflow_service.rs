use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::application::sync_channel::{
    AuthoritySource, SnapshotPublisher, StepResultSink,
};
use crate::domain::collaborators::{IdentityDirectory, NotificationDispatcher};
use crate::domain::events::OutcomeNotification;
use crate::domain::repository::ApprovalRecordRepository;
use crate::domain::snapshot::{StepResultEvent, WorkflowSnapshot};
use crate::domain::validation::{validate_step_sequence, StepRequest};
use crate::domain::workflow_record::{Transition, WorkflowRecord};
use crate::types::{FinalStatus, PersonId, RequestId};
use crate::CoreError;

/// Default number of times a step result is re-applied after losing a
/// version race
pub const DEFAULT_MAX_CONFLICT_RETRIES: usize = 3;

/// Submission of a new workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWorkflow {
    /// Person submitting the request
    pub requester_id: PersonId,
    /// Title
    pub title: String,
    /// Body
    pub content: String,
    /// Proposed approval chain
    pub steps: Vec<StepRequest>,
}

/// Service owning workflow records: creation and step transitions
pub struct WorkflowService {
    /// Repository for workflow records
    records: Arc<dyn ApprovalRecordRepository>,

    /// Identity validation
    identity: Arc<dyn IdentityDirectory>,

    /// Outcome notifications
    notifier: Arc<dyn NotificationDispatcher>,

    /// Snapshot delivery to the projection
    publisher: Arc<dyn SnapshotPublisher>,

    max_conflict_retries: usize,
}

impl WorkflowService {
    /// Create a new workflow service
    pub fn new(
        records: Arc<dyn ApprovalRecordRepository>,
        identity: Arc<dyn IdentityDirectory>,
        notifier: Arc<dyn NotificationDispatcher>,
        publisher: Arc<dyn SnapshotPublisher>,
    ) -> Self {
        Self {
            records,
            identity,
            notifier,
            publisher,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }

    /// Override how many version conflicts `apply_result` absorbs
    pub fn with_max_conflict_retries(mut self, retries: usize) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    /// Validate and persist a new workflow, then push its first snapshot
    pub async fn create(&self, request: NewWorkflow) -> Result<WorkflowRecord, CoreError> {
        if request.title.trim().is_empty() {
            return Err(CoreError::ValidationError("title must not be blank".to_string()));
        }
        if request.content.trim().is_empty() {
            return Err(CoreError::ValidationError("content must not be blank".to_string()));
        }

        let steps = validate_step_sequence(&request.steps)?;

        let mut people = BTreeSet::new();
        people.insert(request.requester_id);
        people.extend(steps.iter().map(|s| s.approver_id));
        for person_id in people {
            self.ensure_exists(person_id).await?;
        }

        let request_id = self.records.next_request_id().await?;
        let record = WorkflowRecord::new(
            request_id,
            request.requester_id,
            request.title,
            request.content,
            &steps,
        )?;
        self.records.insert(&record).await?;

        info!(
            request_id = %record.request_id,
            requester_id = %record.requester_id,
            steps = record.total_steps(),
            "Created approval request"
        );

        self.publish(record.snapshot()).await;
        Ok(record)
    }

    async fn ensure_exists(&self, person_id: PersonId) -> Result<(), CoreError> {
        match self.identity.exists(person_id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(CoreError::UnknownPerson(person_id)),
            Err(e) => {
                warn!(person_id = %person_id, error = %e, "Identity check failed, treating person as unknown");
                Err(CoreError::UnknownPerson(person_id))
            }
        }
    }

    /// Apply a step result to its record.
    ///
    /// The record is re-read and the transition re-applied when another writer
    /// saved first. Notification and snapshot push happen after the commit and
    /// never undo it.
    pub async fn apply_result(&self, event: StepResultEvent) -> Result<Transition, CoreError> {
        let mut attempt = 0;
        let (record, transition) = loop {
            let mut record = self
                .records
                .find_by_id(event.request_id)
                .await?
                .ok_or(CoreError::RecordNotFound(event.request_id))?;

            let expected_version = record.version;
            let transition = record
                .apply_step_result(
                    event.step_number,
                    event.approver_id,
                    event.status,
                    event.comment.clone(),
                )
                .map_err(|e| {
                    if let CoreError::InvariantViolation(msg) = &e {
                        error!(request_id = %event.request_id, "Refusing step result: {}", msg);
                    }
                    e
                })?;

            if !transition.is_mutation() {
                debug!(
                    request_id = %event.request_id,
                    step = event.step_number,
                    status = %event.status,
                    "Step result already applied"
                );
                return Ok(transition);
            }

            record.version = expected_version + 1;
            match self.records.save(&record, expected_version).await {
                Ok(()) => break (record, transition),
                Err(CoreError::VersionConflict { found, .. }) if attempt < self.max_conflict_retries => {
                    attempt += 1;
                    warn!(
                        request_id = %event.request_id,
                        expected_version,
                        found,
                        attempt,
                        "Version conflict while applying step result, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        };

        info!(
            request_id = %record.request_id,
            step = event.step_number,
            approver_id = %event.approver_id,
            status = %event.status,
            final_status = %record.final_status,
            "Applied step result"
        );

        if let Some(notification) = OutcomeNotification::for_transition(&record, &transition) {
            if let Err(e) = self.notifier.notify(&notification).await {
                warn!(request_id = %record.request_id, error = %e, "Failed to send notification");
            }
        }

        if let Transition::Advanced { next_step, next_approver, .. } = transition {
            debug!(
                request_id = %record.request_id,
                next_step,
                next_approver = %next_approver,
                "Pushing snapshot for next approver"
            );
            self.publish(record.snapshot()).await;
        }

        Ok(transition)
    }

    async fn publish(&self, snapshot: WorkflowSnapshot) {
        let request_id = snapshot.request_id;
        if let Err(e) = self.publisher.push_snapshot(snapshot).await {
            warn!(request_id = %request_id, error = %e, "Snapshot push failed, resync will recover it");
        }
    }

    /// Get a record by id
    pub async fn get(&self, request_id: RequestId) -> Result<WorkflowRecord, CoreError> {
        self.records
            .find_by_id(request_id)
            .await?
            .ok_or(CoreError::RecordNotFound(request_id))
    }

    /// List records, optionally filtered
    pub async fn list(
        &self,
        requester_id: Option<PersonId>,
        status: Option<FinalStatus>,
    ) -> Result<Vec<WorkflowRecord>, CoreError> {
        self.records.list_records(requester_id, status).await
    }

    /// Snapshots of every in-progress record, used by the resync pull
    pub async fn list_in_progress(&self) -> Result<Vec<WorkflowSnapshot>, CoreError> {
        let records = self.records.list_records(None, Some(FinalStatus::InProgress)).await?;
        Ok(records.iter().map(WorkflowRecord::snapshot).collect())
    }
}

#[async_trait]
impl StepResultSink for WorkflowService {
    async fn receive_step_result(&self, event: StepResultEvent) -> Result<(), CoreError> {
        self.apply_result(event).await.map(|_| ())
    }
}

#[async_trait]
impl AuthoritySource for WorkflowService {
    async fn fetch_in_progress(&self) -> Result<Vec<WorkflowSnapshot>, CoreError> {
        self.list_in_progress().await
    }
}
