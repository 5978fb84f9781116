//! Repository traits for Relay
//!
//! The record owner persists workflow records through
//! [`ApprovalRecordRepository`]; the projection owner keeps its per-approver
//! index in a [`PendingQueueStore`]. External crates implement both to provide
//! different persistence mechanisms.

use async_trait::async_trait;

use super::snapshot::WorkflowSnapshot;
use super::workflow_record::WorkflowRecord;
use crate::types::{FinalStatus, PersonId, RequestId};
use crate::CoreError;

/// Repository for workflow records, single writer per record
#[async_trait]
pub trait ApprovalRecordRepository: Send + Sync {
    /// Reserve the next request id; ids are strictly increasing
    async fn next_request_id(&self) -> Result<RequestId, CoreError>;

    /// Store a new record, failing if the id is already taken
    async fn insert(&self, record: &WorkflowRecord) -> Result<(), CoreError>;

    /// Find a record by id
    async fn find_by_id(&self, id: RequestId) -> Result<Option<WorkflowRecord>, CoreError>;

    /// Replace a record if the stored version still equals `expected_version`.
    ///
    /// Fails with [`CoreError::VersionConflict`] when another writer saved
    /// first, and with [`CoreError::RecordNotFound`] for an unknown id.
    async fn save(&self, record: &WorkflowRecord, expected_version: u64) -> Result<(), CoreError>;

    /// List records ordered by id, with optional filters
    async fn list_records(
        &self,
        requester_id: Option<PersonId>,
        status: Option<FinalStatus>,
    ) -> Result<Vec<WorkflowRecord>, CoreError>;
}

/// Result of indexing a snapshot in the projection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Snapshot stored under the actionable approver
    Indexed {
        /// Queue the snapshot now lives in
        approver_id: PersonId,
        /// Queue that held the previous snapshot of the same request, if any
        replaced: Option<PersonId>,
    },

    /// No pending step; any previous entry for the request was removed
    Dropped {
        /// Queue that held the previous snapshot of the same request, if any
        replaced: Option<PersonId>,
    },

    /// Older than a snapshot already seen for the request, ignored
    Stale {
        /// Newest version seen for the request
        latest_version: u64,
    },
}

/// Keyed concurrent collection backing the pending-queue projection.
///
/// Each request lives under at most one approver. Implementations must apply
/// [`PendingQueueStore::apply_snapshot`] atomically with respect to the other
/// mutations on the same request.
#[async_trait]
pub trait PendingQueueStore: Send + Sync {
    /// Replace whatever is indexed for `snapshot.request_id` with `snapshot`
    /// under `approver_id`, or just remove it when `approver_id` is `None`.
    ///
    /// Snapshots with a non-zero version not newer than the last version seen
    /// for the request are ignored. Version 0 means unversioned and always
    /// wins.
    async fn apply_snapshot(
        &self,
        approver_id: Option<PersonId>,
        snapshot: WorkflowSnapshot,
    ) -> Result<IngestOutcome, CoreError>;

    /// Snapshots queued for an approver, ordered by request id
    async fn list(&self, approver_id: PersonId) -> Result<Vec<WorkflowSnapshot>, CoreError>;

    /// Look up one entry without removing it
    async fn get(
        &self,
        approver_id: PersonId,
        request_id: RequestId,
    ) -> Result<Option<WorkflowSnapshot>, CoreError>;

    /// Remove and return one entry
    async fn remove(
        &self,
        approver_id: PersonId,
        request_id: RequestId,
    ) -> Result<Option<WorkflowSnapshot>, CoreError>;

    /// Drop every entry and every remembered version
    async fn clear(&self) -> Result<(), CoreError>;

    /// Total number of entries across all approvers
    async fn len(&self) -> Result<usize, CoreError>;
}
