use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use relay_core::{
    ApprovalRecordRepository, CoreError, FinalStatus, PersonId, RequestId, WorkflowRecord,
};

/// In-memory implementation of the ApprovalRecordRepository
pub struct InMemoryApprovalRecordRepository {
    records: Arc<RwLock<BTreeMap<RequestId, WorkflowRecord>>>,
    last_id: AtomicU64,
}

impl InMemoryApprovalRecordRepository {
    /// Create a repository over shared storage.
    ///
    /// Id assignment continues after the highest id already stored.
    pub fn new(records: Arc<RwLock<BTreeMap<RequestId, WorkflowRecord>>>) -> Self {
        let last_id = records
            .try_read()
            .ok()
            .and_then(|r| r.keys().next_back().map(|id| id.0))
            .unwrap_or(0);
        Self { records, last_id: AtomicU64::new(last_id) }
    }
}

impl Default for InMemoryApprovalRecordRepository {
    fn default() -> Self {
        Self::new(Arc::new(RwLock::new(BTreeMap::new())))
    }
}

#[async_trait]
impl ApprovalRecordRepository for InMemoryApprovalRecordRepository {
    async fn next_request_id(&self) -> Result<RequestId, CoreError> {
        Ok(RequestId(self.last_id.fetch_add(1, Ordering::SeqCst) + 1))
    }

    async fn insert(&self, record: &WorkflowRecord) -> Result<(), CoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.request_id) {
            return Err(CoreError::StateStoreError(format!(
                "Approval request {} already exists",
                record.request_id
            )));
        }
        records.insert(record.request_id, record.clone());
        self.last_id.fetch_max(record.request_id.0, Ordering::SeqCst);
        Ok(())
    }

    async fn find_by_id(&self, id: RequestId) -> Result<Option<WorkflowRecord>, CoreError> {
        let records = self.records.read().await;
        Ok(records.get(&id).cloned())
    }

    async fn save(&self, record: &WorkflowRecord, expected_version: u64) -> Result<(), CoreError> {
        let mut records = self.records.write().await;
        let stored = records
            .get_mut(&record.request_id)
            .ok_or(CoreError::RecordNotFound(record.request_id))?;

        if stored.version != expected_version {
            debug!(
                request_id = %record.request_id,
                expected_version,
                found = stored.version,
                "Rejecting stale save"
            );
            return Err(CoreError::VersionConflict {
                request_id: record.request_id,
                expected: expected_version,
                found: stored.version,
            });
        }

        *stored = record.clone();
        Ok(())
    }

    async fn list_records(
        &self,
        requester_id: Option<PersonId>,
        status: Option<FinalStatus>,
    ) -> Result<Vec<WorkflowRecord>, CoreError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| requester_id.map_or(true, |id| r.requester_id == id))
            .filter(|r| status.map_or(true, |s| r.final_status == s))
            .cloned()
            .collect())
    }
}
