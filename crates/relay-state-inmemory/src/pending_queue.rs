//! Concurrent keyed collection for the pending-queue projection
//!
//! Entries live in per-approver queues so work on different approvers never
//! contends. A per-request index remembers which queue holds the request and
//! the newest snapshot version seen for it. Every mutation locks the index
//! slot of its request first and the approver queue second.
//!
//! A slot whose request left every queue stays behind as a tombstone so a late
//! redelivery cannot bring the entry back. Only the most recent tombstones are
//! kept; older ones are evicted oldest first.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use tracing::{debug, trace};

use relay_core::{
    CoreError, IngestOutcome, PendingQueueStore, PersonId, RequestId, WorkflowSnapshot,
};

#[derive(Debug, Default, Clone, Copy)]
struct IndexSlot {
    approver_id: Option<PersonId>,
    latest_version: u64,
}

/// Tombstones kept before the oldest is evicted
pub const DEFAULT_TOMBSTONE_LIMIT: usize = 100_000;

/// In-memory implementation of the PendingQueueStore
#[derive(Debug)]
pub struct InMemoryPendingQueue {
    queues: DashMap<PersonId, BTreeMap<RequestId, WorkflowSnapshot>>,
    index: DashMap<RequestId, IndexSlot>,
    // (request, version at which it left every queue), oldest first
    tombstones: Mutex<VecDeque<(RequestId, u64)>>,
    tombstone_limit: usize,
}

impl Default for InMemoryPendingQueue {
    fn default() -> Self {
        Self::with_tombstone_limit(DEFAULT_TOMBSTONE_LIMIT)
    }
}

impl InMemoryPendingQueue {
    /// Create an empty projection store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty projection store keeping at most `limit` tombstones
    pub fn with_tombstone_limit(limit: usize) -> Self {
        Self {
            queues: DashMap::new(),
            index: DashMap::new(),
            tombstones: Mutex::new(VecDeque::new()),
            tombstone_limit: limit,
        }
    }

    /// Number of requests the index remembers, live entries and tombstones
    pub fn indexed_requests(&self) -> usize {
        self.index.len()
    }

    /// Must be called without holding any index slot.
    fn bury(&self, request_id: RequestId, version: u64) {
        let evicted: Vec<(RequestId, u64)> = {
            let mut tombstones = match self.tombstones.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            tombstones.push_back((request_id, version));
            let excess = tombstones.len().saturating_sub(self.tombstone_limit);
            tombstones.drain(..excess).collect()
        };

        for (request_id, version) in evicted {
            // a slot that came back to life or moved on keeps its state
            let removed = self.index.remove_if(&request_id, |_, slot| {
                slot.approver_id.is_none() && slot.latest_version == version
            });
            if removed.is_some() {
                debug!(request_id = %request_id, version, "Evicted projection tombstone");
            }
        }
    }

    fn take_from_queue(&self, approver_id: PersonId, request_id: RequestId) -> Option<WorkflowSnapshot> {
        let removed = self
            .queues
            .get_mut(&approver_id)
            .and_then(|mut queue| queue.remove(&request_id));
        self.queues.remove_if(&approver_id, |_, queue| queue.is_empty());
        removed
    }
}

#[async_trait]
impl PendingQueueStore for InMemoryPendingQueue {
    async fn apply_snapshot(
        &self,
        approver_id: Option<PersonId>,
        snapshot: WorkflowSnapshot,
    ) -> Result<IngestOutcome, CoreError> {
        let request_id = snapshot.request_id;
        let mut slot = self.index.entry(request_id).or_default();

        if snapshot.version != 0 && snapshot.version <= slot.latest_version {
            return Ok(IngestOutcome::Stale { latest_version: slot.latest_version });
        }

        let replaced = slot.approver_id.take();
        if let Some(previous) = replaced {
            self.take_from_queue(previous, request_id);
        }
        slot.latest_version = slot.latest_version.max(snapshot.version);

        let outcome = match approver_id {
            Some(approver_id) => {
                self.queues.entry(approver_id).or_default().insert(request_id, snapshot);
                slot.approver_id = Some(approver_id);
                IngestOutcome::Indexed { approver_id, replaced }
            }
            None => IngestOutcome::Dropped { replaced },
        };
        let latest_version = slot.latest_version;
        drop(slot);

        if let IngestOutcome::Dropped { .. } = outcome {
            self.bury(request_id, latest_version);
        }
        trace!(request_id = %request_id, outcome = ?outcome, "Applied snapshot to projection");
        Ok(outcome)
    }

    async fn list(&self, approver_id: PersonId) -> Result<Vec<WorkflowSnapshot>, CoreError> {
        Ok(self
            .queues
            .get(&approver_id)
            .map(|queue| queue.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get(
        &self,
        approver_id: PersonId,
        request_id: RequestId,
    ) -> Result<Option<WorkflowSnapshot>, CoreError> {
        Ok(self
            .queues
            .get(&approver_id)
            .and_then(|queue| queue.get(&request_id).cloned()))
    }

    async fn remove(
        &self,
        approver_id: PersonId,
        request_id: RequestId,
    ) -> Result<Option<WorkflowSnapshot>, CoreError> {
        let Some(mut slot) = self.index.get_mut(&request_id) else {
            return Ok(None);
        };
        if slot.approver_id != Some(approver_id) {
            return Ok(None);
        }
        slot.approver_id = None;
        let removed = self.take_from_queue(approver_id, request_id);
        let latest_version = slot.latest_version;
        drop(slot);

        self.bury(request_id, latest_version);
        Ok(removed)
    }

    async fn clear(&self) -> Result<(), CoreError> {
        self.index.clear();
        self.queues.clear();
        match self.tombstones.lock() {
            Ok(mut tombstones) => tombstones.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
        Ok(())
    }

    async fn len(&self) -> Result<usize, CoreError> {
        Ok(self.queues.iter().map(|queue| queue.len()).sum())
    }
}
