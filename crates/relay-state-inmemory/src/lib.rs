//! In-memory state stores for Relay
//!
//! This crate provides in-memory implementations of the repository and
//! collaborator interfaces defined in relay-core. It backs development,
//! tests and single-node deployments where durability is not required.

use std::sync::Arc;

use relay_core::{ApprovalRecordRepository, PendingQueueStore, Person};

pub mod directory;
pub mod pending_queue;
pub mod records;

pub use directory::InMemoryDirectory;
pub use pending_queue::InMemoryPendingQueue;
pub use records::InMemoryApprovalRecordRepository;

/// Provider for in-memory state store repositories
pub struct InMemoryStateStoreProvider {
    // Single instance, it owns the id counter
    records: Arc<InMemoryApprovalRecordRepository>,

    directory: Arc<InMemoryDirectory>,
}

impl InMemoryStateStoreProvider {
    /// Create a new in-memory state store provider
    pub fn new() -> Self {
        Self {
            records: Arc::new(InMemoryApprovalRecordRepository::default()),
            directory: Arc::new(InMemoryDirectory::default()),
        }
    }

    /// Seed the people directory
    pub fn with_people(mut self, people: impl IntoIterator<Item = Person>) -> Self {
        self.directory = Arc::new(InMemoryDirectory::new(people));
        self
    }

    /// Record repository over this provider's storage
    pub fn record_repository(&self) -> Arc<dyn ApprovalRecordRepository> {
        self.records.clone()
    }

    /// A fresh, empty projection store
    pub fn pending_queue(&self) -> Arc<dyn PendingQueueStore> {
        Arc::new(InMemoryPendingQueue::new())
    }

    /// The people directory
    pub fn directory(&self) -> Arc<InMemoryDirectory> {
        self.directory.clone()
    }
}

impl Default for InMemoryStateStoreProvider {
    fn default() -> Self {
        Self::new()
    }
}
