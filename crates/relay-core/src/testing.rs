//! In-process fakes for collaborators and sync channel endpoints
//!
//! Enabled for unit tests and, through the `testing` feature, for tests in the
//! other workspace crates.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use crate::application::sync_channel::{SnapshotPublisher, StepResultReporter};
use crate::domain::collaborators::{IdentityDirectory, NotificationDispatcher};
use crate::domain::events::OutcomeNotification;
use crate::domain::snapshot::{StepResultEvent, WorkflowSnapshot};
use crate::types::PersonId;
use crate::CoreError;

/// Identity directory backed by a fixed set of ids
#[derive(Debug, Default)]
pub struct StaticIdentity {
    known: HashSet<PersonId>,
    unavailable: bool,
}

impl StaticIdentity {
    /// Directory knowing exactly these ids
    pub fn with_ids(ids: impl IntoIterator<Item = u64>) -> Self {
        Self { known: ids.into_iter().map(PersonId).collect(), unavailable: false }
    }

    /// Directory whose every lookup fails
    pub fn unavailable() -> Self {
        Self { known: HashSet::new(), unavailable: true }
    }
}

#[async_trait]
impl IdentityDirectory for StaticIdentity {
    async fn exists(&self, person_id: PersonId) -> Result<bool, CoreError> {
        if self.unavailable {
            return Err(CoreError::Transport("identity directory unavailable".to_string()));
        }
        Ok(self.known.contains(&person_id))
    }
}

/// Notification dispatcher that keeps everything it is given
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<OutcomeNotification>>,
}

impl RecordingNotifier {
    /// Notifications received so far
    pub async fn sent(&self) -> Vec<OutcomeNotification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn notify(&self, notification: &OutcomeNotification) -> Result<(), CoreError> {
        self.sent.lock().await.push(notification.clone());
        Ok(())
    }
}

/// Snapshot publisher that records pushes and can be switched to failing
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    pushed: Mutex<Vec<WorkflowSnapshot>>,
    failing: AtomicBool,
}

impl RecordingPublisher {
    /// Snapshots pushed successfully
    pub async fn pushed(&self) -> Vec<WorkflowSnapshot> {
        self.pushed.lock().await.clone()
    }

    /// Make subsequent pushes fail with a transport error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl SnapshotPublisher for RecordingPublisher {
    async fn push_snapshot(&self, snapshot: WorkflowSnapshot) -> Result<(), CoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CoreError::Transport("projection unreachable".to_string()));
        }
        self.pushed.lock().await.push(snapshot);
        Ok(())
    }
}

/// Step result reporter that records reports and can be switched to failing
#[derive(Debug, Default)]
pub struct RecordingReporter {
    reported: Mutex<Vec<StepResultEvent>>,
    failing: AtomicBool,
}

impl RecordingReporter {
    /// Events reported successfully
    pub async fn reported(&self) -> Vec<StepResultEvent> {
        self.reported.lock().await.clone()
    }

    /// Make subsequent reports fail with a transport error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl StepResultReporter for RecordingReporter {
    async fn report_step_result(&self, event: StepResultEvent) -> Result<(), CoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CoreError::Transport("record owner unreachable".to_string()));
        }
        self.reported.lock().await.push(event);
        Ok(())
    }
}
