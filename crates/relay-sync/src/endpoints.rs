use std::sync::{Arc, OnceLock};

use relay_core::{CoreError, SnapshotSink, StepResultSink};

/// Late-bound receiving ends of an in-process channel.
///
/// Transports are built before the services; sinks are bound once both
/// services exist.
#[derive(Default)]
pub struct SyncEndpoints {
    snapshot_sink: OnceLock<Arc<dyn SnapshotSink>>,
    result_sink: OnceLock<Arc<dyn StepResultSink>>,
}

impl SyncEndpoints {
    /// Create unbound endpoints
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the projection side; fails if already bound
    pub fn bind_snapshot_sink(&self, sink: Arc<dyn SnapshotSink>) -> Result<(), CoreError> {
        self.snapshot_sink
            .set(sink)
            .map_err(|_| CoreError::ValidationError("snapshot sink already bound".to_string()))
    }

    /// Bind the record owner side; fails if already bound
    pub fn bind_result_sink(&self, sink: Arc<dyn StepResultSink>) -> Result<(), CoreError> {
        self.result_sink
            .set(sink)
            .map_err(|_| CoreError::ValidationError("step result sink already bound".to_string()))
    }

    /// Bound projection side, a transport error until bound
    pub fn snapshot_sink(&self) -> Result<Arc<dyn SnapshotSink>, CoreError> {
        self.snapshot_sink
            .get()
            .cloned()
            .ok_or_else(|| CoreError::Transport("no snapshot receiver bound".to_string()))
    }

    /// Bound record owner side, a transport error until bound
    pub fn result_sink(&self) -> Result<Arc<dyn StepResultSink>, CoreError> {
        self.result_sink
            .get()
            .cloned()
            .ok_or_else(|| CoreError::Transport("no step result receiver bound".to_string()))
    }
}

impl std::fmt::Debug for SyncEndpoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEndpoints")
            .field("snapshot_sink_bound", &self.snapshot_sink.get().is_some())
            .field("result_sink_bound", &self.result_sink.get().is_some())
            .finish()
    }
}
