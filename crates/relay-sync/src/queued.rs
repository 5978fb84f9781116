//! Asynchronous at-least-once transport
//!
//! Messages are partitioned by request id, so every message about one record
//! goes through the same partition and is consumed in publish order. Each
//! partition has one lane per direction: snapshots towards the projection and
//! step results towards the record owner. Handling a step result publishes the
//! next snapshot, so the two directions never share a buffer; a snapshot
//! consumer publishes nothing and always drains. Each lane has one consumer
//! task that delivers with retry and parks messages that exhaust their retries
//! in a dead-letter list.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use relay_core::{
    CoreError, RequestId, SnapshotPublisher, SnapshotSink, StepResultEvent, StepResultReporter,
    StepResultSink, WorkflowSnapshot,
};
use relay_monitoring::SyncMetrics;

use crate::endpoints::SyncEndpoints;
use crate::retry::RetryPolicy;

const TRANSPORT: &str = "queued";

/// Payload carried by the bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum BusMessage {
    /// Record owner to projection
    Snapshot(WorkflowSnapshot),
    /// Projection to record owner
    StepResult(StepResultEvent),
}

impl BusMessage {
    /// Partition key
    pub fn request_id(&self) -> RequestId {
        match self {
            BusMessage::Snapshot(s) => s.request_id,
            BusMessage::StepResult(e) => e.request_id,
        }
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            BusMessage::Snapshot(_) => "snapshot",
            BusMessage::StepResult(_) => "step_result",
        }
    }
}

/// A message with its delivery metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Unique message id
    pub id: Uuid,
    /// Partition the message was routed to
    pub partition: usize,
    /// When the message was published
    pub published_at: DateTime<Utc>,
    /// The message
    pub message: BusMessage,
}

/// A message that exhausted its delivery attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    /// The undelivered message
    pub envelope: Envelope,
    /// Last delivery error
    pub error: String,
    /// When it was parked
    pub failed_at: DateTime<Utc>,
}

/// Bus settings
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Number of partitions, at least 1
    pub partitions: usize,
    /// Buffered messages per partition
    pub capacity: usize,
    /// Delivery retry per message
    pub retry: RetryPolicy,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { partitions: 3, capacity: 1024, retry: RetryPolicy::default() }
    }
}

struct Shared {
    endpoints: SyncEndpoints,
    retry: RetryPolicy,
    metrics: Arc<SyncMetrics>,
    dead_letters: Mutex<Vec<DeadLetter>>,
    in_flight: AtomicUsize,
    idle: Notify,
}

impl Shared {
    async fn deliver(&self, envelope: &Envelope) -> Result<(), CoreError> {
        let operation = match envelope.message {
            BusMessage::Snapshot(_) => "push_snapshot",
            BusMessage::StepResult(_) => "report_step_result",
        };
        self.retry
            .run(operation, &self.metrics, |_| async move {
                match &envelope.message {
                    BusMessage::Snapshot(snapshot) => {
                        self.endpoints.snapshot_sink()?.receive_snapshot(snapshot.clone()).await
                    }
                    BusMessage::StepResult(event) => {
                        self.endpoints.result_sink()?.receive_step_result(event.clone()).await
                    }
                }
            })
            .await
    }

    async fn consume(&self, envelope: Envelope) {
        let started = Instant::now();
        let request_id = envelope.message.request_id();
        let result = self.deliver(&envelope).await;
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        match &envelope.message {
            BusMessage::Snapshot(_) => {
                self.metrics.record_push(request_id.0, TRANSPORT, duration_ms, result.is_ok())
            }
            BusMessage::StepResult(_) => {
                self.metrics.record_report(request_id.0, TRANSPORT, duration_ms, result.is_ok())
            }
        }

        if let Err(e) = result {
            error!(
                message_id = %envelope.id,
                request_id = %request_id,
                kind = envelope.message.kind(),
                partition = envelope.partition,
                error = %e,
                "Delivery failed, parking message"
            );
            self.metrics
                .record_dead_letter(request_id.0, envelope.message.kind(), envelope.partition);
            self.dead_letters.lock().await.push(DeadLetter {
                envelope,
                error: e.to_string(),
                failed_at: Utc::now(),
            });
        }

        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Partitioned in-process message bus carrying both sync directions
pub struct MessageBus {
    snapshot_lanes: Vec<mpsc::Sender<Envelope>>,
    result_lanes: Vec<mpsc::Sender<Envelope>>,
    consumers: Vec<JoinHandle<()>>,
    shared: Arc<Shared>,
}

fn spawn_lane(
    shared: &Arc<Shared>,
    capacity: usize,
    partition: usize,
    lane: &'static str,
) -> (mpsc::Sender<Envelope>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Envelope>(capacity.max(1));
    let shared = shared.clone();
    let consumer = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            shared.consume(envelope).await;
        }
        debug!(partition, lane, "Lane consumer stopped");
    });
    (tx, consumer)
}

impl MessageBus {
    /// Start the bus and one consumer task per lane
    pub fn start(config: BusConfig, metrics: Arc<SyncMetrics>) -> Self {
        let shared = Arc::new(Shared {
            endpoints: SyncEndpoints::new(),
            retry: config.retry,
            metrics,
            dead_letters: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
        });

        let count = config.partitions.max(1);
        let mut snapshot_lanes = Vec::with_capacity(count);
        let mut result_lanes = Vec::with_capacity(count);
        let mut consumers = Vec::with_capacity(count * 2);
        for partition in 0..count {
            let (tx, consumer) = spawn_lane(&shared, config.capacity, partition, "snapshot");
            snapshot_lanes.push(tx);
            consumers.push(consumer);

            let (tx, consumer) = spawn_lane(&shared, config.capacity, partition, "step_result");
            result_lanes.push(tx);
            consumers.push(consumer);
        }

        info!(partitions = count, capacity = config.capacity, "Message bus started");
        Self { snapshot_lanes, result_lanes, consumers, shared }
    }

    /// Bind the projection side
    pub fn bind_snapshot_sink(&self, sink: Arc<dyn SnapshotSink>) -> Result<(), CoreError> {
        self.shared.endpoints.bind_snapshot_sink(sink)
    }

    /// Bind the record owner side
    pub fn bind_result_sink(&self, sink: Arc<dyn StepResultSink>) -> Result<(), CoreError> {
        self.shared.endpoints.bind_result_sink(sink)
    }

    /// Partition a request id maps to
    pub fn partition_for(&self, request_id: RequestId) -> usize {
        (request_id.0 % self.snapshot_lanes.len() as u64) as usize
    }

    /// Enqueue a message; returns once it is buffered, not once it is consumed
    pub async fn publish(&self, message: BusMessage) -> Result<Uuid, CoreError> {
        let partition = self.partition_for(message.request_id());
        let envelope = Envelope { id: Uuid::new_v4(), partition, published_at: Utc::now(), message };
        let id = envelope.id;

        let lane = match envelope.message {
            BusMessage::Snapshot(_) => &self.snapshot_lanes[partition],
            BusMessage::StepResult(_) => &self.result_lanes[partition],
        };

        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
        if lane.send(envelope).await.is_err() {
            self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(CoreError::Transport(format!("partition {} is closed", partition)));
        }

        debug!(message_id = %id, partition, "Published message");
        Ok(id)
    }

    /// Wait until every published message has been delivered or parked
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.shared.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Messages parked after exhausting retries
    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.shared.dead_letters.lock().await.clone()
    }

    /// Publish every parked message again, returning how many were requeued
    pub async fn redeliver_dead_letters(&self) -> Result<usize, CoreError> {
        let parked: Vec<DeadLetter> = std::mem::take(&mut *self.shared.dead_letters.lock().await);
        let count = parked.len();
        for letter in parked {
            self.publish(letter.envelope.message).await?;
        }
        if count > 0 {
            info!(count, "Requeued dead letters");
        }
        Ok(count)
    }

    /// Number of partitions
    pub fn partition_count(&self) -> usize {
        self.snapshot_lanes.len()
    }
}

impl Drop for MessageBus {
    fn drop(&mut self) {
        for consumer in &self.consumers {
            consumer.abort();
        }
    }
}

#[async_trait]
impl SnapshotPublisher for MessageBus {
    async fn push_snapshot(&self, snapshot: WorkflowSnapshot) -> Result<(), CoreError> {
        self.publish(BusMessage::Snapshot(snapshot)).await.map(|_| ())
    }
}

#[async_trait]
impl StepResultReporter for MessageBus {
    async fn report_step_result(&self, event: StepResultEvent) -> Result<(), CoreError> {
        self.publish(BusMessage::StepResult(event)).await.map(|_| ())
    }
}
