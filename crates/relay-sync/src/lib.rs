//! Sync channel transports for Relay.
//!
//! Every transport implements the `relay-core` sync contracts, so services are
//! wired the same way whichever one is picked:
//!
//! - [`DirectChannel`]: in-process synchronous call with timeout
//! - [`MessageBus`]: partitioned asynchronous at-least-once delivery
//! - [`ResyncCoordinator`]: cold-start pull from the record owner
//! - [`http`]: synchronous call across processes

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod direct;
pub mod endpoints;
pub mod http;
pub mod pull;
pub mod queued;
pub mod retry;

pub use direct::DirectChannel;
pub use endpoints::SyncEndpoints;
pub use http::{HttpAuthoritySource, HttpSnapshotPublisher, HttpStepResultReporter, HttpSyncClient};
pub use pull::ResyncCoordinator;
pub use queued::{BusConfig, BusMessage, DeadLetter, Envelope, MessageBus};
pub use retry::RetryPolicy;
