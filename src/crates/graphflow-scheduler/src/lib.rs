//! # graphflow-scheduler - broker-driven run orchestration
//!
//! Advances durable graph runs by exchanging messages over a partitioned,
//! replayable log. The [`Orchestrator`] consumes wake messages in bounded
//! batches, advances each run by one checkpointed super-step through
//! `graphflow-core`, dispatches ready tasks to executor workers, and commits
//! consumer offsets once per fully handled batch.
//!
//! Delivery is at-least-once end to end; idempotency comes from
//! deterministic task ids plus SCHEDULED markers persisted after producer
//! acknowledgment (see the [`orchestrator`] module for the ordering
//! argument).
//!
//! - [`orchestrator`] - the consume/advance/dispatch/commit loop
//! - [`broker`] - consumer/producer traits and the in-memory broker
//! - [`retry`] - per-message bounded retry with jittered backoff
//! - [`types`] / [`codec`] - wire records and the symmetric codec

pub mod broker;
pub mod codec;
pub mod error;
pub mod orchestrator;
pub mod retry;
pub mod types;

pub use broker::{
    Broker, BrokerError, CommitEntry, Consumer, ConsumerOptions, ConsumerRecord, InMemoryBroker,
    OffsetReset, Producer,
};
pub use error::{Result, SchedulerError};
pub use orchestrator::{Orchestrator, OrchestratorOptions};
pub use retry::{retry, RetryPolicy};
pub use types::{ErrorMessage, ExecutorTask, MessageToExecutor, MessageToOrchestrator, Topics};
