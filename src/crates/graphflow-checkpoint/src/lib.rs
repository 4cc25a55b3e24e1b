//! # graphflow-checkpoint - durable state for graph runs
//!
//! Checkpoint abstractions and the in-memory reference implementation for
//! graphflow. A checkpoint is a snapshot of a run captured after each
//! super-step: channel values, channel version counters, and the per-node
//! record of versions already consumed. The orchestrator persists one
//! checkpoint per super-step and records pending writes (executor results,
//! dispatch markers) against it, so a restarting process resumes exactly
//! where the previous one stopped.
//!
//! ## Core pieces
//!
//! - [`Checkpoint`] / [`CheckpointTuple`] / [`CheckpointConfig`] - the data
//!   model ([`checkpoint`] module)
//! - [`Channel`] and the concrete channel kinds - state containers with
//!   per-kind update semantics ([`channels`] module)
//! - [`CheckpointSaver`] - the pluggable persistence trait ([`traits`])
//! - [`InMemorySaver`] - reference backend for tests and single-process use
//! - [`SerializerProtocol`] - byte codec for off-process backends
//!
//! Production backends (SQL, object storage, a KV service) implement
//! [`CheckpointSaver`]; everything above the trait is backend-agnostic.

pub mod channels;
pub mod checkpoint;
pub mod error;
pub mod memory;
pub mod serializer;
pub mod traits;

pub use channels::{Channel, EphemeralValueChannel, LastValueChannel, TopicChannel};
pub use checkpoint::{
    ChannelVersion, ChannelVersions, Checkpoint, CheckpointConfig, CheckpointId,
    CheckpointMetadata, CheckpointSource, CheckpointTuple, PendingWrite,
};
pub use error::{CheckpointError, Result};
pub use memory::InMemorySaver;
pub use serializer::{BincodeSerializer, JsonSerializer, SerializerProtocol};
pub use traits::{CheckpointSaver, CheckpointStream};
