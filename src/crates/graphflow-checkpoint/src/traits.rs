//! The [`CheckpointSaver`] trait: pluggable checkpoint persistence
//!
//! A checkpoint saver is the durable store behind every run. The orchestrator
//! writes one checkpoint per super-step and records pending writes (executor
//! results, SCHEDULED dispatch markers) against the checkpoint they belong
//! to. Backends implement this trait over whatever storage they prefer;
//! [`InMemorySaver`](crate::memory::InMemorySaver) is the reference
//! implementation used in tests and single-process deployments.
//!
//! # Contract
//!
//! - `put` is atomic per checkpoint: once it returns, `get_tuple` for the
//!   thread observes the new checkpoint (and `pending_writes` recorded later
//!   attach to it).
//! - The saver may be shared by several orchestrator instances. Per-run
//!   single-writer is enforced externally (partition assignment hashes one
//!   run's messages to one consumer); the saver itself only needs
//!   last-writer-wins per thread.
//! - `put_writes` is idempotent enough for at-least-once callers: replaying
//!   the same `(task_id, channel)` write is harmless because readers
//!   deduplicate by task id.

use crate::checkpoint::{
    ChannelVersions, Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple,
};
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;

/// Stream of checkpoint tuples returned by [`CheckpointSaver::list`]
pub type CheckpointStream = BoxStream<'static, Result<CheckpointTuple>>;

/// Persistence backend for checkpoints and pending writes
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Fetch a checkpoint without its surrounding tuple.
    ///
    /// Default implementation delegates to [`get_tuple`](Self::get_tuple).
    async fn get(&self, config: &CheckpointConfig) -> Result<Option<Checkpoint>> {
        Ok(self.get_tuple(config).await?.map(|t| t.checkpoint))
    }

    /// Fetch the checkpoint identified by `config`.
    ///
    /// When `config.checkpoint_id` is absent, returns the latest checkpoint
    /// for `config.thread_id`. The returned tuple carries the pending writes
    /// recorded against that checkpoint.
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>>;

    /// List checkpoints, newest first, optionally filtered.
    ///
    /// `config` restricts to one thread; `filter` matches against metadata
    /// extras; `before` excludes checkpoints at or after the given id;
    /// `limit` caps the result count.
    async fn list(
        &self,
        config: Option<&CheckpointConfig>,
        filter: Option<HashMap<String, serde_json::Value>>,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> Result<CheckpointStream>;

    /// Store a checkpoint and return the config identifying it.
    ///
    /// `new_versions` names the channel versions introduced by this
    /// checkpoint; backends that store channel values out-of-line use it to
    /// write only what changed.
    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
        new_versions: ChannelVersions,
    ) -> Result<CheckpointConfig>;

    /// Record intermediate writes against the checkpoint named by `config`.
    ///
    /// `config.checkpoint_id` is required: writes attach to a specific
    /// checkpoint, not to the thread head.
    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, serde_json::Value)>,
        task_id: String,
    ) -> Result<()>;

    /// Delete all checkpoints and writes for a thread
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;
}
