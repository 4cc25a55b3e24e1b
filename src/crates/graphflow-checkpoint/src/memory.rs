//! In-memory checkpoint storage for development and testing
//!
//! [`InMemorySaver`] keeps every checkpoint in a thread-safe map, one entry
//! vector per thread id. It implements the full [`CheckpointSaver`] surface
//! and is the backend the integration tests run against. Data does not
//! survive a restart; production deployments implement the trait over a
//! durable store.

use crate::checkpoint::{
    ChannelVersions, Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple,
    PendingWrite,
};
use crate::error::{CheckpointError, Result};
use crate::traits::{CheckpointSaver, CheckpointStream};
use async_trait::async_trait;
use futures::stream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Storage entry for one checkpoint
#[derive(Debug, Clone)]
struct CheckpointEntry {
    checkpoint: Checkpoint,
    metadata: CheckpointMetadata,
    config: CheckpointConfig,
    parent_config: Option<CheckpointConfig>,
    writes: Vec<PendingWrite>,
}

impl CheckpointEntry {
    fn to_tuple(&self) -> CheckpointTuple {
        CheckpointTuple {
            config: self.config.clone(),
            checkpoint: self.checkpoint.clone(),
            metadata: self.metadata.clone(),
            parent_config: self.parent_config.clone(),
            pending_writes: self.writes.clone(),
        }
    }
}

type CheckpointStorage = Arc<RwLock<HashMap<String, Vec<CheckpointEntry>>>>;

/// In-memory checkpoint saver implementation
///
/// Suitable for tests and single-process deployments. Clones share storage,
/// so a saver handed to a graph and one held by a test observe the same
/// state.
#[derive(Debug, Clone, Default)]
pub struct InMemorySaver {
    storage: CheckpointStorage,
}

impl InMemorySaver {
    /// Create a new in-memory checkpoint saver
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of threads being tracked
    pub async fn thread_count(&self) -> usize {
        self.storage.read().await.len()
    }

    /// Total number of checkpoints across all threads
    pub async fn checkpoint_count(&self) -> usize {
        self.storage
            .read()
            .await
            .values()
            .map(|entries| entries.len())
            .sum()
    }

    /// Clear all checkpoints (useful for testing)
    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

fn require_thread_id(config: &CheckpointConfig) -> Result<&String> {
    config
        .thread_id
        .as_ref()
        .ok_or_else(|| CheckpointError::Invalid("thread_id is required".to_string()))
}

#[async_trait]
impl CheckpointSaver for InMemorySaver {
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        let storage = self.storage.read().await;
        let thread_id = require_thread_id(config)?;

        let Some(entries) = storage.get(thread_id) else {
            return Ok(None);
        };

        let entry = match &config.checkpoint_id {
            Some(checkpoint_id) => entries.iter().find(|e| &e.checkpoint.id == checkpoint_id),
            None => entries.last(),
        };

        Ok(entry.map(CheckpointEntry::to_tuple))
    }

    async fn list(
        &self,
        config: Option<&CheckpointConfig>,
        filter: Option<HashMap<String, serde_json::Value>>,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> Result<CheckpointStream> {
        let storage = self.storage.read().await;
        let mut results = Vec::new();

        let thread_ids: Vec<String> = match config.and_then(|c| c.thread_id.clone()) {
            Some(thread_id) => vec![thread_id],
            None => storage.keys().cloned().collect(),
        };

        'outer: for thread_id in thread_ids {
            if let Some(entries) = storage.get(&thread_id) {
                for entry in entries.iter().rev() {
                    if let Some(before_id) =
                        before.and_then(|cfg| cfg.checkpoint_id.as_ref())
                    {
                        if entry.checkpoint.id >= *before_id {
                            continue;
                        }
                    }

                    if let Some(filter_map) = &filter {
                        let matches = filter_map
                            .iter()
                            .all(|(key, value)| entry.metadata.extra.get(key) == Some(value));
                        if !matches {
                            continue;
                        }
                    }

                    results.push(Ok(entry.to_tuple()));

                    if limit.is_some_and(|lim| results.len() >= lim) {
                        break 'outer;
                    }
                }
            }
        }

        Ok(Box::pin(stream::iter(results)))
    }

    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
        _new_versions: ChannelVersions,
    ) -> Result<CheckpointConfig> {
        let thread_id = require_thread_id(config)?.clone();

        let mut storage = self.storage.write().await;
        let entries = storage.entry(thread_id.clone()).or_default();

        let checkpoint_config = CheckpointConfig {
            thread_id: Some(thread_id),
            checkpoint_id: Some(checkpoint.id.clone()),
            checkpoint_ns: config.checkpoint_ns.clone(),
            extra: config.extra.clone(),
        };

        entries.push(CheckpointEntry {
            checkpoint,
            metadata,
            config: checkpoint_config.clone(),
            parent_config: config.checkpoint_id.as_ref().map(|_| config.clone()),
            writes: Vec::new(),
        });

        Ok(checkpoint_config)
    }

    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, serde_json::Value)>,
        task_id: String,
    ) -> Result<()> {
        let thread_id = require_thread_id(config)?.clone();
        let checkpoint_id = config
            .checkpoint_id
            .as_ref()
            .ok_or_else(|| CheckpointError::Invalid("checkpoint_id is required".to_string()))?;

        let mut storage = self.storage.write().await;

        let entry = storage
            .get_mut(&thread_id)
            .and_then(|entries| {
                entries
                    .iter_mut()
                    .find(|e| &e.checkpoint.id == checkpoint_id)
            })
            .ok_or_else(|| {
                CheckpointError::NotFound(format!("Checkpoint not found: {checkpoint_id}"))
            })?;

        for (channel, value) in writes {
            entry.writes.push((task_id.clone(), channel, value));
        }
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.storage.write().await.remove(thread_id);
        Ok(())
    }
}
