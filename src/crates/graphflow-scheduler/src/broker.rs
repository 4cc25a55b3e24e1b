//! Broker abstraction and in-memory implementation
//!
//! The orchestrator consumes and produces through the [`Consumer`] /
//! [`Producer`] traits, which mirror the slice of a Kafka-style client the
//! loop actually needs: batched polling with a time window, manual offset
//! commit, acknowledged sends. Real client bindings live outside this crate
//! behind the same traits; [`InMemoryBroker`] is the in-process
//! implementation used by tests and single-machine deployments.
//!
//! The in-memory broker keeps the properties the loop's correctness
//! argument relies on:
//!
//! - topics are partitioned; a message key hashes to a partition, so one
//!   run's messages (keyed by thread id) stay FIFO relative to each other
//! - consumer groups track committed offsets; a restarted consumer resumes
//!   from the last commit (offset reset `earliest` when none)
//! - `shutdown` stops consumers with [`BrokerError::Stopped`], the
//!   end-of-stream signal that terminates the orchestrator loop normally

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

/// Errors surfaced by broker clients
#[derive(Error, Debug)]
pub enum BrokerError {
    /// The consumer was stopped (broker shutdown or close); end-of-stream
    #[error("Consumer stopped")]
    Stopped,

    /// A broker operation timed out; retryable
    #[error("Broker operation timed out: {0}")]
    Timeout(String),

    /// The producer is closed; terminal
    #[error("Producer closed: {0}")]
    Closed(String),

    /// Transport failure; terminal for the current batch
    #[error("Broker I/O error: {0}")]
    Io(String),
}

/// Where a fresh consumer group starts reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetReset {
    Earliest,
    Latest,
}

/// Options the orchestrator passes when opening its consumer
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    pub group_id: String,
    pub auto_offset_reset: OffsetReset,
    pub enable_auto_commit: bool,
}

impl ConsumerOptions {
    /// The orchestrator's settings: earliest reset, manual commit
    pub fn for_group(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            auto_offset_reset: OffsetReset::Earliest,
            enable_auto_commit: false,
        }
    }
}

/// One record fetched from a topic partition
#[derive(Debug, Clone)]
pub struct ConsumerRecord {
    pub topic: String,
    pub partition: usize,
    pub offset: usize,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

/// Batched, manually committed topic consumer
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Wait up to `max_wait` for up to `max_records` records across all
    /// assigned partitions. An empty vec means the window elapsed quietly.
    async fn poll(
        &mut self,
        max_wait: Duration,
        max_records: usize,
    ) -> std::result::Result<Vec<ConsumerRecord>, BrokerError>;

    /// Commit the offsets of everything returned by `poll` so far
    async fn commit(&mut self) -> std::result::Result<(), BrokerError>;

    /// Release the consumer; later polls return [`BrokerError::Stopped`]
    async fn close(&mut self) -> std::result::Result<(), BrokerError>;
}

/// Topic producer whose `send` resolves on acknowledgment
#[async_trait]
pub trait Producer: Send + Sync {
    /// Publish a record; returns once the broker has acknowledged it.
    /// Records with the same key land on the same partition.
    async fn send(
        &self,
        topic: &str,
        key: Option<String>,
        payload: Vec<u8>,
    ) -> std::result::Result<(), BrokerError>;

    /// Release the producer
    async fn close(&self) -> std::result::Result<(), BrokerError>;
}

/// Factory for consumers and producers bound to one broker
#[async_trait]
pub trait Broker: Send + Sync {
    async fn consumer(
        &self,
        topic: &str,
        options: ConsumerOptions,
    ) -> std::result::Result<Box<dyn Consumer>, BrokerError>;

    async fn producer(&self) -> std::result::Result<Arc<dyn Producer>, BrokerError>;
}

#[derive(Debug, Clone)]
struct Record {
    key: Option<String>,
    payload: Vec<u8>,
}

/// One commit issued by a consumer: the group and the offsets it covered
#[derive(Debug, Clone)]
pub struct CommitEntry {
    pub group_id: String,
    /// (topic, partition) to next-offset-to-read
    pub offsets: HashMap<(String, usize), usize>,
}

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, Vec<Vec<Record>>>,
    committed: HashMap<String, HashMap<(String, usize), usize>>,
    commit_log: Vec<CommitEntry>,
    published: usize,
    stopped: bool,
}

struct BrokerInner {
    partitions: usize,
    state: Mutex<BrokerState>,
    notify: Notify,
}

/// In-process partitioned broker
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    /// Broker with the default partition count (4)
    pub fn new() -> Self {
        Self::with_partitions(4)
    }

    pub fn with_partitions(partitions: usize) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                partitions: partitions.max(1),
                state: Mutex::new(BrokerState::default()),
                notify: Notify::new(),
            }),
        }
    }

    fn partition_for(&self, key: Option<&str>, fallback: usize) -> usize {
        match key {
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                (hasher.finish() as usize) % self.inner.partitions
            }
            None => fallback % self.inner.partitions,
        }
    }

    /// Publish a record directly (the initiator side of the protocol)
    pub async fn publish(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: Vec<u8>,
    ) -> std::result::Result<(), BrokerError> {
        let mut state = self.inner.state.lock().await;
        if state.stopped {
            return Err(BrokerError::Closed(topic.to_string()));
        }
        let fallback = state.published;
        state.published += 1;
        let partition = self.partition_for(key, fallback);
        let partitions = self.inner.partitions;
        state
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); partitions])[partition]
            .push(Record {
                key: key.map(str::to_string),
                payload,
            });
        drop(state);
        self.inner.notify.notify_waiters();
        Ok(())
    }

    /// All payloads on a topic, partition-major, for assertions
    pub async fn messages(&self, topic: &str) -> Vec<Vec<u8>> {
        let state = self.inner.state.lock().await;
        state
            .topics
            .get(topic)
            .map(|partitions| {
                partitions
                    .iter()
                    .flat_map(|records| records.iter().map(|r| r.payload.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Commits issued by the given group, in order
    pub async fn commits(&self, group_id: &str) -> Vec<CommitEntry> {
        let state = self.inner.state.lock().await;
        state
            .commit_log
            .iter()
            .filter(|entry| entry.group_id == group_id)
            .cloned()
            .collect()
    }

    /// Total committed offset for a group on a topic (sum over partitions)
    pub async fn committed_total(&self, group_id: &str, topic: &str) -> usize {
        let state = self.inner.state.lock().await;
        state
            .committed
            .get(group_id)
            .map(|offsets| {
                offsets
                    .iter()
                    .filter(|((t, _), _)| t == topic)
                    .map(|(_, next)| *next)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Stop the broker; consumers observe end-of-stream on their next poll
    pub async fn shutdown(&self) {
        self.inner.state.lock().await.stopped = true;
        self.inner.notify.notify_waiters();
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn consumer(
        &self,
        topic: &str,
        options: ConsumerOptions,
    ) -> std::result::Result<Box<dyn Consumer>, BrokerError> {
        let state = self.inner.state.lock().await;
        if state.stopped {
            return Err(BrokerError::Stopped);
        }

        let mut positions = HashMap::new();
        for partition in 0..self.inner.partitions {
            let committed = state
                .committed
                .get(&options.group_id)
                .and_then(|offsets| offsets.get(&(topic.to_string(), partition)))
                .copied();
            let position = match (committed, options.auto_offset_reset) {
                (Some(next), _) => next,
                (None, OffsetReset::Earliest) => 0,
                (None, OffsetReset::Latest) => state
                    .topics
                    .get(topic)
                    .map(|parts| parts[partition].len())
                    .unwrap_or(0),
            };
            positions.insert(partition, position);
        }

        Ok(Box::new(InMemoryConsumer {
            inner: self.inner.clone(),
            topic: topic.to_string(),
            group_id: options.group_id,
            auto_commit: options.enable_auto_commit,
            positions,
            closed: false,
        }))
    }

    async fn producer(&self) -> std::result::Result<Arc<dyn Producer>, BrokerError> {
        Ok(Arc::new(InMemoryProducer {
            broker: self.clone(),
            closed: Mutex::new(false),
        }))
    }
}

struct InMemoryConsumer {
    inner: Arc<BrokerInner>,
    topic: String,
    group_id: String,
    auto_commit: bool,
    positions: HashMap<usize, usize>,
    closed: bool,
}

impl InMemoryConsumer {
    fn drain(
        positions: &mut HashMap<usize, usize>,
        topic: &str,
        state: &BrokerState,
        batch: &mut Vec<ConsumerRecord>,
        max_records: usize,
    ) {
        let Some(partitions) = state.topics.get(topic) else {
            return;
        };
        for (partition, records) in partitions.iter().enumerate() {
            let position = positions.entry(partition).or_insert(0);
            while *position < records.len() && batch.len() < max_records {
                let record = &records[*position];
                batch.push(ConsumerRecord {
                    topic: topic.to_string(),
                    partition,
                    offset: *position,
                    key: record.key.clone(),
                    payload: record.payload.clone(),
                });
                *position += 1;
            }
        }
    }

    async fn commit_positions(&self) -> std::result::Result<(), BrokerError> {
        let mut state = self.inner.state.lock().await;
        let offsets: HashMap<(String, usize), usize> = self
            .positions
            .iter()
            .map(|(partition, next)| ((self.topic.clone(), *partition), *next))
            .collect();
        state
            .committed
            .entry(self.group_id.clone())
            .or_default()
            .extend(offsets.clone());
        state.commit_log.push(CommitEntry {
            group_id: self.group_id.clone(),
            offsets,
        });
        Ok(())
    }
}

#[async_trait]
impl Consumer for InMemoryConsumer {
    async fn poll(
        &mut self,
        max_wait: Duration,
        max_records: usize,
    ) -> std::result::Result<Vec<ConsumerRecord>, BrokerError> {
        if self.closed {
            return Err(BrokerError::Stopped);
        }
        let deadline = Instant::now() + max_wait;
        let mut batch = Vec::new();

        loop {
            let notified = self.inner.notify.notified();
            {
                let state = self.inner.state.lock().await;
                if state.stopped {
                    return Err(BrokerError::Stopped);
                }
                Self::drain(
                    &mut self.positions,
                    &self.topic,
                    &state,
                    &mut batch,
                    max_records,
                );
            }

            if batch.len() >= max_records || Instant::now() >= deadline {
                break;
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(deadline) => break,
            }
        }

        if self.auto_commit && !batch.is_empty() {
            self.commit_positions().await?;
        }
        Ok(batch)
    }

    async fn commit(&mut self) -> std::result::Result<(), BrokerError> {
        if self.closed {
            return Err(BrokerError::Stopped);
        }
        self.commit_positions().await
    }

    async fn close(&mut self) -> std::result::Result<(), BrokerError> {
        self.closed = true;
        Ok(())
    }
}

struct InMemoryProducer {
    broker: InMemoryBroker,
    closed: Mutex<bool>,
}

#[async_trait]
impl Producer for InMemoryProducer {
    async fn send(
        &self,
        topic: &str,
        key: Option<String>,
        payload: Vec<u8>,
    ) -> std::result::Result<(), BrokerError> {
        if *self.closed.lock().await {
            return Err(BrokerError::Closed(topic.to_string()));
        }
        self.broker.publish(topic, key.as_deref(), payload).await
    }

    async fn close(&self) -> std::result::Result<(), BrokerError> {
        *self.closed.lock().await = true;
        Ok(())
    }
}
