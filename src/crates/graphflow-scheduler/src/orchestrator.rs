//! The orchestrator loop: consume, advance, dispatch, commit
//!
//! An [`Orchestrator`] drives runs forward by consuming "advance this run"
//! messages from its input topic, advancing each run by one checkpointed
//! super-step, and dispatching the resulting tasks to executor workers.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  next_batch()                                                │
//! │                                                              │
//! │  1. poll: up to batch_max_n records within batch_max_ms      │
//! │  2. dedupe byte-identical payloads                           │
//! │  3. each unique message, concurrently:                       │
//! │     ┌─────────────────────────────────────────────────┐      │
//! │     │ attempt (under retry policy)                    │      │
//! │     │   open run context (load latest checkpoint)     │      │
//! │     │   tick ── false ──▶ no-op                       │      │
//! │     │     │ true                                      │      │
//! │     │   await checkpoint durability                   │      │
//! │     │   send unscheduled tasks to executor (parallel) │      │
//! │     │   all acks ──▶ persist SCHEDULED write per task │      │
//! │     └─────────────────────────────────────────────────┘      │
//! │     exhausted retries ──▶ publish ErrorMessage, continue     │
//! │  4. commit offsets, exactly once per batch                   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Delivery semantics
//!
//! Transport is at-least-once; effects are made at-most-once-per-replay by
//! ordering. The checkpoint enabling a super-step is durable before any of
//! its tasks is dispatched, and every producer acknowledgment precedes the
//! SCHEDULED write for its task. A crash between send and mark therefore
//! causes at most one duplicate dispatch per task on replay (executors key
//! on the deterministic task id), and never a missed one. Offsets advance
//! only after every message in the batch either succeeded or was routed to
//! the error topic, so an interrupted batch replays whole.
//!
//! # Deduplication
//!
//! Several upstream nodes finishing inside one batch window each emit an
//! identical wake message for the same run. Byte-identical payloads collapse
//! to one processing attempt; this is correct because the super-step engine
//! always reads the latest checkpoint.
//!
//! # Lifecycle
//!
//! [`Orchestrator::connect`] acquires the consumer, then the producer;
//! [`Orchestrator::close`] releases them in reverse order. Cancelling the
//! loop's future mid-batch leaves the batch uncommitted for redelivery.

use crate::broker::{Broker, BrokerError, Consumer, ConsumerOptions, ConsumerRecord, Producer};
use crate::codec;
use crate::error::{Result, SchedulerError};
use crate::retry::{retry, RetryPolicy};
use crate::types::{ErrorMessage, ExecutorTask, MessageToExecutor, MessageToOrchestrator, Topics};
use futures::future::{join_all, try_join_all};
use graphflow_core::constants::SCHEDULED;
use graphflow_core::pregel::{RunContext, Task};
use graphflow_core::Graph;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Tuning for an orchestrator instance
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Consumer group id (instances sharing a group share partitions)
    pub group_id: String,

    /// Maximum records consumed per batch
    pub batch_max_n: usize,

    /// Maximum time to wait for a batch, in milliseconds
    pub batch_max_ms: u64,

    /// Per-message retry policy; `None` means a single attempt
    pub retry_policy: Option<RetryPolicy>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            group_id: "orchestrator".to_string(),
            batch_max_n: 10,
            batch_max_ms: 1000,
            retry_policy: None,
        }
    }
}

impl OrchestratorOptions {
    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = group_id.into();
        self
    }

    pub fn with_batch_max_n(mut self, n: usize) -> Self {
        self.batch_max_n = n;
        self
    }

    pub fn with_batch_max_ms(mut self, ms: u64) -> Self {
        self.batch_max_ms = ms;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }
}

/// Batched, restartable consumer of orchestrator messages
pub struct Orchestrator {
    graph: Arc<Graph>,
    topics: Topics,
    options: OrchestratorOptions,
    consumer: Box<dyn Consumer>,
    producer: Arc<dyn Producer>,
}

impl Orchestrator {
    /// Acquire a consumer and producer on `broker` and wire the loop.
    ///
    /// The consumer is bound to `topics.orchestrator` under the configured
    /// group with earliest offset reset and manual commit. Acquisition is a
    /// teardown stack: if the producer fails to open, the consumer is
    /// released before the error propagates.
    pub async fn connect(
        broker: &dyn Broker,
        graph: Arc<Graph>,
        topics: Topics,
        options: OrchestratorOptions,
    ) -> Result<Self> {
        let mut consumer = broker
            .consumer(
                &topics.orchestrator,
                ConsumerOptions::for_group(&options.group_id),
            )
            .await?;
        let producer = match broker.producer().await {
            Ok(producer) => producer,
            Err(error) => {
                let _ = consumer.close().await;
                return Err(error.into());
            }
        };

        tracing::info!(
            topic = %topics.orchestrator,
            group_id = %options.group_id,
            batch_max_n = options.batch_max_n,
            batch_max_ms = options.batch_max_ms,
            "orchestrator connected"
        );

        Ok(Self {
            graph,
            topics,
            options,
            consumer,
            producer,
        })
    }

    /// Consume and process one batch.
    ///
    /// Returns the unique messages handled (empty when the window elapsed
    /// quietly; no commit is issued for an empty batch), or `None` when the
    /// consumer signals end-of-stream. Any other consumer failure
    /// propagates; the uncommitted batch is redelivered after restart.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<MessageToOrchestrator>>> {
        let records = match self
            .consumer
            .poll(
                Duration::from_millis(self.options.batch_max_ms),
                self.options.batch_max_n,
            )
            .await
        {
            Ok(records) => records,
            Err(BrokerError::Stopped) => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        if records.is_empty() {
            return Ok(Some(Vec::new()));
        }

        let unique = dedupe_payloads(&records);
        tracing::debug!(
            records = records.len(),
            unique = unique.len(),
            "processing batch"
        );

        let outcomes = join_all(unique.iter().map(|payload| self.each(payload))).await;
        let mut messages = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            if let Some(message) = outcome? {
                messages.push(message);
            }
        }

        self.consumer.commit().await?;
        Ok(Some(messages))
    }

    /// Drive batches until the consumer signals end-of-stream
    pub async fn run(&mut self) -> Result<()> {
        while let Some(batch) = self.next_batch().await? {
            if !batch.is_empty() {
                tracing::debug!(processed = batch.len(), "batch committed");
            }
        }
        tracing::info!("consumer stopped, orchestrator loop complete");
        Ok(())
    }

    /// Release the producer, then the consumer (reverse of acquisition)
    pub async fn close(mut self) -> Result<()> {
        let producer_result = self.producer.close().await;
        let consumer_result = self.consumer.close().await;
        producer_result?;
        consumer_result?;
        Ok(())
    }

    /// Process one unique payload: attempt under the retry policy, route to
    /// the error topic on exhaustion. A failed error-topic send is fatal for
    /// the batch (the commit is skipped, so the batch replays).
    async fn each(&self, payload: &[u8]) -> Result<Option<MessageToOrchestrator>> {
        match retry(self.options.retry_policy.as_ref(), || self.attempt(payload)).await {
            Ok(message) => Ok(Some(message)),
            Err(error) => {
                tracing::warn!(
                    topic = %self.topics.orchestrator,
                    error = %error,
                    "message exhausted retries, routing to error topic"
                );
                let original = serde_json::from_slice(payload).unwrap_or_else(|_| {
                    serde_json::Value::String(String::from_utf8_lossy(payload).into_owned())
                });
                let report = ErrorMessage {
                    topic: self.topics.orchestrator.clone(),
                    msg: original,
                    error: format!("{error:?}"),
                };
                let bytes = codec::dumps(&report)?;
                self.producer.send(&self.topics.error, None, bytes).await?;
                Ok(None)
            }
        }
    }

    /// One processing attempt: decode, open the run context, advance,
    /// dispatch. The context is closed on every path.
    async fn attempt(&self, payload: &[u8]) -> Result<MessageToOrchestrator> {
        let message: MessageToOrchestrator = codec::loads(payload)?;
        let mut context = RunContext::open(
            self.graph.clone(),
            message.input.clone(),
            message.config.clone(),
        )
        .await?;
        let outcome = self.advance(&mut context).await;
        let closed = context.close().await;
        outcome?;
        closed?;
        Ok(message)
    }

    /// Advance the run one super-step and dispatch its unscheduled tasks.
    async fn advance(&self, context: &mut RunContext) -> Result<()> {
        let ticked = context
            .tick(
                &self.graph.input_channels,
                &self.graph.interrupt_before,
                &self.graph.interrupt_after,
            )
            .await?;
        if !ticked {
            return Ok(());
        }

        // the checkpoint enabling these tasks precedes any dispatch
        context.await_durable().await?;

        let new_tasks: Vec<Task> = context
            .tasks()
            .values()
            .filter(|task| !task.scheduled)
            .cloned()
            .collect();
        if new_tasks.is_empty() {
            return Ok(());
        }

        // executor messages carry the config of the checkpoint that enabled
        // them, with task dedupe turned on
        let dispatch_config = context.config().for_dispatch(context.checkpoint_config());
        let key = dispatch_config.configurable.thread_id.clone();

        let mut payloads = Vec::with_capacity(new_tasks.len());
        for task in &new_tasks {
            let message = MessageToExecutor {
                config: dispatch_config.clone(),
                task: ExecutorTask {
                    id: task.id.clone(),
                    path: task.path.clone(),
                },
            };
            payloads.push(codec::dumps(&message)?);
        }

        try_join_all(payloads.into_iter().map(|payload| {
            self.producer
                .send(&self.topics.executor, key.clone(), payload)
        }))
        .await?;

        // marks follow acknowledgments: a crash here replays at most once
        let pin = match context.interrupt_horizon() {
            Some(version) => serde_json::to_value(version).map_err(SchedulerError::Encode)?,
            None => serde_json::Value::Null,
        };
        for task in &new_tasks {
            context
                .put_writes(&task.id, vec![(SCHEDULED.to_string(), pin.clone())])
                .await?;
        }

        tracing::debug!(dispatched = new_tasks.len(), "tasks dispatched and marked");
        Ok(())
    }
}

/// Collapse byte-identical payloads, preserving first-arrival order
fn dedupe_payloads(records: &[ConsumerRecord]) -> Vec<Vec<u8>> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for record in records {
        if seen.insert(record.payload.clone()) {
            unique.push(record.payload.clone());
        }
    }
    unique
}
