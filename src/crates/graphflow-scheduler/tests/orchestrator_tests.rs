//! End-to-end orchestrator scenarios against the in-memory broker and saver

use async_trait::async_trait;
use graphflow_checkpoint::{
    ChannelVersions, Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver,
    CheckpointStream, CheckpointError, InMemorySaver,
};
use graphflow_core::constants::{SCHEDULED, START};
use graphflow_core::{ChannelSpec, Graph, NodeSpec, PathSegment, RunConfig};
use graphflow_scheduler::{
    codec, Broker, BrokerError, Consumer, ConsumerOptions, InMemoryBroker, MessageToExecutor,
    MessageToOrchestrator, Orchestrator, OrchestratorOptions, Producer, RetryPolicy, Topics,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn topics() -> Topics {
    Topics::new("orchestrator", "executor", "error")
}

fn fast_options() -> OrchestratorOptions {
    OrchestratorOptions::default().with_batch_max_ms(50)
}

/// START -> n -> END
fn single_node_graph(saver: Arc<dyn CheckpointSaver>) -> Arc<Graph> {
    Arc::new(
        Graph::builder(saver)
            .add_channel(START, ChannelSpec::Ephemeral)
            .add_channel("n", ChannelSpec::LastValue)
            .add_node(
                NodeSpec::new("n")
                    .with_triggers([START])
                    .with_reads([START])
                    .with_writes(["n"]),
            )
            .with_input_channels([START])
            .with_output_channels(["n"])
            .build()
            .unwrap(),
    )
}

/// START fans out to `count` parallel nodes
fn fan_out_graph(saver: Arc<dyn CheckpointSaver>, count: usize) -> Arc<Graph> {
    let mut builder = Graph::builder(saver).add_channel(START, ChannelSpec::Ephemeral);
    for i in 0..count {
        let name = format!("n{i}");
        builder = builder.add_channel(&name, ChannelSpec::LastValue).add_node(
            NodeSpec::new(&name)
                .with_triggers([START])
                .with_reads([START])
                .with_writes([name.clone()]),
        );
    }
    builder
        .with_input_channels([START])
        .build()
        .map(Arc::new)
        .unwrap()
}

/// START -> first -> second
fn chain_graph(saver: Arc<dyn CheckpointSaver>) -> Arc<Graph> {
    Arc::new(
        Graph::builder(saver)
            .add_channel(START, ChannelSpec::Ephemeral)
            .add_channel("first", ChannelSpec::LastValue)
            .add_channel("second", ChannelSpec::LastValue)
            .add_node(
                NodeSpec::new("first")
                    .with_triggers([START])
                    .with_reads([START])
                    .with_writes(["first"]),
            )
            .add_node(
                NodeSpec::new("second")
                    .with_triggers(["first"])
                    .with_reads(["first"])
                    .with_writes(["second"]),
            )
            .with_input_channels([START])
            .with_output_channels(["second"])
            .build()
            .unwrap(),
    )
}

fn start_payload(thread: &str, input: Value) -> Vec<u8> {
    codec::dumps(&MessageToOrchestrator {
        input: Some(input),
        config: RunConfig::for_thread(thread),
    })
    .unwrap()
}

fn wake_payload(thread: &str) -> Vec<u8> {
    codec::dumps(&MessageToOrchestrator {
        input: None,
        config: RunConfig::for_thread(thread),
    })
    .unwrap()
}

/// Play the executor's part for every dispatch at or past `from`: record the
/// node's result against the checkpoint named in the message config, then
/// publish a wake for the run.
async fn simulate_executors(
    broker: &InMemoryBroker,
    saver: &dyn CheckpointSaver,
    results: &HashMap<String, Value>,
    from: usize,
) {
    let dispatches = broker.messages("executor").await;
    for payload in &dispatches[from..] {
        let msg: MessageToExecutor = codec::loads(payload).unwrap();
        let node = match &msg.task.path[0] {
            PathSegment::Pull(node) => node.clone(),
            PathSegment::Push(_) => panic!("unexpected push task"),
        };
        let checkpoint_config = msg.config.checkpoint_config().unwrap();
        saver
            .put_writes(
                &checkpoint_config,
                vec![(node.clone(), results[&node].clone())],
                msg.task.id.clone(),
            )
            .await
            .unwrap();

        let thread = msg.config.thread_id().unwrap().to_string();
        broker
            .publish("orchestrator", Some(&thread), wake_payload(&thread))
            .await
            .unwrap();
    }
}

// --- S1: single task dispatch ---------------------------------------------

#[tokio::test]
async fn s1_single_task_dispatch() {
    let broker = InMemoryBroker::new();
    let saver = Arc::new(InMemorySaver::new());
    let graph = single_node_graph(saver.clone());

    broker
        .publish("orchestrator", Some("t1"), start_payload("t1", json!({"x": 1})))
        .await
        .unwrap();

    let mut orch = Orchestrator::connect(&broker, graph, topics(), fast_options())
        .await
        .unwrap();
    let batch = orch.next_batch().await.unwrap().unwrap();
    assert_eq!(batch.len(), 1);
    orch.close().await.unwrap();

    let dispatches = broker.messages("executor").await;
    assert_eq!(dispatches.len(), 1);
    assert!(broker.messages("error").await.is_empty());

    let msg: MessageToExecutor = codec::loads(&dispatches[0]).unwrap();
    assert_eq!(msg.task.path, vec![PathSegment::Pull("n".to_string())]);
    // the dispatch config names the enabling checkpoint and turns dedupe on
    assert!(msg.config.configurable.checkpoint_id.is_some());
    assert_eq!(msg.config.configurable.dedupe_tasks, Some(true));

    // one checkpoint persisted, with the SCHEDULED marker attached
    assert_eq!(saver.checkpoint_count().await, 1);
    let tuple = saver
        .get_tuple(&CheckpointConfig::new().with_thread_id("t1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        tuple.pending_writes,
        vec![(msg.task.id.clone(), SCHEDULED.to_string(), Value::Null)]
    );
}

#[tokio::test]
async fn s1_task_id_deterministic_across_fresh_deployments() {
    let mut ids = Vec::new();
    for _ in 0..2 {
        let broker = InMemoryBroker::new();
        let saver = Arc::new(InMemorySaver::new());
        let graph = single_node_graph(saver);
        broker
            .publish("orchestrator", Some("t1"), start_payload("t1", json!({"x": 1})))
            .await
            .unwrap();

        let mut orch = Orchestrator::connect(&broker, graph, topics(), fast_options())
            .await
            .unwrap();
        orch.next_batch().await.unwrap().unwrap();
        orch.close().await.unwrap();

        let msg: MessageToExecutor =
            codec::loads(&broker.messages("executor").await[0]).unwrap();
        ids.push(msg.task.id);
    }
    assert_eq!(ids[0], ids[1]);
}

// --- S2: dedupe within batch ----------------------------------------------

#[tokio::test]
async fn s2_dedupe_within_batch() {
    let broker = InMemoryBroker::new();
    let saver = Arc::new(InMemorySaver::new());
    let graph = single_node_graph(saver);

    let payload = start_payload("t1", json!({"x": 1}));
    for _ in 0..3 {
        broker
            .publish("orchestrator", Some("t1"), payload.clone())
            .await
            .unwrap();
    }

    let mut orch = Orchestrator::connect(&broker, graph, topics(), fast_options())
        .await
        .unwrap();
    let batch = orch.next_batch().await.unwrap().unwrap();
    assert_eq!(batch.len(), 1);
    orch.close().await.unwrap();

    // one dispatch despite three deliveries
    assert_eq!(broker.messages("executor").await.len(), 1);

    // one commit covering all three offsets
    let commits = broker.commits("orchestrator").await;
    assert_eq!(commits.len(), 1);
    assert_eq!(broker.committed_total("orchestrator", "orchestrator").await, 3);
}

// --- S3: replay after crash ------------------------------------------------

/// Saver that parks SCHEDULED marks forever while armed, freezing the
/// orchestrator between producer acknowledgment and mark persistence.
struct HangingMarkSaver {
    inner: InMemorySaver,
    hang_marks: AtomicBool,
}

impl HangingMarkSaver {
    fn new(inner: InMemorySaver) -> Self {
        Self {
            inner,
            hang_marks: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl CheckpointSaver for HangingMarkSaver {
    async fn get_tuple(
        &self,
        config: &CheckpointConfig,
    ) -> graphflow_checkpoint::Result<Option<graphflow_checkpoint::CheckpointTuple>> {
        self.inner.get_tuple(config).await
    }

    async fn list(
        &self,
        config: Option<&CheckpointConfig>,
        filter: Option<HashMap<String, Value>>,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> graphflow_checkpoint::Result<CheckpointStream> {
        self.inner.list(config, filter, before, limit).await
    }

    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
        new_versions: ChannelVersions,
    ) -> graphflow_checkpoint::Result<CheckpointConfig> {
        self.inner.put(config, checkpoint, metadata, new_versions).await
    }

    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, Value)>,
        task_id: String,
    ) -> graphflow_checkpoint::Result<()> {
        if self.hang_marks.load(Ordering::SeqCst)
            && writes.iter().any(|(channel, _)| channel == SCHEDULED)
        {
            futures::future::pending::<()>().await;
        }
        self.inner.put_writes(config, writes, task_id).await
    }

    async fn delete_thread(&self, thread_id: &str) -> graphflow_checkpoint::Result<()> {
        self.inner.delete_thread(thread_id).await
    }
}

async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..400 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn s3_replay_after_crash_duplicates_at_most_once() {
    let broker = InMemoryBroker::new();
    let shared = InMemorySaver::new();
    let hanging = Arc::new(HangingMarkSaver::new(shared.clone()));

    broker
        .publish("orchestrator", Some("t1"), start_payload("t1", json!({"x": 1})))
        .await
        .unwrap();

    // first incarnation: dispatch acked, then frozen before the mark
    let graph = single_node_graph(hanging.clone());
    let mut orch = Orchestrator::connect(&broker, graph, topics(), fast_options())
        .await
        .unwrap();
    let crashed = tokio::spawn(async move { orch.next_batch().await });
    wait_until(|| {
        let broker = broker.clone();
        async move { broker.messages("executor").await.len() == 1 }
    })
    .await;
    crashed.abort();
    let _ = crashed.await;

    let first: MessageToExecutor =
        codec::loads(&broker.messages("executor").await[0]).unwrap();

    // restart against the same saver; the uncommitted message is redelivered
    hanging.hang_marks.store(false, Ordering::SeqCst);
    let graph = single_node_graph(Arc::new(shared.clone()));
    let mut orch = Orchestrator::connect(&broker, graph.clone(), topics(), fast_options())
        .await
        .unwrap();
    let batch = orch.next_batch().await.unwrap().unwrap();
    assert_eq!(batch.len(), 1);

    // exactly one duplicate, same task id, and the mark is now persisted
    let dispatches = broker.messages("executor").await;
    assert_eq!(dispatches.len(), 2);
    let second: MessageToExecutor = codec::loads(&dispatches[1]).unwrap();
    assert_eq!(second.task.id, first.task.id);

    // further deliveries of the same message dispatch nothing
    broker
        .publish("orchestrator", Some("t1"), start_payload("t1", json!({"x": 1})))
        .await
        .unwrap();
    orch.next_batch().await.unwrap().unwrap();
    assert_eq!(broker.messages("executor").await.len(), 2);
    assert!(broker.messages("error").await.is_empty());
    orch.close().await.unwrap();
}

// --- S4: error routing ------------------------------------------------------

#[tokio::test]
async fn s4_malformed_payload_routes_to_error_topic() {
    let broker = InMemoryBroker::new();
    let saver = Arc::new(InMemorySaver::new());
    let graph = single_node_graph(saver);

    broker
        .publish("orchestrator", None, b"definitely not json".to_vec())
        .await
        .unwrap();

    let options = fast_options().with_retry_policy(
        RetryPolicy::new(2).with_initial_interval(0.001).with_jitter(0.0),
    );
    let mut orch = Orchestrator::connect(&broker, graph, topics(), options)
        .await
        .unwrap();
    let batch = orch.next_batch().await.unwrap().unwrap();
    // the malformed message is handled, not returned
    assert!(batch.is_empty());
    orch.close().await.unwrap();

    let errors = broker.messages("error").await;
    assert_eq!(errors.len(), 1);
    let report: graphflow_scheduler::ErrorMessage = codec::loads(&errors[0]).unwrap();
    assert_eq!(report.topic, "orchestrator");
    assert_eq!(report.msg, json!("definitely not json"));
    assert!(report.error.contains("Decode"));

    // the batch still commits
    assert_eq!(broker.committed_total("orchestrator", "orchestrator").await, 1);
    assert!(broker.messages("executor").await.is_empty());
}

/// Saver whose loads fail while armed, counting the attempts it rejected.
struct FailingLoadSaver {
    inner: InMemorySaver,
    failures_left: AtomicUsize,
    attempts: AtomicUsize,
}

#[async_trait]
impl CheckpointSaver for FailingLoadSaver {
    async fn get_tuple(
        &self,
        config: &CheckpointConfig,
    ) -> graphflow_checkpoint::Result<Option<graphflow_checkpoint::CheckpointTuple>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failures_left.load(Ordering::SeqCst) > 0 {
            self.failures_left.fetch_sub(1, Ordering::SeqCst);
            return Err(CheckpointError::Storage("simulated contention".into()));
        }
        self.inner.get_tuple(config).await
    }

    async fn list(
        &self,
        config: Option<&CheckpointConfig>,
        filter: Option<HashMap<String, Value>>,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> graphflow_checkpoint::Result<CheckpointStream> {
        self.inner.list(config, filter, before, limit).await
    }

    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
        new_versions: ChannelVersions,
    ) -> graphflow_checkpoint::Result<CheckpointConfig> {
        self.inner.put(config, checkpoint, metadata, new_versions).await
    }

    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, Value)>,
        task_id: String,
    ) -> graphflow_checkpoint::Result<()> {
        self.inner.put_writes(config, writes, task_id).await
    }

    async fn delete_thread(&self, thread_id: &str) -> graphflow_checkpoint::Result<()> {
        self.inner.delete_thread(thread_id).await
    }
}

#[tokio::test]
async fn s4_retry_policy_bounds_attempts_then_routes() {
    let broker = InMemoryBroker::new();
    let saver = Arc::new(FailingLoadSaver {
        inner: InMemorySaver::new(),
        failures_left: AtomicUsize::new(usize::MAX),
        attempts: AtomicUsize::new(0),
    });
    let graph = single_node_graph(saver.clone());

    broker
        .publish("orchestrator", Some("t1"), start_payload("t1", json!({"x": 1})))
        .await
        .unwrap();

    let options = fast_options().with_retry_policy(
        RetryPolicy::new(2).with_initial_interval(0.001).with_jitter(0.0),
    );
    let mut orch = Orchestrator::connect(&broker, graph, topics(), options)
        .await
        .unwrap();
    orch.next_batch().await.unwrap().unwrap();
    orch.close().await.unwrap();

    assert_eq!(saver.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(broker.messages("error").await.len(), 1);
    assert_eq!(broker.committed_total("orchestrator", "orchestrator").await, 1);
}

#[tokio::test]
async fn s4_one_bad_message_does_not_poison_the_batch() {
    let broker = InMemoryBroker::new();
    let saver = Arc::new(InMemorySaver::new());
    let graph = single_node_graph(saver);

    broker
        .publish("orchestrator", None, b"garbage".to_vec())
        .await
        .unwrap();
    broker
        .publish("orchestrator", Some("t1"), start_payload("t1", json!({"x": 1})))
        .await
        .unwrap();

    let mut orch = Orchestrator::connect(&broker, graph, topics(), fast_options())
        .await
        .unwrap();
    let batch = orch.next_batch().await.unwrap().unwrap();
    orch.close().await.unwrap();

    assert_eq!(batch.len(), 1);
    assert_eq!(broker.messages("executor").await.len(), 1);
    assert_eq!(broker.messages("error").await.len(), 1);
}

// --- S5: quiescent tick -----------------------------------------------------

#[tokio::test]
async fn s5_quiescent_wake_is_a_noop() {
    let broker = InMemoryBroker::new();
    let saver = Arc::new(InMemorySaver::new());
    let graph = single_node_graph(saver.clone());

    broker
        .publish("orchestrator", Some("t1"), start_payload("t1", json!({"x": 1})))
        .await
        .unwrap();

    let mut orch = Orchestrator::connect(&broker, graph, topics(), fast_options())
        .await
        .unwrap();
    orch.next_batch().await.unwrap().unwrap();

    // executor finishes the only task and wakes the run
    let results = HashMap::from([("n".to_string(), json!({"y": 2}))]);
    simulate_executors(&broker, saver.as_ref(), &results, 0).await;
    orch.next_batch().await.unwrap().unwrap();

    // the run is now quiescent: a further wake does nothing
    broker
        .publish("orchestrator", Some("t1"), wake_payload("t1"))
        .await
        .unwrap();
    let executor_before = broker.messages("executor").await.len();
    let commits_before = broker.commits("orchestrator").await.len();

    let batch = orch.next_batch().await.unwrap().unwrap();
    assert_eq!(batch.len(), 1);
    orch.close().await.unwrap();

    assert_eq!(broker.messages("executor").await.len(), executor_before);
    assert!(broker.messages("error").await.is_empty());
    assert_eq!(
        broker.commits("orchestrator").await.len(),
        commits_before + 1
    );
}

// --- S6: parallel sends -----------------------------------------------------

#[tokio::test]
async fn s6_fan_out_dispatches_all_tasks_then_marks_all() {
    let broker = InMemoryBroker::new();
    let saver = Arc::new(InMemorySaver::new());
    let graph = fan_out_graph(saver.clone(), 5);

    broker
        .publish("orchestrator", Some("t1"), start_payload("t1", json!({"x": 1})))
        .await
        .unwrap();

    let mut orch = Orchestrator::connect(&broker, graph, topics(), fast_options())
        .await
        .unwrap();
    orch.next_batch().await.unwrap().unwrap();
    orch.close().await.unwrap();

    let dispatches = broker.messages("executor").await;
    assert_eq!(dispatches.len(), 5);
    let mut nodes: Vec<String> = dispatches
        .iter()
        .map(|payload| {
            let msg: MessageToExecutor = codec::loads(payload).unwrap();
            match &msg.task.path[0] {
                PathSegment::Pull(node) => node.clone(),
                PathSegment::Push(_) => panic!("unexpected push task"),
            }
        })
        .collect();
    nodes.sort();
    assert_eq!(nodes, vec!["n0", "n1", "n2", "n3", "n4"]);

    // exactly five SCHEDULED marks, all after acknowledgment
    let tuple = saver
        .get_tuple(&CheckpointConfig::new().with_thread_id("t1"))
        .await
        .unwrap()
        .unwrap();
    let marks: Vec<_> = tuple
        .pending_writes
        .iter()
        .filter(|(_, channel, _)| channel == SCHEDULED)
        .collect();
    assert_eq!(marks.len(), 5);
}

/// Producer wrapper that refuses executor-topic sends.
struct ExecutorSendFailure {
    inner: Arc<dyn Producer>,
}

#[async_trait]
impl Producer for ExecutorSendFailure {
    async fn send(
        &self,
        topic: &str,
        key: Option<String>,
        payload: Vec<u8>,
    ) -> std::result::Result<(), BrokerError> {
        if topic == "executor" {
            return Err(BrokerError::Io("executor partition leader lost".into()));
        }
        self.inner.send(topic, key, payload).await
    }

    async fn close(&self) -> std::result::Result<(), BrokerError> {
        self.inner.close().await
    }
}

struct FailingExecutorBroker {
    inner: InMemoryBroker,
}

#[async_trait]
impl Broker for FailingExecutorBroker {
    async fn consumer(
        &self,
        topic: &str,
        options: ConsumerOptions,
    ) -> std::result::Result<Box<dyn Consumer>, BrokerError> {
        self.inner.consumer(topic, options).await
    }

    async fn producer(&self) -> std::result::Result<Arc<dyn Producer>, BrokerError> {
        Ok(Arc::new(ExecutorSendFailure {
            inner: self.inner.producer().await?,
        }))
    }
}

#[tokio::test]
async fn send_failure_leaves_no_scheduled_marks() {
    let broker = InMemoryBroker::new();
    let saver = Arc::new(InMemorySaver::new());
    let graph = single_node_graph(saver.clone());

    broker
        .publish("orchestrator", Some("t1"), start_payload("t1", json!({"x": 1})))
        .await
        .unwrap();

    let failing = FailingExecutorBroker {
        inner: broker.clone(),
    };
    let mut orch = Orchestrator::connect(&failing, graph, topics(), fast_options())
        .await
        .unwrap();
    orch.next_batch().await.unwrap().unwrap();
    orch.close().await.unwrap();

    // the attempt failed after zero acknowledgments: no marks may exist
    let tuple = saver
        .get_tuple(&CheckpointConfig::new().with_thread_id("t1"))
        .await
        .unwrap()
        .unwrap();
    assert!(tuple.pending_writes.is_empty());
    assert_eq!(broker.messages("error").await.len(), 1);
    assert!(broker.messages("executor").await.is_empty());
}

// --- multi-step drive -------------------------------------------------------

#[tokio::test]
async fn chain_advances_one_super_step_per_message() {
    let broker = InMemoryBroker::new();
    let saver = Arc::new(InMemorySaver::new());
    let graph = chain_graph(saver.clone());

    broker
        .publish("orchestrator", Some("t1"), start_payload("t1", json!({"x": 0})))
        .await
        .unwrap();

    let mut orch = Orchestrator::connect(&broker, graph, topics(), fast_options())
        .await
        .unwrap();
    let results = HashMap::from([
        ("first".to_string(), json!({"x": 1})),
        ("second".to_string(), json!({"x": 2})),
    ]);

    // step 0: first is dispatched
    orch.next_batch().await.unwrap().unwrap();
    assert_eq!(broker.messages("executor").await.len(), 1);

    // first's result wakes the run; step 1 dispatches second
    simulate_executors(&broker, saver.as_ref(), &results, 0).await;
    orch.next_batch().await.unwrap().unwrap();
    assert_eq!(broker.messages("executor").await.len(), 2);

    // second's result wakes the run; nothing further is due
    simulate_executors(&broker, saver.as_ref(), &results, 1).await;
    orch.next_batch().await.unwrap().unwrap();
    assert_eq!(broker.messages("executor").await.len(), 2);
    assert!(broker.messages("error").await.is_empty());
    orch.close().await.unwrap();

    // final state: both results folded into the latest checkpoint
    let tuple = saver
        .get_tuple(&CheckpointConfig::new().with_thread_id("t1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tuple.checkpoint.channel_values.get("second"), Some(&json!({"x": 2})));
    assert_eq!(tuple.metadata.step, Some(1));
}

// --- loop mechanics ---------------------------------------------------------

#[tokio::test]
async fn empty_batch_yields_empty_list_without_commit() {
    let broker = InMemoryBroker::new();
    let saver = Arc::new(InMemorySaver::new());
    let graph = single_node_graph(saver);

    let mut orch = Orchestrator::connect(&broker, graph, topics(), fast_options())
        .await
        .unwrap();
    let batch = orch.next_batch().await.unwrap().unwrap();
    assert!(batch.is_empty());
    assert!(broker.commits("orchestrator").await.is_empty());
    orch.close().await.unwrap();
}

#[tokio::test]
async fn run_terminates_on_broker_shutdown() {
    let broker = InMemoryBroker::new();
    let saver = Arc::new(InMemorySaver::new());
    let graph = single_node_graph(saver);

    let mut orch = Orchestrator::connect(&broker, graph, topics(), fast_options())
        .await
        .unwrap();
    let driver = tokio::spawn(async move {
        let result = orch.run().await;
        (result, orch)
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    broker.shutdown().await;

    let (result, orch) = driver.await.unwrap();
    result.unwrap();
    orch.close().await.unwrap();
}
