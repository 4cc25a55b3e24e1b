//! Wire types exchanged over the broker

use graphflow_core::{PathSegment, RunConfig};
use serde::{Deserialize, Serialize};

/// Topic names the orchestrator is wired to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Topics {
    /// Input: wake/advance messages for runs
    pub orchestrator: String,
    /// Output: task dispatches to executor workers
    pub executor: String,
    /// Output: messages that exhausted their retries
    pub error: String,
}

impl Topics {
    pub fn new(
        orchestrator: impl Into<String>,
        executor: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            orchestrator: orchestrator.into(),
            executor: executor.into(),
            error: error.into(),
        }
    }
}

/// "Advance this run" message consumed from the orchestrator topic.
///
/// `input` seeds a new run; wake messages for in-flight runs carry `None`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageToOrchestrator {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    pub config: RunConfig,
}

/// Task reference dispatched to executors.
///
/// Only the id and lineage travel; the executor re-derives the task body
/// from the graph definition and the checkpoint named in the message config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutorTask {
    pub id: String,
    pub path: Vec<PathSegment>,
}

/// Dispatch message produced to the executor topic
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageToExecutor {
    pub config: RunConfig,
    pub task: ExecutorTask,
}

/// A message that exhausted its retries, with its cause
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorMessage {
    /// Topic the original message was consumed from
    pub topic: String,
    /// The original payload (decoded when possible, lossy text otherwise)
    pub msg: serde_json::Value,
    /// Stringified cause
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_orchestrator_message_wire_shape() {
        let msg = MessageToOrchestrator {
            input: Some(json!({"x": 1})),
            config: RunConfig::for_thread("t1"),
        };
        let wire = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            wire,
            json!({
                "input": {"x": 1},
                "config": {"configurable": {"thread_id": "t1"}}
            })
        );
    }

    #[test]
    fn test_wake_message_omits_input() {
        let msg = MessageToOrchestrator {
            input: None,
            config: RunConfig::for_thread("t1"),
        };
        let wire = serde_json::to_value(&msg).unwrap();
        assert!(wire.get("input").is_none());
    }

    #[test]
    fn test_executor_message_round_trip() {
        let msg = MessageToExecutor {
            config: RunConfig::for_thread("t1"),
            task: ExecutorTask {
                id: "task-1".to_string(),
                path: vec![PathSegment::Pull("n".to_string())],
            },
        };
        let bytes = serde_json::to_vec(&msg).unwrap();
        let back: MessageToExecutor = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, msg);
    }
}
