//! # graphflow-core - graph topology and super-step engine
//!
//! The orchestrator-side core of graphflow: a [`Graph`] describes a
//! workflow's channel/trigger topology, and a [`RunContext`] advances one
//! run of that graph by one checkpointed super-step at a time. Node bodies
//! are not here; they live in executor workers that receive task dispatches
//! and record results through the checkpoint store.
//!
//! See the [`pregel`] module for the engine, [`graph`] for topology,
//! [`config`] for the configuration envelope carried by every message.

pub mod config;
pub mod constants;
pub mod error;
pub mod graph;
pub mod pregel;
pub mod store;

pub use config::{Configurable, RunConfig};
pub use error::{GraphError, Result};
pub use graph::{ChannelSpec, Graph, GraphBuilder, NodeSpec};
pub use pregel::{PathSegment, RunContext, Task};
pub use store::{InMemoryStore, Store};
