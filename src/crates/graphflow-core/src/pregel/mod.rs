//! Pregel-style super-step engine
//!
//! A run advances in super-steps: all nodes whose triggers are satisfied by
//! the current channel state are prepared together, their results are
//! applied at a barrier, and a checkpoint is written before anything that
//! depends on the new state happens. In the distributed deployment the
//! barrier spans processes: the orchestrator prepares tasks and dispatches
//! them, executors run node bodies and record results as pending writes,
//! and the next orchestrator tick folds those results forward.
//!
//! - [`algo`] - task preparation, write application, interrupt gating
//! - [`types`] - tasks, lineage paths, deterministic task ids
//! - [`context`] - the scoped per-message run context

pub mod algo;
pub mod context;
pub mod types;

pub use algo::{apply_writes, create_checkpoint, map_input, prepare_next_tasks, should_interrupt};
pub use context::RunContext;
pub use types::{derive_task_id, PathSegment, Task, TaskWrites};
