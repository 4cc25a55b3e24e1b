//! Reserved channel names and configuration keys

/// Entry channel written with a run's initial input
pub const START: &str = "__start__";

/// Terminal channel marking a run's observable end
pub const END: &str = "__end__";

/// Pseudo-channel tracking the interrupt horizon in `versions_seen`
pub const INTERRUPT: &str = "__interrupt__";

/// Pending-write channel marking a task as dispatched
pub const SCHEDULED: &str = "__scheduled__";

/// Configurable key set on executor-bound messages to enable task dedupe
pub const CONFIG_KEY_DEDUPE_TASKS: &str = "dedupe_tasks";
