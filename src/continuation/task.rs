//! `PluginTask` (spec §3): the state record for one background refinement.

use std::time::Instant;

/// Lifecycle state of a continuation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Partial,
    Complete,
    Failed,
    Cancelled,
}

/// One plugin's background-refinement bookkeeping. Transient, not
/// persisted across restarts; only the cached payload it eventually
/// promotes survives.
#[derive(Debug, Clone)]
pub struct PluginTask {
    pub task_id: String,
    pub plugin_name: String,
    pub query: String,
    pub cache_key: String,
    pub state: TaskState,
    pub started_at: Instant,
    pub deadline_hard: Instant,
}

impl PluginTask {
    pub fn new(task_id: String, plugin_name: String, query: String, cache_key: String, hard_timeout: std::time::Duration) -> Self {
        let now = Instant::now();
        PluginTask {
            task_id,
            plugin_name,
            query,
            cache_key,
            state: TaskState::Pending,
            started_at: now,
            deadline_hard: now + hard_timeout,
        }
    }
}
