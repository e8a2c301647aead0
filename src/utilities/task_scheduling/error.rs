//! Recoverable failures of the task system.
//!
//! Misuse of the task API (self edges, editing a task after it was scheduled, stale handles)
//! is not reported here; those paths panic.

/// A `SchedulerConfig` field that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_priority must be at least 1")]
    NoPriorityLevels,
    /// Priorities are stored in a byte.
    #[error("max_priority {max_priority} exceeds 256 levels")]
    TooManyPriorityLevels {
        /// Requested number of levels.
        max_priority: usize,
    },
    #[error("queue_capacity {queue_capacity} cannot hold any task; at least 2 slots are required")]
    QueueTooSmall {
        /// Requested slots per ring buffer.
        queue_capacity: usize,
    },
    #[error("max_tasks {max_tasks} must be between 1 and u32::MAX")]
    InvalidTaskLimit {
        /// Requested arena size.
        max_tasks: usize,
    },
}

/// Errors returned by `Scheduler::startup` and task creation.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid scheduler configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("failed to spawn worker thread {worker_index}")]
    ThreadSpawn {
        /// Index of the worker whose thread could not be started.
        worker_index: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("all {capacity} task slots are in use")]
    ArenaExhausted {
        /// Configured `max_tasks`.
        capacity: usize,
    },
}
