//! Task scheduling system for per-frame engine work.
//!
//! This module provides a work-stealing, dependency-aware scheduler built from lock-protected
//! priority queues and atomically counted task graphs. It includes:
//!
//! - `Scheduler`: Worker thread startup, the main-thread run loop, and shutdown
//! - `SchedulerCore`: Task creation, configuration, scheduling, and the dequeue loop
//! - `TaskHandle`: A reference-counted unit of work with start and finish edges
//! - `PriorityQueue`: FIFO-within-priority queue with a non-blocking dequeue
//! - `WorkerThread`: Per-thread affinity and general queues plus idle bookkeeping

mod config;
mod error;
mod priority_queue;
mod run_task_result;
mod scheduler;
mod task;
mod task_arena;
mod worker;

// Re-export public API
pub use config::{BackoffConfig, SchedulerConfig};
pub use error::{ConfigError, SchedulerError};
pub use priority_queue::PriorityQueue;
pub use run_task_result::RunTaskResult;
pub use scheduler::{Scheduler, SchedulerCore, SchedulerStats};
pub use task::{TaskFunction, TaskHandle, TaskState};
pub use worker::WorkerThread;
