//! Construction parameters for a `Scheduler`.

use std::time::Duration;

use super::error::ConfigError;

/// Controls how long an idle worker sleeps after repeatedly finding no work.
///
/// After `miss_threshold` consecutive empty dequeue cycles, a worker that is allowed to wait
/// sleeps for `sleep_unit * min(misses, max_misses)^2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Number of consecutive misses tolerated before sleeping at all.
    pub miss_threshold: u32,
    /// Cap applied to the miss count before squaring.
    pub max_misses: u32,
    /// Base sleep duration.
    pub sleep_unit: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            miss_threshold: 4,
            max_misses: 20,
            sleep_unit: Duration::from_micros(50),
        }
    }
}

impl BackoffConfig {
    /// Backoff that never sleeps. Idle workers spin, yielding only through the dequeue loop.
    pub fn disabled() -> Self {
        Self {
            miss_threshold: u32::MAX,
            max_misses: 0,
            sleep_unit: Duration::ZERO,
        }
    }

    /// Gets the sleep for the given consecutive miss count, or `None` if the worker should not sleep.
    #[inline(always)]
    pub fn sleep_for(&self, misses: u32) -> Option<Duration> {
        if misses <= self.miss_threshold || self.sleep_unit.is_zero() {
            return None;
        }
        let capped = misses.min(self.max_misses);
        if capped == 0 {
            return None;
        }
        Some(self.sleep_unit.saturating_mul(capped.saturating_mul(capped)))
    }
}

/// Parameters validated once by `Scheduler::startup`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Number of workers, including the main thread as worker 0. Zero selects the logical core count.
    pub worker_count: usize,
    /// Number of priority levels; valid priorities are `0..max_priority`, higher runs first.
    pub max_priority: usize,
    /// Slots in each per-priority ring buffer. One slot is always left unused.
    pub queue_capacity: usize,
    /// Maximum number of live tasks.
    pub max_tasks: usize,
    /// Idle backoff curve.
    pub backoff: BackoffConfig,
    /// Name prefix for spawned worker threads; the worker index is appended.
    pub thread_name_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: 0,
            max_priority: 4,
            queue_capacity: 1024,
            max_tasks: 65536,
            backoff: BackoffConfig::default(),
            thread_name_prefix: "task-worker".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_max_priority(mut self, max_priority: usize) -> Self {
        self.max_priority = max_priority;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = max_tasks;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Gets the worker count with the zero default resolved against the machine.
    pub fn resolved_worker_count(&self) -> usize {
        if self.worker_count >= 1 {
            self.worker_count
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    /// Checks that every field is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_priority == 0 {
            return Err(ConfigError::NoPriorityLevels);
        }
        if self.max_priority > u8::MAX as usize + 1 {
            return Err(ConfigError::TooManyPriorityLevels {
                max_priority: self.max_priority,
            });
        }
        if self.queue_capacity < 2 {
            return Err(ConfigError::QueueTooSmall {
                queue_capacity: self.queue_capacity,
            });
        }
        if self.max_tasks == 0 || self.max_tasks > u32::MAX as usize {
            return Err(ConfigError::InvalidTaskLimit {
                max_tasks: self.max_tasks,
            });
        }
        Ok(())
    }
}
