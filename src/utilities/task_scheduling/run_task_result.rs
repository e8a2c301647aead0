//! Result status of a single `run_any_task` attempt.

/// Describes the result status of one attempt to find and run work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunTaskResult {
    /// A task was dequeued and run.
    Ran = 0,
    /// No queue had work for the caller, but more may arrive in the future.
    Empty = 1,
    /// The calling thread is not one of the scheduler's workers; nothing was attempted.
    Unregistered = 2,
}

impl RunTaskResult {
    #[inline(always)]
    pub fn ran(self) -> bool {
        self == RunTaskResult::Ran
    }
}
