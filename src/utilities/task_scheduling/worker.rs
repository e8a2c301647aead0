use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::thread::ThreadId;

use super::priority_queue::PriorityQueue;
use super::task::TaskHandle;

/// Per-thread bookkeeping for one worker of a `Scheduler`.
///
/// Records are created once at startup and live until the scheduler is dropped. Worker 0 is bound
/// to the thread that called `startup`; every other record is bound by its spawned thread as the
/// first thing that thread does.
pub struct WorkerThread {
    worker_index: usize,
    thread_id: OnceLock<ThreadId>,
    /// Tasks pinned to this worker. Never stolen.
    affinity_queue: PriorityQueue<TaskHandle>,
    /// Tasks scheduled from this worker without affinity. Other workers steal from here.
    general_queue: PriorityQueue<TaskHandle>,
    /// Consecutive dequeue cycles that found nothing.
    misses: AtomicU32,
    /// Last worker this one tried to steal from.
    next_victim: AtomicUsize,
    interrupt: AtomicBool,
}

impl WorkerThread {
    /// Creates a worker record with empty queues.
    pub(crate) fn new(worker_index: usize, max_priority: usize, queue_capacity: usize) -> Self {
        Self {
            worker_index,
            thread_id: OnceLock::new(),
            affinity_queue: PriorityQueue::new(max_priority, queue_capacity),
            general_queue: PriorityQueue::new(max_priority, queue_capacity),
            misses: AtomicU32::new(0),
            next_victim: AtomicUsize::new(worker_index),
            interrupt: AtomicBool::new(false),
        }
    }

    #[inline(always)]
    pub fn worker_index(&self) -> usize {
        self.worker_index
    }

    /// Binds this record to the calling thread. A record is bound exactly once.
    pub(crate) fn bind_current_thread(&self) {
        let current = std::thread::current().id();
        let bound = *self.thread_id.get_or_init(|| current);
        assert_eq!(
            bound, current,
            "Worker {} is already bound to another thread.",
            self.worker_index
        );
    }

    #[inline(always)]
    pub(crate) fn is_bound_to(&self, thread_id: ThreadId) -> bool {
        self.thread_id.get() == Some(&thread_id)
    }

    #[inline(always)]
    pub(crate) fn affinity_queue(&self) -> &PriorityQueue<TaskHandle> {
        &self.affinity_queue
    }

    #[inline(always)]
    pub(crate) fn general_queue(&self) -> &PriorityQueue<TaskHandle> {
        &self.general_queue
    }

    /// Advances the steal rotation past this worker and returns the next victim.
    ///
    /// Only one victim is tried per dequeue cycle; the rotation moves on by one each time.
    #[inline(always)]
    pub(crate) fn advance_victim(&self, worker_count: usize) -> Option<usize> {
        if worker_count < 2 {
            return None;
        }
        let mut victim = (self.next_victim.load(Ordering::Relaxed) + 1) % worker_count;
        if victim == self.worker_index {
            victim = (victim + 1) % worker_count;
        }
        self.next_victim.store(victim, Ordering::Relaxed);
        Some(victim)
    }

    /// Records an empty cycle and returns the new consecutive miss count.
    #[inline(always)]
    pub(crate) fn record_miss(&self) -> u32 {
        self.misses.fetch_add(1, Ordering::Relaxed).saturating_add(1)
    }

    #[inline(always)]
    pub(crate) fn reset_misses(&self) {
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Gets the number of consecutive empty dequeue cycles.
    #[inline(always)]
    pub fn misses(&self) -> u32 {
        self.misses.load(Ordering::Relaxed)
    }

    #[inline(always)]
    pub(crate) fn interrupt(&self) {
        self.interrupt.store(true, Ordering::Release);
    }

    #[inline(always)]
    pub(crate) fn is_interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Acquire)
    }

    /// Clears the interrupt flag, returning whether it was set.
    #[inline(always)]
    pub(crate) fn take_interrupt(&self) -> bool {
        self.interrupt.swap(false, Ordering::AcqRel)
    }
}
