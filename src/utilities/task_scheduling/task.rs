//! Task definition for the task scheduling system.
//!
//! Tasks represent units of work that can be executed by worker threads. Their storage lives in
//! the `TaskArena`; callers only ever hold a `TaskHandle`.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::scheduler::SchedulerCore;

/// Work executed by a task. Takes as arguments the scheduler running it and the task's own handle.
///
/// Anything the closure captures is the task's payload. Dropped without running if the task is
/// freed before it is scheduled.
pub type TaskFunction = Box<dyn FnOnce(&SchedulerCore, TaskHandle) + Send + 'static>;

/// Stable reference to a task slot.
///
/// The generation distinguishes successive tasks that reuse the same slot; using a handle whose
/// task has already been freed panics.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    index: u32,
    generation: u32,
}

impl TaskHandle {
    /// Packed value stored in edge fields for "no task".
    pub(crate) const NONE_BITS: u64 = u64::MAX;

    #[inline(always)]
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Gets the arena slot index of this task.
    #[inline(always)]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline(always)]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    #[inline(always)]
    pub(crate) fn to_bits(self) -> u64 {
        (self.generation as u64) << 32 | self.index as u64
    }

    #[inline(always)]
    pub(crate) fn from_bits(bits: u64) -> Option<Self> {
        if bits == Self::NONE_BITS {
            None
        } else {
            Some(Self::new(bits as u32, (bits >> 32) as u32))
        }
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({}v{})", self.index, self.generation)
    }
}

/// Lifecycle of a task. Transitions only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum TaskState {
    /// Created and still configurable.
    Unscheduled = 0,
    /// Sitting in a priority queue.
    Scheduled = 1,
    /// Dequeued by a worker; stays here after its callback until outstanding finishers complete.
    Running = 2,
    /// Completion processing has run.
    Done = 3,
}

impl TaskState {
    #[inline(always)]
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TaskState::Unscheduled,
            1 => TaskState::Scheduled,
            2 => TaskState::Running,
            3 => TaskState::Done,
            _ => unreachable!("invalid task state {value}"),
        }
    }
}

/// Storage for one task. All fields are touched through atomics; the callback sits behind a
/// mutex only so the slot can be shared, since exactly one worker ever takes it.
pub(crate) struct TaskSlot {
    /// Bumped each time the slot is freed.
    generation: AtomicU32,
    state: AtomicU8,
    ref_count: AtomicU32,
    /// Number of incomplete predecessors that hold a start edge to this task.
    start_count: AtomicU32,
    /// One token for the task's own execution plus one per incomplete finisher.
    finish_count: AtomicU32,
    priority: AtomicU8,
    /// Worker index plus one; zero means no affinity.
    affinity: AtomicUsize,
    to_start: AtomicU64,
    to_finish: AtomicU64,
    callback: Mutex<Option<TaskFunction>>,
}

impl Default for TaskSlot {
    fn default() -> Self {
        Self {
            generation: AtomicU32::new(0),
            state: AtomicU8::new(TaskState::Done as u8),
            ref_count: AtomicU32::new(0),
            start_count: AtomicU32::new(0),
            finish_count: AtomicU32::new(0),
            priority: AtomicU8::new(0),
            affinity: AtomicUsize::new(0),
            to_start: AtomicU64::new(TaskHandle::NONE_BITS),
            to_finish: AtomicU64::new(TaskHandle::NONE_BITS),
            callback: Mutex::new(None),
        }
    }
}

impl TaskSlot {
    /// Prepares a free slot for a new task holding the creator's single reference.
    pub(crate) fn reset(&self, callback: TaskFunction) {
        debug_assert_eq!(self.ref_count.load(Ordering::Relaxed), 0);
        *self.callback.lock() = Some(callback);
        self.start_count.store(0, Ordering::Relaxed);
        self.finish_count.store(1, Ordering::Relaxed);
        self.priority.store(0, Ordering::Relaxed);
        self.affinity.store(0, Ordering::Relaxed);
        self.to_start.store(TaskHandle::NONE_BITS, Ordering::Relaxed);
        self.to_finish.store(TaskHandle::NONE_BITS, Ordering::Relaxed);
        self.state.store(TaskState::Unscheduled as u8, Ordering::Relaxed);
        self.ref_count.store(1, Ordering::Release);
    }

    /// Drops everything the task still owns and invalidates outstanding handles.
    /// Returns the callback so it can be dropped outside any arena lock.
    pub(crate) fn retire(&self) -> Option<TaskFunction> {
        let callback = self.callback.lock().take();
        self.to_start.store(TaskHandle::NONE_BITS, Ordering::Relaxed);
        self.to_finish.store(TaskHandle::NONE_BITS, Ordering::Relaxed);
        self.generation.fetch_add(1, Ordering::AcqRel);
        callback
    }

    #[inline(always)]
    pub(crate) fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    #[inline(always)]
    pub(crate) fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Atomically moves from `from` to `to`. Returns false if the task was not in `from`.
    #[inline(always)]
    pub(crate) fn transition(&self, from: TaskState, to: TaskState) -> bool {
        debug_assert!(from < to, "Task states never move backward.");
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Increments the reference count, returning the previous value.
    #[inline(always)]
    pub(crate) fn acquire(&self) -> u32 {
        self.ref_count.fetch_add(1, Ordering::AcqRel)
    }

    /// Decrements the reference count, returning the previous value.
    #[inline(always)]
    pub(crate) fn release(&self) -> u32 {
        self.ref_count.fetch_sub(1, Ordering::AcqRel)
    }

    #[inline(always)]
    pub(crate) fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }

    #[inline(always)]
    pub(crate) fn start_count(&self) -> u32 {
        self.start_count.load(Ordering::Acquire)
    }

    #[inline(always)]
    pub(crate) fn add_start_dependency(&self) {
        self.start_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns true if this was the last outstanding predecessor.
    #[inline(always)]
    pub(crate) fn complete_start_dependency(&self) -> bool {
        let previous = self.start_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "Start count underflow.");
        previous == 1
    }

    /// Adds a finish token. Fails once the count has reached zero: completion processing for
    /// this task has already begun and can no longer wait on another finisher.
    #[inline(always)]
    pub(crate) fn add_finish_dependency(&self) -> bool {
        self.finish_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count > 0).then(|| count + 1)
            })
            .is_ok()
    }

    /// Releases one finish token. Returns true if the task is now ready for completion processing.
    #[inline(always)]
    pub(crate) fn release_finish_token(&self) -> bool {
        let previous = self.finish_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "Finish count underflow.");
        previous == 1
    }

    #[inline(always)]
    pub(crate) fn priority(&self) -> usize {
        self.priority.load(Ordering::Acquire) as usize
    }

    #[inline(always)]
    pub(crate) fn set_priority(&self, priority: usize) {
        self.priority.store(priority as u8, Ordering::Release);
    }

    /// Gets the worker this task is pinned to, if any.
    #[inline(always)]
    pub(crate) fn affinity(&self) -> Option<usize> {
        self.affinity.load(Ordering::Acquire).checked_sub(1)
    }

    #[inline(always)]
    pub(crate) fn set_affinity(&self, worker_index: Option<usize>) {
        self.affinity
            .store(worker_index.map_or(0, |index| index + 1), Ordering::Release);
    }

    #[inline(always)]
    pub(crate) fn to_start(&self) -> Option<TaskHandle> {
        TaskHandle::from_bits(self.to_start.load(Ordering::Acquire))
    }

    #[inline(always)]
    pub(crate) fn set_to_start(&self, successor: TaskHandle) {
        self.to_start.store(successor.to_bits(), Ordering::Release);
    }

    #[inline(always)]
    pub(crate) fn to_finish(&self) -> Option<TaskHandle> {
        TaskHandle::from_bits(self.to_finish.load(Ordering::Acquire))
    }

    #[inline(always)]
    pub(crate) fn set_to_finish(&self, dependent: TaskHandle) {
        self.to_finish.store(dependent.to_bits(), Ordering::Release);
    }

    /// Takes the callback for execution. Only the worker that moved the task to `Running` calls this.
    #[inline(always)]
    pub(crate) fn take_callback(&self) -> Option<TaskFunction> {
        self.callback.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_bits() {
        let handle = TaskHandle::new(17, 3);
        assert_eq!(TaskHandle::from_bits(handle.to_bits()), Some(handle));
        assert_eq!(TaskHandle::from_bits(TaskHandle::NONE_BITS), None);
        assert_eq!(format!("{handle:?}"), "Task(17v3)");
    }

    #[test]
    fn test_reset_slot() {
        let slot = TaskSlot::default();
        slot.reset(Box::new(|_, _| {}));
        assert_eq!(slot.state(), TaskState::Unscheduled);
        assert_eq!(slot.ref_count(), 1);
        assert_eq!(slot.start_count(), 0);
        assert_eq!(slot.affinity(), None);
        assert_eq!(slot.to_start(), None);
        assert_eq!(slot.to_finish(), None);
        // The task's own execution is the only finish token.
        assert!(slot.release_finish_token());
    }

    #[test]
    fn test_finish_dependency_refused_once_count_is_zero() {
        let slot = TaskSlot::default();
        slot.reset(Box::new(|_, _| {}));
        assert!(slot.add_finish_dependency());
        assert!(!slot.release_finish_token());
        assert!(slot.release_finish_token());
        // Completing, though not yet Done.
        assert!(!slot.add_finish_dependency());
    }

    #[test]
    fn test_transitions_are_checked() {
        let slot = TaskSlot::default();
        slot.reset(Box::new(|_, _| {}));
        assert!(slot.transition(TaskState::Unscheduled, TaskState::Scheduled));
        assert!(!slot.transition(TaskState::Unscheduled, TaskState::Scheduled));
        assert!(slot.transition(TaskState::Scheduled, TaskState::Running));
        assert!(slot.transition(TaskState::Running, TaskState::Done));
        assert_eq!(slot.state(), TaskState::Done);
    }

    #[test]
    fn test_affinity_uses_offset_sentinel() {
        let slot = TaskSlot::default();
        slot.set_affinity(Some(0));
        assert_eq!(slot.affinity(), Some(0));
        assert_eq!(slot.affinity.load(Ordering::Relaxed), 1);
        slot.set_affinity(None);
        assert_eq!(slot.affinity(), None);
    }

    #[test]
    fn test_retire_bumps_generation_and_drops_payload() {
        let payload = std::sync::Arc::new(());
        let captured = payload.clone();
        let slot = TaskSlot::default();
        slot.reset(Box::new(move |_, _| drop(captured)));
        assert_eq!(std::sync::Arc::strong_count(&payload), 2);

        assert_eq!(slot.release(), 1);
        drop(slot.retire());
        assert_eq!(slot.generation(), 1);
        assert_eq!(std::sync::Arc::strong_count(&payload), 1);
    }
}
