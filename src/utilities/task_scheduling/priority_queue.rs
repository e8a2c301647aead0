//! Mutex-protected set of per-priority ring buffers.

use parking_lot::Mutex;

use crate::utilities::collections::ring_buffer::RingBuffer;

/// FIFO-within-priority queue that always serves the highest pending priority first.
///
/// All levels share one mutex. `enqueue` blocks on it briefly; `dequeue` only ever tries it, so a
/// polling worker never waits behind another thread's queue operation.
pub struct PriorityQueue<T> {
    levels: Mutex<Box<[RingBuffer<T>]>>,
}

impl<T> PriorityQueue<T> {
    /// Creates a queue with `max_priority` levels of `capacity` slots each.
    pub fn new(max_priority: usize, capacity: usize) -> Self {
        debug_assert!(max_priority > 0, "A queue needs at least one priority level.");
        let levels = (0..max_priority)
            .map(|_| RingBuffer::new(capacity))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            levels: Mutex::new(levels),
        }
    }

    /// Appends an item to the ring for `priority`.
    ///
    /// Returns the item back if that priority's ring is full. The caller decides whether to retry.
    pub fn enqueue(&self, item: T, priority: usize) -> Result<(), T> {
        let mut levels = self.levels.lock();
        debug_assert!(priority < levels.len(), "Priority {priority} is out of range.");
        levels[priority].put(item)
    }

    /// Takes the oldest item of the highest non-empty priority.
    ///
    /// Returns `None` both when the queue is empty and when another thread currently holds the lock.
    pub fn dequeue(&self) -> Option<T> {
        let mut levels = self.levels.try_lock()?;
        levels.iter_mut().rev().find_map(|level| level.get())
    }

    /// Gets the approximate number of queued items.
    /// Not guaranteed to measure the true number once the lock is released.
    pub fn approximate_len(&self) -> usize {
        self.levels.lock().iter().map(|level| level.len()).sum()
    }
}
