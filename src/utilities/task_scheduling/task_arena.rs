//! Chunked storage for task slots addressed by generation-checked handles.
//!
//! Chunks are allocated on first use and never move or shrink, so a `&TaskSlot` obtained from a
//! valid handle stays valid for the arena's lifetime. Freed slot indices are recycled through an
//! `IdPool`.

use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::utilities::memory::id_pool::IdPool;

use super::error::SchedulerError;
use super::task::{TaskFunction, TaskHandle, TaskSlot};

const CHUNK_SIZE: usize = 256;

pub(crate) struct TaskArena {
    chunks: Box<[OnceLock<Box<[TaskSlot]>>]>,
    ids: Mutex<IdPool>,
    capacity: usize,
}

impl TaskArena {
    pub(crate) fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0 && capacity <= u32::MAX as usize);
        let chunk_count = capacity.div_ceil(CHUNK_SIZE);
        let chunks = (0..chunk_count)
            .map(|_| OnceLock::new())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            chunks,
            ids: Mutex::new(IdPool::new(capacity as u32)),
            capacity,
        }
    }

    /// Claims a slot for a new task with a reference count of one.
    pub(crate) fn allocate(&self, callback: TaskFunction) -> Result<TaskHandle, SchedulerError> {
        let index = self
            .ids
            .lock()
            .take()
            .ok_or(SchedulerError::ArenaExhausted {
                capacity: self.capacity,
            })?;
        let chunk = self.chunks[index as usize / CHUNK_SIZE].get_or_init(|| {
            (0..CHUNK_SIZE)
                .map(|_| TaskSlot::default())
                .collect::<Vec<_>>()
                .into_boxed_slice()
        });
        let slot = &chunk[index as usize % CHUNK_SIZE];
        slot.reset(callback);
        Ok(TaskHandle::new(index, slot.generation()))
    }

    /// Resolves a handle to its slot.
    ///
    /// Panics if the handle refers to a task that has already been freed.
    #[inline(always)]
    pub(crate) fn get(&self, handle: TaskHandle) -> &TaskSlot {
        let slot = self
            .chunks
            .get(handle.index() as usize / CHUNK_SIZE)
            .and_then(|chunk| chunk.get())
            .map(|chunk| &chunk[handle.index() as usize % CHUNK_SIZE]);
        match slot {
            Some(slot) if slot.generation() == handle.generation() => slot,
            _ => panic!("stale task handle {handle:?}: the task has already been freed"),
        }
    }

    /// Returns the slot of a task whose reference count reached zero.
    pub(crate) fn free(&self, handle: TaskHandle) {
        let callback = self.get(handle).retire();
        self.ids.lock().return_id(handle.index());
        // The payload may be arbitrarily expensive to drop; keep it outside the lock.
        drop(callback);
    }

    /// Gets the number of tasks currently holding a slot.
    pub(crate) fn live_count(&self) -> usize {
        self.ids.lock().claimed_count()
    }
}
