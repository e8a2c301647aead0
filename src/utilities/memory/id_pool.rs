/// Manages a pool of identifier values. Grabbing an id from the pool picks a number that has been
/// picked and returned before, or if none of those are available, the minimum value greater
/// than any existing id.
///
/// Unlike an unbounded pool, ids are limited to `0..capacity`; `take` fails once every id in
/// that range is claimed.
pub struct IdPool {
    next_index: u32,
    capacity: u32,
    available_ids: Vec<u32>,
}

impl IdPool {
    /// Creates a new IdPool that hands out ids below `capacity`.
    pub fn new(capacity: u32) -> Self {
        IdPool {
            next_index: 0,
            capacity,
            available_ids: Vec::new(),
        }
    }

    /// Gets the number of ids currently claimed.
    #[inline(always)]
    pub fn claimed_count(&self) -> usize {
        self.next_index as usize - self.available_ids.len()
    }

    /// Takes an id from the pool, preferring previously returned ids.
    #[inline(always)]
    pub fn take(&mut self) -> Option<u32> {
        if let Some(id) = self.available_ids.pop() {
            return Some(id);
        }
        if self.next_index < self.capacity {
            let id = self.next_index;
            self.next_index += 1;
            Some(id)
        } else {
            None
        }
    }

    /// Returns an id to the pool.
    #[inline(always)]
    pub fn return_id(&mut self, id: u32) {
        debug_assert!(
            id < self.next_index,
            "Returned id was never handed out by this pool."
        );
        debug_assert!(
            !self.available_ids.contains(&id),
            "Id was returned twice."
        );
        self.available_ids.push(id);
    }
}
