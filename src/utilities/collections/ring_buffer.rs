/// Fixed-capacity circular FIFO built over a boxed slice of slots.
///
/// One slot is always left unused so that a full buffer can be told apart from an empty one
/// using only the read and write indices. A buffer constructed with capacity `N` therefore
/// holds at most `N - 1` items.
///
/// There is no internal synchronization. Owners that share a buffer across threads must
/// serialize access themselves.
pub struct RingBuffer<T> {
    /// Index of the next slot to read from.
    read_index: usize,
    /// Index of the next slot to write into.
    write_index: usize,
    /// Backing slots. Unoccupied slots are always `None`.
    slots: Box<[Option<T>]>,
}

impl<T> RingBuffer<T> {
    /// Creates an empty buffer with the given number of slots.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(
            capacity >= 2,
            "Ring buffers sacrifice one slot; a capacity below 2 can never hold anything."
        );
        let slots = (0..capacity).map(|_| None).collect::<Vec<_>>().into_boxed_slice();
        Self {
            read_index: 0,
            write_index: 0,
            slots,
        }
    }

    /// Gets the number of backing slots.
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Gets the number of items currently stored.
    #[inline(always)]
    pub fn len(&self) -> usize {
        (self.write_index + self.capacity() - self.read_index) % self.capacity()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.read_index == self.write_index
    }

    /// Gets whether the next `put` would wrap onto the read index.
    #[inline(always)]
    pub fn is_full(&self) -> bool {
        (self.write_index + 1) % self.capacity() == self.read_index
    }

    /// Appends an item at the write index.
    ///
    /// Returns the item back if the buffer is full. Existing entries are never overwritten.
    #[inline(always)]
    pub fn put(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        debug_assert!(self.slots[self.write_index].is_none());
        self.slots[self.write_index] = Some(item);
        self.write_index = (self.write_index + 1) % self.capacity();
        Ok(())
    }

    /// Removes the item at the read index, leaving its slot cleared.
    #[inline(always)]
    pub fn get(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let item = self.slots[self.read_index].take();
        debug_assert!(item.is_some(), "Occupied ring slot was unexpectedly empty.");
        self.read_index = (self.read_index + 1) % self.capacity();
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_buffer() {
        let mut buffer = RingBuffer::<u32>::new(4);
        assert!(buffer.is_empty());
        assert!(!buffer.is_full());
        assert_eq!(buffer.get(), None);
    }

    #[test]
    fn test_capacity_sacrifices_one_slot() {
        let mut buffer = RingBuffer::new(4);
        assert_eq!(buffer.put(1), Ok(()));
        assert_eq!(buffer.put(2), Ok(()));
        assert_eq!(buffer.put(3), Ok(()));
        assert!(buffer.is_full());
        assert_eq!(buffer.put(4), Err(4));
        assert_eq!(buffer.len(), 3);

        assert_eq!(buffer.get(), Some(1));
        assert_eq!(buffer.get(), Some(2));
        assert_eq!(buffer.get(), Some(3));
        assert_eq!(buffer.get(), None);
    }

    #[test]
    fn test_wraps_around() {
        let mut buffer = RingBuffer::new(3);
        for round in 0..10 {
            assert_eq!(buffer.put(round), Ok(()));
            assert_eq!(buffer.put(round + 100), Ok(()));
            assert_eq!(buffer.get(), Some(round));
            assert_eq!(buffer.get(), Some(round + 100));
            assert!(buffer.is_empty());
        }
    }

    #[test]
    fn test_get_clears_slot() {
        let item = std::sync::Arc::new(());
        let mut buffer = RingBuffer::new(2);
        assert!(buffer.put(item.clone()).is_ok());
        assert_eq!(std::sync::Arc::strong_count(&item), 2);
        drop(buffer.get());
        assert_eq!(std::sync::Arc::strong_count(&item), 1);
    }

    proptest! {
        #[test]
        fn fifo_round_trip_up_to_capacity(
            capacity in 2usize..64,
            offset in 0usize..64,
        ) {
            let mut buffer = RingBuffer::new(capacity);
            // Move the indices away from zero first.
            for i in 0..offset % capacity {
                prop_assert!(buffer.put(i).is_ok());
                prop_assert_eq!(buffer.get(), Some(i));
            }

            for i in 0..capacity - 1 {
                prop_assert!(buffer.put(i).is_ok());
            }
            prop_assert!(buffer.is_full());
            prop_assert_eq!(buffer.put(usize::MAX), Err(usize::MAX));

            for i in 0..capacity - 1 {
                prop_assert_eq!(buffer.get(), Some(i));
            }
            prop_assert!(buffer.is_empty());
            prop_assert_eq!(buffer.get(), None);
        }
    }
}
