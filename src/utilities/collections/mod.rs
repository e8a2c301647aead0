//! Collections used by the scheduler's queues.

pub mod ring_buffer;

pub use ring_buffer::RingBuffer;
