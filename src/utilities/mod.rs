pub mod collections;
pub mod memory;
pub mod task_scheduling;
