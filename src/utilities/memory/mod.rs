//! Index management for arena-backed storage.

pub mod id_pool;

pub use id_pool::IdPool;
