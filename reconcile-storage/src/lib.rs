//! Reconcile Storage - Contact Store Trait and In-Memory Implementation
//!
//! Defines the storage abstraction the resolution engine runs against.
//! The PostgreSQL implementation lives in reconcile-api next to the pool.

pub mod memory;
pub mod store;

pub use memory::InMemoryContactStore;
pub use store::ContactStore;
