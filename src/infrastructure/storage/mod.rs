//! Storage implementations

mod memory;

pub use memory::{InMemoryLineDirectory, InMemoryStoppageStore, InMemoryWorkOrders};
