//! Infrastructure layer - external concerns

pub mod counters;
pub mod storage;

pub use counters::{CounterSimulator, InMemoryCounterStore, SimulatorSettings};
pub use storage::{InMemoryLineDirectory, InMemoryStoppageStore, InMemoryWorkOrders};
