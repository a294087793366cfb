//! Counter telemetry sources
//!
//! In-memory implementation of the counter store contract, the sliding
//! rate window it derives rates with, and a device simulator.

pub mod memory;
pub mod rate;
pub mod simulator;

pub use memory::InMemoryCounterStore;
pub use rate::RateWindow;
pub use simulator::{CounterSimulator, SimulatedDevice, SimulatorSettings, TickOutcome};
