//! Counter telemetry
//!
//! Readings, downtime windows and aggregates produced by the counter
//! store, plus the read contract the core consumes.

pub mod client;
pub mod model;

pub use client::{CounterDataClient, CounterResult};
pub use model::{
    counter_delta, AggregatedCounterData, CounterReading, DowntimePeriod, ReadingQuality,
    COUNTER_MODULUS, OVERFLOW_THRESHOLD,
};
