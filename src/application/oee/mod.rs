//! OEE calculation
//!
//! Pure calculators for each factor plus the engine that feeds them
//! from the counter store.

pub mod availability;
pub mod engine;
pub mod performance;
pub mod quality;
pub mod sufficiency;
pub mod trends;

pub use availability::{merge_intervals, AvailabilityCalculator};
pub use engine::OeeEngine;
pub use performance::PerformanceCalculator;
pub use quality::QualityCalculator;
pub use trends::TrendWindows;
