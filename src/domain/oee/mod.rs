//! OEE aggregate
//!
//! Availability, performance and quality value objects, the combined
//! calculation and its tunable configuration.

pub mod config;
pub mod model;

pub use config::OeeCalculationConfig;
pub use model::{
    Availability, DataValidationResult, MetricBreach, OeeCalculation, OeeMetric, Performance,
    Quality,
};
