//! # OEE Monitor
//!
//! Overall Equipment Effectiveness and stoppage monitoring for production
//! lines fed by cumulative piece counters.
//!
//! ## Architecture
//!
//! - **shared**: errors, failure classification, retry with backoff, shutdown
//! - **domain**: counters, lines, stoppages, work orders, OEE values and ports
//! - **application**: OEE calculators and engine, stoppage detector and monitor, event bus
//! - **infrastructure**: in-memory stores and the counter simulator
//! - **config** / **server**: configuration and runtime bootstrap

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod server;
pub mod shared;

pub use config::{default_config_path, AppConfig};

pub use application::{create_event_bus, EventBus, OeeEngine, SharedEventBus, StoppageDetector};
pub use server::{init_tracing, MonitorHandle, MonitorOptions};
pub use shared::{DomainError, DomainResult, RetryExecutor, RetryPolicy};
