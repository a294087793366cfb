//! Domain layer
//!
//! Entities, value objects and the port traits of the monitoring core.
//! Nothing here knows about tokio tasks, storage or the event bus.

pub mod counter;
pub mod equipment_line;
pub mod events;
pub mod oee;
pub mod ports;
pub mod stoppage;
pub mod work_order;

// Re-export commonly used types
pub use counter::{AggregatedCounterData, CounterReading, DowntimePeriod, ReadingQuality};
pub use equipment_line::EquipmentLine;
pub use events::{MonitoringEvent, StoppageDetectedEvent, StoppageEndedEvent};
pub use oee::{Availability, OeeCalculation, OeeCalculationConfig, Performance, Quality};
pub use stoppage::{EquipmentStoppage, LineCheckOutcome, MonitoringSummary};
pub use work_order::WorkOrder;

pub use crate::shared::errors::{DomainError, DomainResult};
