//! Stoppage aggregate
//!
//! Contains the EquipmentStoppage entity, detection outcomes, and store interface.

pub mod detection;
pub mod model;
pub mod repository;

pub use detection::{LineCheckOutcome, MonitoringSummary, StoppageCreationDecision};
pub use model::{EquipmentStoppage, StoppageClassification, StoppageState, StoppageUrgency};
pub use repository::StoppageStore;
