//! Application layer
//!
//! Services that implement the inbound ports on top of the outbound ones.

pub mod events;
pub mod oee;
pub mod stoppage;

// Re-export key types for convenience
pub use events::{create_event_bus, EventBus, EventSubscriber, SharedEventBus};
pub use oee::OeeEngine;
pub use stoppage::{DetectorSettings, LineLocks, StoppageDetector, StoppageMonitor};
