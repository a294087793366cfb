//! Domain ports (hexagonal architecture boundaries)
//!
//! Ports define the interfaces between the domain core and the outside world.
//! These are trait contracts that external adapters implement.

pub mod inbound;
pub mod outbound;

pub use inbound::{OeeCalculationService, OeeTrendStream, StoppageDetectionService};
pub use outbound::NotificationPublisher;
