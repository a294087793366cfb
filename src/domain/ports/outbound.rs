//! Outbound ports: collaborators the core consumes
//!
//! Store and directory contracts live with their aggregates and are
//! re-exported here; the notification sink is defined here.

use async_trait::async_trait;

use crate::domain::events::MonitoringEvent;
use crate::shared::failure::FailureClassification;

pub use crate::domain::counter::CounterDataClient;
pub use crate::domain::equipment_line::EquipmentLineDirectory;
pub use crate::domain::stoppage::StoppageStore;
pub use crate::domain::work_order::WorkOrderSource;

/// Receives monitoring events. Called under the network retry policy.
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    async fn publish(&self, event: MonitoringEvent) -> Result<(), FailureClassification>;
}
