//! Stoppage store interface

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::model::EquipmentStoppage;
use crate::domain::DomainResult;

#[async_trait]
pub trait StoppageStore: Send + Sync {
    /// The open stoppage of a line, if any.
    async fn get_active_by_line(&self, line_id: &str) -> DomainResult<Option<EquipmentStoppage>>;
    async fn create(&self, stoppage: EquipmentStoppage) -> DomainResult<()>;
    async fn update(&self, stoppage: EquipmentStoppage) -> DomainResult<()>;
    /// Stoppages of a line overlapping `[start, end)`, oldest first.
    async fn find_by_line(
        &self,
        line_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Vec<EquipmentStoppage>>;
}
