//! Equipment line directory interface

use async_trait::async_trait;

use super::model::EquipmentLine;
use crate::domain::DomainResult;

#[async_trait]
pub trait EquipmentLineDirectory: Send + Sync {
    /// Lines the detector must poll on every tick.
    async fn get_active_monitoring_lines(&self) -> DomainResult<Vec<EquipmentLine>>;
    async fn get_line(&self, line_id: &str) -> DomainResult<Option<EquipmentLine>>;
}
