//! Work order lookup interface

use async_trait::async_trait;

use super::model::WorkOrder;
use crate::domain::DomainResult;

#[async_trait]
pub trait WorkOrderSource: Send + Sync {
    async fn find_by_id(&self, work_order_id: &str) -> DomainResult<Option<WorkOrder>>;
}
