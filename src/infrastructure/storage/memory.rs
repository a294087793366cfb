//! In-memory storage implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::domain::equipment_line::{EquipmentLine, EquipmentLineDirectory};
use crate::domain::stoppage::{EquipmentStoppage, StoppageStore};
use crate::domain::work_order::{WorkOrder, WorkOrderSource};
use crate::domain::{DomainError, DomainResult};

/// In-memory stoppage storage for development and testing.
///
/// Accepts any write it is given; keeping one open stoppage per line is
/// the detector's job.
#[derive(Default)]
pub struct InMemoryStoppageStore {
    stoppages: DashMap<Uuid, EquipmentStoppage>,
}

impl InMemoryStoppageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_count(&self, line_id: &str) -> usize {
        self.stoppages
            .iter()
            .filter(|s| s.line_id == line_id && s.is_open())
            .count()
    }

    pub fn all(&self) -> Vec<EquipmentStoppage> {
        let mut all: Vec<_> = self.stoppages.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|s| s.start_time);
        all
    }
}

#[async_trait]
impl StoppageStore for InMemoryStoppageStore {
    async fn get_active_by_line(&self, line_id: &str) -> DomainResult<Option<EquipmentStoppage>> {
        Ok(self
            .stoppages
            .iter()
            .filter(|s| s.line_id == line_id && s.is_open())
            .max_by_key(|s| s.start_time)
            .map(|s| s.value().clone()))
    }

    async fn create(&self, stoppage: EquipmentStoppage) -> DomainResult<()> {
        if self.stoppages.contains_key(&stoppage.id) {
            return Err(DomainError::Conflict(format!("stoppage {}", stoppage.id)));
        }
        self.stoppages.insert(stoppage.id, stoppage);
        Ok(())
    }

    async fn update(&self, stoppage: EquipmentStoppage) -> DomainResult<()> {
        match self.stoppages.get_mut(&stoppage.id) {
            Some(mut existing) => {
                *existing = stoppage;
                Ok(())
            }
            None => Err(DomainError::not_found(
                "EquipmentStoppage",
                "id",
                stoppage.id.to_string(),
            )),
        }
    }

    async fn find_by_line(
        &self,
        line_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Vec<EquipmentStoppage>> {
        let mut found: Vec<_> = self
            .stoppages
            .iter()
            .filter(|s| s.line_id == line_id && s.overlaps(start, end))
            .map(|s| s.value().clone())
            .collect();
        found.sort_by_key(|s| s.start_time);
        Ok(found)
    }
}

/// In-memory equipment line directory
#[derive(Default)]
pub struct InMemoryLineDirectory {
    lines: DashMap<String, EquipmentLine>,
}

impl InMemoryLineDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, line: EquipmentLine) {
        self.lines.insert(line.id.clone(), line);
    }
}

#[async_trait]
impl EquipmentLineDirectory for InMemoryLineDirectory {
    async fn get_active_monitoring_lines(&self) -> DomainResult<Vec<EquipmentLine>> {
        let mut lines: Vec<_> = self
            .lines
            .iter()
            .filter(|l| l.monitoring_enabled)
            .map(|l| l.value().clone())
            .collect();
        lines.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(lines)
    }

    async fn get_line(&self, line_id: &str) -> DomainResult<Option<EquipmentLine>> {
        Ok(self.lines.get(line_id).map(|l| l.clone()))
    }
}

/// In-memory work orders
#[derive(Default)]
pub struct InMemoryWorkOrders {
    work_orders: DashMap<String, WorkOrder>,
}

impl InMemoryWorkOrders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, work_order: WorkOrder) {
        self.work_orders.insert(work_order.id.clone(), work_order);
    }
}

#[async_trait]
impl WorkOrderSource for InMemoryWorkOrders {
    async fn find_by_id(&self, work_order_id: &str) -> DomainResult<Option<WorkOrder>> {
        Ok(self.work_orders.get(work_order_id).map(|w| w.clone()))
    }
}
