//! Equipment line entity

use serde::{Deserialize, Serialize};

/// A production line watched by the stoppage detector.
///
/// Each line is fed by one counter device; `production_channel` is the
/// channel that counts processed pieces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentLine {
    pub id: String,
    pub name: String,
    pub device_id: String,
    pub production_channel: u8,
    /// Work order currently running on the line
    pub current_work_order_id: Option<String>,
    pub monitoring_enabled: bool,
}

impl EquipmentLine {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        device_id: impl Into<String>,
        production_channel: u8,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            device_id: device_id.into(),
            production_channel,
            current_work_order_id: None,
            monitoring_enabled: true,
        }
    }

    pub fn with_work_order(mut self, work_order_id: impl Into<String>) -> Self {
        self.current_work_order_id = Some(work_order_id.into());
        self
    }
}
