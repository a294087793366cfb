//! Work order window

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The slice of a work order the OEE engine needs: where and when it ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: String,
    pub line_id: String,
    pub device_id: String,
    pub started_at: DateTime<Utc>,
    /// `None` while the order is still running
    pub completed_at: Option<DateTime<Utc>>,
    /// Overrides the configured target rate for this order
    pub target_rate_per_minute: Option<f64>,
}

impl WorkOrder {
    pub fn is_running(&self) -> bool {
        self.completed_at.is_none()
    }
}
