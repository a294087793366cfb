//! Tunable OEE calculation thresholds

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::shared::errors::{DomainError, DomainResult};

/// Calculation configuration, adjustable at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct OeeCalculationConfig {
    /// Channel counting every processed piece
    #[validate(range(max = 15, message = "production_channel must be 0–15"))]
    pub production_channel: u8,
    /// Channel counting rejected pieces
    #[validate(range(max = 15, message = "reject_channel must be 0–15"))]
    pub reject_channel: u8,
    #[validate(range(min = 0.0, message = "target_rate_per_minute must not be negative"))]
    pub target_rate_per_minute: f64,
    #[validate(range(min = 1, message = "minimum_data_points must be ≥ 1"))]
    pub minimum_data_points: usize,
    /// Shortest production gap that counts as downtime
    #[validate(range(min = 1, max = 1440, message = "stoppage_threshold_minutes must be 1–1440"))]
    pub stoppage_threshold_minutes: u32,
    #[validate(range(min = 0.0, max = 100.0, message = "quality_alert_threshold must be 0–100"))]
    pub quality_alert_threshold: f64,
    #[validate(range(
        min = 0.0,
        max = 100.0,
        message = "performance_alert_threshold must be 0–100"
    ))]
    pub performance_alert_threshold: f64,
    #[validate(range(
        min = 0.0,
        max = 100.0,
        message = "availability_alert_threshold must be 0–100"
    ))]
    pub availability_alert_threshold: f64,
    /// Length of the window used by "current OEE"
    #[validate(range(min = 1, message = "current_window_minutes must be ≥ 1"))]
    pub current_window_minutes: u32,
}

impl Default for OeeCalculationConfig {
    fn default() -> Self {
        Self {
            production_channel: 0,
            reject_channel: 1,
            target_rate_per_minute: 30.0,
            minimum_data_points: 10,
            stoppage_threshold_minutes: 5,
            quality_alert_threshold: 95.0,
            performance_alert_threshold: 85.0,
            availability_alert_threshold: 90.0,
            current_window_minutes: 60,
        }
    }
}

impl OeeCalculationConfig {
    /// Field ranges plus cross-field consistency.
    pub fn check(&self) -> DomainResult<()> {
        self.validate()?;
        if self.production_channel == self.reject_channel {
            return Err(DomainError::Validation(format!(
                "production and reject channels must differ (both {})",
                self.production_channel
            )));
        }
        if !self.target_rate_per_minute.is_finite() {
            return Err(DomainError::Validation(
                "target_rate_per_minute must be finite".to_string(),
            ));
        }
        Ok(())
    }
}
