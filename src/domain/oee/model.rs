//! OEE value objects

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::OeeCalculationConfig;

/// Share of planned time the equipment actually ran
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Availability {
    /// In `[0, 100]`
    pub percentage: f64,
    pub actual_runtime_minutes: f64,
    pub planned_runtime_minutes: f64,
    pub downtime_minutes: f64,
}

/// Actual output against the target rate over the actual runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    /// Not capped: values above 100 mean the target rate is set too low
    pub percentage: f64,
    pub actual_output: u64,
    pub theoretical_output: f64,
    pub target_rate_per_minute: f64,
    pub runtime_minutes: f64,
}

impl Performance {
    pub fn exceeds_target(&self) -> bool {
        self.percentage > 100.0
    }
}

/// Good pieces among all pieces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quality {
    /// In `[0, 100]`; 100 when nothing was produced
    pub percentage: f64,
    pub good_count: u64,
    pub scrap_count: u64,
}

impl Quality {
    pub fn total_count(&self) -> u64 {
        self.good_count.saturating_add(self.scrap_count)
    }
}

/// Which OEE factor a breach or issue refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OeeMetric {
    Availability,
    Performance,
    Quality,
}

/// A factor that fell below its configured alert threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricBreach {
    pub metric: OeeMetric,
    pub value: f64,
    pub threshold: f64,
}

/// Outcome of the data-sufficiency check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValidationResult {
    pub is_sufficient: bool,
    /// Good-quality samples on the production channel
    pub data_points: usize,
    pub minimum_required: usize,
    /// Production-channel samples flagged Uncertain or Bad
    pub bad_quality_points: usize,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

/// OEE for one device and window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OeeCalculation {
    pub device_id: String,
    pub line_id: Option<String>,
    pub work_order_id: Option<String>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub availability: Availability,
    pub performance: Performance,
    pub quality: Quality,
    /// `A * P * Q / 10000`, in percent
    pub oee: f64,
    /// `false` when the window did not hold enough data
    pub is_reliable: bool,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub calculated_at: DateTime<Utc>,
}

impl OeeCalculation {
    pub fn oee_percentage(
        availability: &Availability,
        performance: &Performance,
        quality: &Quality,
    ) -> f64 {
        availability.percentage * performance.percentage * quality.percentage / 10_000.0
    }

    pub fn window_minutes(&self) -> f64 {
        (self.window_end - self.window_start).num_milliseconds() as f64 / 60_000.0
    }

    /// Factors below the alert thresholds in `config`.
    pub fn threshold_breaches(&self, config: &OeeCalculationConfig) -> Vec<MetricBreach> {
        [
            (
                OeeMetric::Availability,
                self.availability.percentage,
                config.availability_alert_threshold,
            ),
            (
                OeeMetric::Performance,
                self.performance.percentage,
                config.performance_alert_threshold,
            ),
            (
                OeeMetric::Quality,
                self.quality.percentage,
                config.quality_alert_threshold,
            ),
        ]
        .into_iter()
        .filter(|(_, value, threshold)| value < threshold)
        .map(|(metric, value, threshold)| MetricBreach {
            metric,
            value,
            threshold,
        })
        .collect()
    }
}
