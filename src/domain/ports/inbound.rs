//! Inbound ports: services the monitoring core exposes
//!
//! Schedulers, the CLI and any future API adapter drive the core through
//! these traits only.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures_util::stream::BoxStream;

use crate::domain::counter::DowntimePeriod;
use crate::domain::oee::{
    Availability, DataValidationResult, OeeCalculation, OeeCalculationConfig, Performance, Quality,
};
use crate::domain::stoppage::{
    EquipmentStoppage, LineCheckOutcome, MonitoringSummary, StoppageCreationDecision,
    StoppageState,
};
use crate::domain::DomainResult;

/// Lazy, finite series of per-window calculations ordered by window start
pub type OeeTrendStream = BoxStream<'static, DomainResult<OeeCalculation>>;

// ── OeeCalculationService ──────────────────────────────────────

#[async_trait]
pub trait OeeCalculationService: Send + Sync {
    /// OEE over the trailing `current_window_minutes`.
    async fn calculate_current_oee(&self, device_id: &str) -> DomainResult<OeeCalculation>;

    async fn calculate_oee_for_period(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<OeeCalculation>;

    /// OEE over the work order's run, on its device, with its target rate.
    async fn calculate_oee_for_work_order(
        &self,
        work_order_id: &str,
    ) -> DomainResult<OeeCalculation>;

    async fn calculate_availability(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Availability>;

    async fn calculate_performance(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Performance>;

    async fn calculate_quality(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Quality>;

    /// Ongoing production gap at least as long as the stoppage threshold.
    async fn detect_current_stoppage(&self, device_id: &str)
        -> DomainResult<Option<DowntimePeriod>>;

    async fn validate_data_sufficiency(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<DataValidationResult>;

    /// Partition `[start, end)` into windows of `window` and calculate each
    /// lazily. Every call starts again from the first window.
    fn calculate_oee_trends(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        window: Duration,
    ) -> DomainResult<OeeTrendStream>;

    async fn get_calculation_configuration(&self) -> OeeCalculationConfig;

    /// Rejected unless the new configuration validates.
    async fn update_calculation_configuration(
        &self,
        config: OeeCalculationConfig,
    ) -> DomainResult<()>;
}

// ── StoppageDetectionService ───────────────────────────────────

#[async_trait]
pub trait StoppageDetectionService: Send + Sync {
    /// Check every line with monitoring enabled. A failing line is counted
    /// in the summary, never aborting the pass.
    async fn monitor_all_lines(&self) -> DomainResult<MonitoringSummary>;

    async fn monitor_line(&self, line_id: &str) -> DomainResult<LineCheckOutcome>;

    async fn is_line_stopped(&self, line_id: &str) -> DomainResult<bool>;

    /// `Running` without an open stoppage, otherwise whether the open one
    /// still needs an operator to classify it.
    async fn get_line_state(&self, line_id: &str) -> DomainResult<StoppageState>;

    async fn get_last_production_time(&self, line_id: &str)
        -> DomainResult<Option<DateTime<Utc>>>;

    /// Elapsed time of the open stoppage, if any.
    async fn get_current_stoppage_duration(&self, line_id: &str)
        -> DomainResult<Option<Duration>>;

    async fn should_trigger_alert(&self, line_id: &str) -> DomainResult<bool>;

    async fn validate_stoppage_creation(
        &self,
        line_id: &str,
        last_production_time: DateTime<Utc>,
    ) -> DomainResult<StoppageCreationDecision>;

    /// Open a stoppage, or return the one already open on the line.
    async fn create_detected_stoppage(
        &self,
        line_id: &str,
        start_time: DateTime<Utc>,
        work_order_id: Option<String>,
    ) -> DomainResult<EquipmentStoppage>;

    /// Close the open stoppage at `end_time`. `None` when nothing was open.
    async fn end_active_stoppage(
        &self,
        line_id: &str,
        end_time: DateTime<Utc>,
    ) -> DomainResult<Option<EquipmentStoppage>>;
}
