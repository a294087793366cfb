//! OEE engine
//!
//! Orchestrates the availability, performance and quality calculators
//! over retried counter-store reads.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures_util::stream::{self, StreamExt};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::availability::AvailabilityCalculator;
use super::performance::PerformanceCalculator;
use super::quality::QualityCalculator;
use super::sufficiency;
use super::trends::TrendWindows;
use crate::domain::counter::{
    AggregatedCounterData, CounterDataClient, CounterReading, DowntimePeriod,
};
use crate::domain::oee::{
    Availability, DataValidationResult, OeeCalculation, OeeCalculationConfig, Performance, Quality,
};
use crate::domain::ports::{OeeCalculationService, OeeTrendStream};
use crate::domain::stoppage::{EquipmentStoppage, StoppageStore};
use crate::domain::work_order::WorkOrderSource;
use crate::domain::{DomainError, DomainResult};
use crate::shared::retry::RetryExecutor;

/// Who a calculation is for, beyond the device
#[derive(Debug, Clone, Default)]
struct CalculationScope {
    line_id: Option<String>,
    work_order_id: Option<String>,
    target_rate_per_minute: Option<f64>,
}

/// OEE calculation service
///
/// Cheap to clone: collaborators and configuration are shared.
#[derive(Clone)]
pub struct OeeEngine {
    counters: Arc<dyn CounterDataClient>,
    stoppages: Arc<dyn StoppageStore>,
    work_orders: Arc<dyn WorkOrderSource>,
    retry: RetryExecutor,
    config: Arc<RwLock<OeeCalculationConfig>>,
}

impl OeeEngine {
    pub fn new(
        counters: Arc<dyn CounterDataClient>,
        stoppages: Arc<dyn StoppageStore>,
        work_orders: Arc<dyn WorkOrderSource>,
        retry: RetryExecutor,
        config: OeeCalculationConfig,
    ) -> Self {
        Self {
            counters,
            stoppages,
            work_orders,
            retry,
            config: Arc::new(RwLock::new(config)),
        }
    }

    async fn config_snapshot(&self) -> OeeCalculationConfig {
        self.config.read().await.clone()
    }

    // ── Retried reads ──────────────────────────────────────────

    async fn read_period(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Vec<CounterReading>> {
        self.retry
            .run("get_data_for_period", |_| {
                self.counters.get_data_for_period(device_id, start, end)
            })
            .await
            .into_result()
            .map_err(|f| DomainError::from_retry("get_data_for_period", f))
    }

    async fn read_aggregate(
        &self,
        device_id: &str,
        channel: u8,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<AggregatedCounterData> {
        self.retry
            .run("get_aggregated_data", |_| {
                self.counters.get_aggregated_data(device_id, channel, start, end)
            })
            .await
            .into_result()
            .map_err(|f| DomainError::from_retry("get_aggregated_data", f))
    }

    async fn read_downtime(
        &self,
        device_id: &str,
        channel: u8,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        min_gap_minutes: u32,
    ) -> DomainResult<Vec<DowntimePeriod>> {
        self.retry
            .run("get_downtime_periods", |_| {
                self.counters
                    .get_downtime_periods(device_id, channel, start, end, min_gap_minutes)
            })
            .await
            .into_result()
            .map_err(|f| DomainError::from_retry("get_downtime_periods", f))
    }

    async fn line_stoppages(
        &self,
        line_id: Option<&str>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Vec<EquipmentStoppage>> {
        match line_id {
            Some(line_id) => self.stoppages.find_by_line(line_id, start, end).await,
            None => Ok(Vec::new()),
        }
    }

    // ── Calculation ────────────────────────────────────────────

    async fn availability_for(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        line_id: Option<&str>,
        config: &OeeCalculationConfig,
    ) -> DomainResult<Availability> {
        let (periods, stoppages) = tokio::try_join!(
            self.read_downtime(
                device_id,
                config.production_channel,
                start,
                end,
                config.stoppage_threshold_minutes
            ),
            self.line_stoppages(line_id, start, end),
        )?;
        let intervals =
            AvailabilityCalculator::downtime_intervals(start, end, &periods, &stoppages);
        Ok(AvailabilityCalculator::calculate(start, end, intervals))
    }

    async fn compute(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        scope: CalculationScope,
    ) -> DomainResult<OeeCalculation> {
        ensure_window(start, end)?;
        let config = self.config_snapshot().await;

        let (readings, production, rejects, availability) = tokio::try_join!(
            self.read_period(device_id, start, end),
            self.read_aggregate(device_id, config.production_channel, start, end),
            self.read_aggregate(device_id, config.reject_channel, start, end),
            self.availability_for(device_id, start, end, scope.line_id.as_deref(), &config),
        )?;

        let validation =
            sufficiency::assess(&readings, config.production_channel, config.minimum_data_points);
        let target = scope
            .target_rate_per_minute
            .unwrap_or(config.target_rate_per_minute);
        let performance = PerformanceCalculator::calculate(
            production.total_count,
            target,
            availability.actual_runtime_minutes,
        );
        let quality = QualityCalculator::from_output(production.total_count, rejects.total_count);
        let oee = OeeCalculation::oee_percentage(&availability, &performance, &quality);

        let mut issues = validation.issues;
        let mut recommendations = validation.recommendations;
        for (issue, recommendation) in PerformanceCalculator::findings(&performance) {
            issues.push(issue);
            recommendations.push(recommendation);
        }

        if !validation.is_sufficient {
            warn!(
                device_id,
                data_points = validation.data_points,
                minimum = validation.minimum_required,
                "Insufficient data, OEE flagged unreliable"
            );
        }

        metrics::gauge!("oee_percentage", "device_id" => device_id.to_string()).set(oee);

        debug!(
            device_id,
            availability = availability.percentage,
            performance = performance.percentage,
            quality = quality.percentage,
            oee,
            "OEE calculated"
        );

        Ok(OeeCalculation {
            device_id: device_id.to_string(),
            line_id: scope.line_id,
            work_order_id: scope.work_order_id,
            window_start: start,
            window_end: end,
            availability,
            performance,
            quality,
            oee,
            is_reliable: validation.is_sufficient,
            issues,
            recommendations,
            calculated_at: Utc::now(),
        })
    }
}

fn ensure_window(start: DateTime<Utc>, end: DateTime<Utc>) -> DomainResult<()> {
    if end <= start {
        return Err(DomainError::Validation(format!(
            "window end {} must be after start {}",
            end, start
        )));
    }
    Ok(())
}

#[async_trait]
impl OeeCalculationService for OeeEngine {
    async fn calculate_current_oee(&self, device_id: &str) -> DomainResult<OeeCalculation> {
        let window = i64::from(self.config.read().await.current_window_minutes);
        let end = Utc::now();
        self.compute(device_id, end - Duration::minutes(window), end, CalculationScope::default())
            .await
    }

    async fn calculate_oee_for_period(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<OeeCalculation> {
        self.compute(device_id, start, end, CalculationScope::default())
            .await
    }

    async fn calculate_oee_for_work_order(
        &self,
        work_order_id: &str,
    ) -> DomainResult<OeeCalculation> {
        let work_order = self
            .work_orders
            .find_by_id(work_order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("WorkOrder", "id", work_order_id))?;

        let end = work_order.completed_at.unwrap_or_else(Utc::now);
        info!(
            work_order_id,
            line_id = %work_order.line_id,
            running = work_order.is_running(),
            "Calculating work order OEE"
        );

        let scope = CalculationScope {
            line_id: Some(work_order.line_id.clone()),
            work_order_id: Some(work_order.id.clone()),
            target_rate_per_minute: work_order.target_rate_per_minute,
        };
        self.compute(&work_order.device_id, work_order.started_at, end, scope)
            .await
    }

    async fn calculate_availability(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Availability> {
        ensure_window(start, end)?;
        let config = self.config_snapshot().await;
        self.availability_for(device_id, start, end, None, &config)
            .await
    }

    async fn calculate_performance(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Performance> {
        ensure_window(start, end)?;
        let config = self.config_snapshot().await;
        let (availability, production) = tokio::try_join!(
            self.availability_for(device_id, start, end, None, &config),
            self.read_aggregate(device_id, config.production_channel, start, end),
        )?;
        Ok(PerformanceCalculator::calculate(
            production.total_count,
            config.target_rate_per_minute,
            availability.actual_runtime_minutes,
        ))
    }

    async fn calculate_quality(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Quality> {
        ensure_window(start, end)?;
        let config = self.config_snapshot().await;
        let (production, rejects) = tokio::try_join!(
            self.read_aggregate(device_id, config.production_channel, start, end),
            self.read_aggregate(device_id, config.reject_channel, start, end),
        )?;
        Ok(QualityCalculator::from_output(
            production.total_count,
            rejects.total_count,
        ))
    }

    async fn detect_current_stoppage(
        &self,
        device_id: &str,
    ) -> DomainResult<Option<DowntimePeriod>> {
        let config = self.config_snapshot().await;
        let end = Utc::now();
        let start = end - Duration::minutes(i64::from(config.current_window_minutes));
        let threshold = f64::from(config.stoppage_threshold_minutes);

        let periods = self
            .read_downtime(
                device_id,
                config.production_channel,
                start,
                end,
                config.stoppage_threshold_minutes,
            )
            .await?;

        Ok(periods
            .into_iter()
            .rev()
            .find(|p| p.is_ongoing && p.duration_minutes() >= threshold))
    }

    async fn validate_data_sufficiency(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<DataValidationResult> {
        ensure_window(start, end)?;
        let config = self.config_snapshot().await;
        let readings = self.read_period(device_id, start, end).await?;
        Ok(sufficiency::assess(
            &readings,
            config.production_channel,
            config.minimum_data_points,
        ))
    }

    fn calculate_oee_trends(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        window: Duration,
    ) -> DomainResult<OeeTrendStream> {
        let windows = TrendWindows::new(start, end, window)?;
        debug!(device_id, windows = windows.len(), "Streaming OEE trends");

        let engine = self.clone();
        let device_id = device_id.to_string();
        Ok(stream::iter(windows)
            .then(move |(window_start, window_end)| {
                let engine = engine.clone();
                let device_id = device_id.clone();
                async move {
                    engine
                        .compute(&device_id, window_start, window_end, CalculationScope::default())
                        .await
                }
            })
            .boxed())
    }

    async fn get_calculation_configuration(&self) -> OeeCalculationConfig {
        self.config_snapshot().await
    }

    async fn update_calculation_configuration(
        &self,
        config: OeeCalculationConfig,
    ) -> DomainResult<()> {
        config.check()?;
        let mut current = self.config.write().await;
        info!(
            target_rate = config.target_rate_per_minute,
            production_channel = config.production_channel,
            reject_channel = config.reject_channel,
            "OEE calculation configuration updated"
        );
        *current = config;
        Ok(())
    }
}
