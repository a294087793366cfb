//! Stoppage detector
//!
//! Per-line state machine that opens a stoppage when a line has been idle
//! for at least the detection threshold and closes it when production
//! resumes. Every check-then-write sequence for a line runs under that
//! line's lock, so a line never has more than one open stoppage. Events
//! are published once the lock is released.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use super::line_locks::LineLocks;
use crate::domain::counter::{counter_delta, CounterDataClient, CounterReading, ReadingQuality};
use crate::domain::equipment_line::{EquipmentLine, EquipmentLineDirectory};
use crate::domain::events::{MonitoringEvent, StoppageDetectedEvent, StoppageEndedEvent};
use crate::domain::ports::{NotificationPublisher, StoppageDetectionService};
use crate::domain::stoppage::{
    EquipmentStoppage, LineCheckOutcome, MonitoringSummary, StoppageCreationDecision,
    StoppageState, StoppageStore,
};
use crate::domain::{DomainError, DomainResult};
use crate::shared::retry::RetryExecutor;

/// Detection thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    /// Idle time before a stoppage is opened
    pub detection_threshold_minutes: u32,
    /// Open time before an operator must classify the stoppage
    pub classification_threshold_minutes: u32,
    /// Window for the current-rate check that closes a stoppage
    pub rate_lookback_minutes: u32,
    /// How far back to search for the last producing sample
    pub activity_lookback_hours: u32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            detection_threshold_minutes: 5,
            classification_threshold_minutes: 5,
            rate_lookback_minutes: 1,
            activity_lookback_hours: 24,
        }
    }
}

/// Newest non-bad sample on `channel` whose count moved since its predecessor.
pub fn last_producing_timestamp(
    readings: &[CounterReading],
    channel: u8,
) -> Option<DateTime<Utc>> {
    let mut samples: Vec<&CounterReading> = readings
        .iter()
        .filter(|r| r.channel == channel && r.quality != ReadingQuality::Bad)
        .collect();
    samples.sort_by_key(|r| r.timestamp);

    samples
        .windows(2)
        .rev()
        .find(|pair| counter_delta(pair[0].processed_value, pair[1].processed_value) > 0)
        .map(|pair| pair[1].timestamp)
}

/// Result of a locked section and the event it owes once the lock is gone
type Deferred<T> = (T, Option<MonitoringEvent>);

pub struct StoppageDetector {
    lines: Arc<dyn EquipmentLineDirectory>,
    counters: Arc<dyn CounterDataClient>,
    stoppages: Arc<dyn StoppageStore>,
    notifier: Arc<dyn NotificationPublisher>,
    device_retry: RetryExecutor,
    network_retry: RetryExecutor,
    locks: LineLocks,
    settings: DetectorSettings,
}

impl StoppageDetector {
    pub fn new(
        lines: Arc<dyn EquipmentLineDirectory>,
        counters: Arc<dyn CounterDataClient>,
        stoppages: Arc<dyn StoppageStore>,
        notifier: Arc<dyn NotificationPublisher>,
        device_retry: RetryExecutor,
        network_retry: RetryExecutor,
    ) -> Self {
        Self {
            lines,
            counters,
            stoppages,
            notifier,
            device_retry,
            network_retry,
            locks: LineLocks::new(),
            settings: DetectorSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: DetectorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    async fn require_line(&self, line_id: &str) -> DomainResult<EquipmentLine> {
        self.lines
            .get_line(line_id)
            .await?
            .ok_or_else(|| DomainError::not_found("EquipmentLine", "id", line_id))
    }

    // ── Counter reads ──────────────────────────────────────────

    fn activity_window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let end = Utc::now();
        let start = end - Duration::hours(i64::from(self.settings.activity_lookback_hours));
        (start, end)
    }

    async fn has_recent_activity(&self, line: &EquipmentLine) -> DomainResult<bool> {
        let (start, end) = self.activity_window();
        self.device_retry
            .run("has_production_activity", |_| {
                self.counters.has_production_activity(
                    &line.device_id,
                    line.production_channel,
                    start,
                    end,
                )
            })
            .await
            .into_result()
            .map_err(|f| DomainError::from_retry("has_production_activity", f))
    }

    async fn last_production_time(
        &self,
        line: &EquipmentLine,
    ) -> DomainResult<Option<DateTime<Utc>>> {
        let (start, end) = self.activity_window();
        let readings = self
            .device_retry
            .run("get_data_for_period", |_| {
                self.counters.get_data_for_period(&line.device_id, start, end)
            })
            .await
            .into_result()
            .map_err(|f| DomainError::from_retry("get_data_for_period", f))?;

        Ok(last_producing_timestamp(&readings, line.production_channel))
    }

    async fn current_rate(&self, line: &EquipmentLine) -> DomainResult<f64> {
        self.device_retry
            .run("get_current_rate", |_| {
                self.counters.get_current_rate(
                    &line.device_id,
                    line.production_channel,
                    self.settings.rate_lookback_minutes,
                )
            })
            .await
            .into_result()
            .map_err(|f| DomainError::from_retry("get_current_rate", f))
    }

    /// Delivery failures are logged and never fail detection.
    async fn publish(&self, event: MonitoringEvent) {
        let event_type = event.event_type();
        let line_id = event.line_id().to_string();

        let result = self
            .network_retry
            .run("publish_event", |_| self.notifier.publish(event.clone()))
            .await;

        match result.into_result() {
            Ok(()) => debug!(event_type, line_id = %line_id, "Event published"),
            Err(e) => warn!(
                event_type,
                line_id = %line_id,
                attempts = e.attempts(),
                error = %e,
                "Failed to publish event"
            ),
        }
    }

    async fn publish_deferred(&self, event: Option<MonitoringEvent>) {
        if let Some(event) = event {
            self.publish(event).await;
        }
    }

    // ── Locked sections ────────────────────────────────────────
    // Callers hold the line's lock.

    async fn monitor_line_locked(
        &self,
        line: &EquipmentLine,
    ) -> DomainResult<Deferred<LineCheckOutcome>> {
        let now = Utc::now();

        if let Some(open) = self.stoppages.get_active_by_line(&line.id).await? {
            let rate = self.current_rate(line).await?;
            if rate > 0.0 {
                return match self.end_active_locked(&line.id, now).await? {
                    Some((closed, event)) => Ok((LineCheckOutcome::StoppageEnded(closed), event)),
                    None => Ok((LineCheckOutcome::Running, None)),
                };
            }

            debug!(
                line_id = %line.id,
                stoppage_id = %open.id,
                minutes = open.duration_minutes(now),
                "Stoppage continuing"
            );
            return Ok((LineCheckOutcome::StoppageContinuing(open), None));
        }

        if !self.has_recent_activity(line).await? {
            debug!(line_id = %line.id, "No production activity in lookback window");
            return Ok((LineCheckOutcome::NoActivityData, None));
        }
        let Some(last_production) = self.last_production_time(line).await? else {
            debug!(line_id = %line.id, "No producing sample in lookback window");
            return Ok((LineCheckOutcome::NoActivityData, None));
        };

        let idle_minutes = (now - last_production).num_minutes();
        if idle_minutes < i64::from(self.settings.detection_threshold_minutes) {
            let outcome = if idle_minutes <= 0 {
                LineCheckOutcome::Running
            } else {
                LineCheckOutcome::BelowThreshold { idle_minutes }
            };
            return Ok((outcome, None));
        }

        match self.validate_locked(&line.id, last_production, now).await? {
            StoppageCreationDecision::CreateStoppage => {
                let (stoppage, event) = self
                    .create_locked(&line.id, last_production, line.current_work_order_id.clone())
                    .await?;
                Ok((LineCheckOutcome::StoppageCreated(stoppage), event))
            }
            StoppageCreationDecision::UseExisting { existing, reason } => {
                debug!(line_id = %line.id, reason = %reason, "Using existing stoppage");
                Ok((LineCheckOutcome::StoppageContinuing(existing), None))
            }
            StoppageCreationDecision::NoAction { reason } => {
                debug!(line_id = %line.id, reason = %reason, "No stoppage action");
                Ok((LineCheckOutcome::BelowThreshold { idle_minutes }, None))
            }
        }
    }

    async fn validate_locked(
        &self,
        line_id: &str,
        last_production_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DomainResult<StoppageCreationDecision> {
        if let Some(existing) = self.stoppages.get_active_by_line(line_id).await? {
            return Ok(StoppageCreationDecision::UseExisting {
                reason: format!("line already has open stoppage {}", existing.id),
                existing,
            });
        }

        if last_production_time > now {
            return Ok(StoppageCreationDecision::NoAction {
                reason: "last production time is in the future".to_string(),
            });
        }

        let idle_minutes = (now - last_production_time).num_minutes();
        let threshold = self.settings.detection_threshold_minutes;
        if idle_minutes < i64::from(threshold) {
            return Ok(StoppageCreationDecision::NoAction {
                reason: format!(
                    "idle for {} min, below the {} min detection threshold",
                    idle_minutes, threshold
                ),
            });
        }

        Ok(StoppageCreationDecision::CreateStoppage)
    }

    async fn create_locked(
        &self,
        line_id: &str,
        start_time: DateTime<Utc>,
        work_order_id: Option<String>,
    ) -> DomainResult<Deferred<EquipmentStoppage>> {
        if let Some(existing) = self.stoppages.get_active_by_line(line_id).await? {
            warn!(
                line_id,
                stoppage_id = %existing.id,
                "Stoppage already open, skipping creation"
            );
            return Ok((existing, None));
        }

        let now = Utc::now();
        if start_time > now {
            return Err(DomainError::Validation(format!(
                "stoppage start {} is in the future",
                start_time
            )));
        }

        let stoppage = EquipmentStoppage::detected(
            line_id,
            work_order_id,
            start_time,
            self.settings.detection_threshold_minutes,
        );
        self.stoppages.create(stoppage.clone()).await?;

        metrics::counter!("oee_stoppages_detected_total", "line_id" => line_id.to_string())
            .increment(1);
        info!(
            line_id,
            stoppage_id = %stoppage.id,
            start_time = %stoppage.start_time,
            minutes = stoppage.duration_minutes(now),
            "🛑 Stoppage detected"
        );

        let event = MonitoringEvent::StoppageDetected(StoppageDetectedEvent::from_stoppage(
            &stoppage,
            now,
            self.settings.classification_threshold_minutes,
        ));
        Ok((stoppage, Some(event)))
    }

    async fn end_active_locked(
        &self,
        line_id: &str,
        end_time: DateTime<Utc>,
    ) -> DomainResult<Option<Deferred<EquipmentStoppage>>> {
        let Some(mut stoppage) = self.stoppages.get_active_by_line(line_id).await? else {
            return Ok(None);
        };

        stoppage.close(end_time)?;
        self.stoppages.update(stoppage.clone()).await?;

        metrics::counter!("oee_stoppages_ended_total", "line_id" => line_id.to_string())
            .increment(1);
        info!(
            line_id,
            stoppage_id = %stoppage.id,
            minutes = stoppage.duration_minutes(end_time),
            "▶️ Production resumed, stoppage closed"
        );

        let event =
            StoppageEndedEvent::from_stoppage(&stoppage).map(MonitoringEvent::StoppageEnded);
        Ok(Some((stoppage, event)))
    }

    async fn monitor_known_line(&self, line: &EquipmentLine) -> DomainResult<LineCheckOutcome> {
        let (outcome, event) = {
            let _guard = self.locks.acquire(&line.id).await;
            self.monitor_line_locked(line).await?
        };
        self.publish_deferred(event).await;
        Ok(outcome)
    }
}

#[async_trait]
impl StoppageDetectionService for StoppageDetector {
    async fn monitor_all_lines(&self) -> DomainResult<MonitoringSummary> {
        let lines = self.lines.get_active_monitoring_lines().await?;
        metrics::counter!("oee_monitor_ticks_total").increment(1);

        let results = join_all(lines.iter().map(|line| self.monitor_known_line(line))).await;

        let mut summary = MonitoringSummary::default();
        for (line, result) in lines.iter().zip(results) {
            match result {
                Ok(outcome) => {
                    debug!(line_id = %line.id, outcome = outcome.as_str(), "Line checked");
                    summary.record(&outcome);
                }
                Err(e) => {
                    warn!(line_id = %line.id, error = %e, "Line monitoring failed");
                    summary.record_failure();
                }
            }
        }

        if summary.stoppages_created + summary.stoppages_ended + summary.failures > 0 {
            info!(
                lines = summary.lines_checked,
                created = summary.stoppages_created,
                ended = summary.stoppages_ended,
                failures = summary.failures,
                "Monitoring pass complete"
            );
        } else {
            debug!(lines = summary.lines_checked, "Monitoring pass complete");
        }

        Ok(summary)
    }

    async fn monitor_line(&self, line_id: &str) -> DomainResult<LineCheckOutcome> {
        let line = self.require_line(line_id).await?;
        self.monitor_known_line(&line).await
    }

    async fn is_line_stopped(&self, line_id: &str) -> DomainResult<bool> {
        Ok(self.stoppages.get_active_by_line(line_id).await?.is_some())
    }

    async fn get_line_state(&self, line_id: &str) -> DomainResult<StoppageState> {
        let now = Utc::now();
        let threshold = self.settings.classification_threshold_minutes;
        Ok(self
            .stoppages
            .get_active_by_line(line_id)
            .await?
            .map_or(StoppageState::Running, |s| s.state(now, threshold)))
    }

    async fn get_last_production_time(
        &self,
        line_id: &str,
    ) -> DomainResult<Option<DateTime<Utc>>> {
        let line = self.require_line(line_id).await?;
        self.last_production_time(&line).await
    }

    async fn get_current_stoppage_duration(&self, line_id: &str) -> DomainResult<Option<Duration>> {
        let now = Utc::now();
        Ok(self
            .stoppages
            .get_active_by_line(line_id)
            .await?
            .map(|s| s.duration(now)))
    }

    async fn should_trigger_alert(&self, line_id: &str) -> DomainResult<bool> {
        let now = Utc::now();
        let threshold = self.settings.classification_threshold_minutes;
        Ok(self
            .stoppages
            .get_active_by_line(line_id)
            .await?
            .is_some_and(|s| s.requires_classification(now, threshold)))
    }

    async fn validate_stoppage_creation(
        &self,
        line_id: &str,
        last_production_time: DateTime<Utc>,
    ) -> DomainResult<StoppageCreationDecision> {
        let _guard = self.locks.acquire(line_id).await;
        self.validate_locked(line_id, last_production_time, Utc::now())
            .await
    }

    async fn create_detected_stoppage(
        &self,
        line_id: &str,
        start_time: DateTime<Utc>,
        work_order_id: Option<String>,
    ) -> DomainResult<EquipmentStoppage> {
        let (stoppage, event) = {
            let _guard = self.locks.acquire(line_id).await;
            self.create_locked(line_id, start_time, work_order_id).await?
        };
        self.publish_deferred(event).await;
        Ok(stoppage)
    }

    async fn end_active_stoppage(
        &self,
        line_id: &str,
        end_time: DateTime<Utc>,
    ) -> DomainResult<Option<EquipmentStoppage>> {
        let ended = {
            let _guard = self.locks.acquire(line_id).await;
            self.end_active_locked(line_id, end_time).await?
        };
        Ok(match ended {
            Some((stoppage, event)) => {
                self.publish_deferred(event).await;
                Some(stoppage)
            }
            None => None,
        })
    }
}
