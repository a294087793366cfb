//! Stoppage Monitor Service
//!
//! Periodically runs a detection pass over every monitored line until
//! shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::ports::StoppageDetectionService;

/// Background task driving [`StoppageDetectionService::monitor_all_lines`]
pub struct StoppageMonitor {
    detector: Arc<dyn StoppageDetectionService>,
    check_interval: Duration,
    running: Arc<AtomicBool>,
}

impl StoppageMonitor {
    pub fn new(detector: Arc<dyn StoppageDetectionService>, check_interval: Duration) -> Self {
        Self {
            detector,
            check_interval,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the monitor background task
    pub fn start(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let detector = self.detector.clone();
        let check_interval = self.check_interval;
        let running = self.running.clone();

        tokio::spawn(async move {
            running.store(true, Ordering::SeqCst);
            info!(
                interval_secs = check_interval.as_secs(),
                "🔍 Stoppage monitor started"
            );

            let mut interval = tokio::time::interval(check_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = detector.monitor_all_lines().await {
                            warn!(error = %e, "Stoppage monitoring pass failed");
                        }
                    }
                    _ = shutdown.cancelled() => {
                        info!("🔍 Stoppage monitor shutting down");
                        break;
                    }
                }
            }

            running.store(false, Ordering::SeqCst);
            info!("🔍 Stoppage monitor stopped");
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use crate::domain::stoppage::{
        EquipmentStoppage, LineCheckOutcome, MonitoringSummary, StoppageCreationDecision,
        StoppageState,
    };
    use crate::domain::{DomainError, DomainResult};

    #[derive(Default)]
    struct CountingDetector {
        passes: AtomicUsize,
    }

    #[async_trait]
    impl StoppageDetectionService for CountingDetector {
        async fn monitor_all_lines(&self) -> DomainResult<MonitoringSummary> {
            let pass = self.passes.fetch_add(1, Ordering::SeqCst);
            if pass == 1 {
                return Err(DomainError::Storage("directory offline".to_string()));
            }
            Ok(MonitoringSummary::default())
        }

        async fn monitor_line(&self, _line_id: &str) -> DomainResult<LineCheckOutcome> {
            Ok(LineCheckOutcome::Running)
        }

        async fn is_line_stopped(&self, _line_id: &str) -> DomainResult<bool> {
            Ok(false)
        }

        async fn get_line_state(&self, _line_id: &str) -> DomainResult<StoppageState> {
            Ok(StoppageState::Running)
        }

        async fn get_last_production_time(
            &self,
            _line_id: &str,
        ) -> DomainResult<Option<DateTime<Utc>>> {
            Ok(None)
        }

        async fn get_current_stoppage_duration(
            &self,
            _line_id: &str,
        ) -> DomainResult<Option<chrono::Duration>> {
            Ok(None)
        }

        async fn should_trigger_alert(&self, _line_id: &str) -> DomainResult<bool> {
            Ok(false)
        }

        async fn validate_stoppage_creation(
            &self,
            _line_id: &str,
            _last_production_time: DateTime<Utc>,
        ) -> DomainResult<StoppageCreationDecision> {
            Ok(StoppageCreationDecision::NoAction {
                reason: "test".to_string(),
            })
        }

        async fn create_detected_stoppage(
            &self,
            line_id: &str,
            start_time: DateTime<Utc>,
            work_order_id: Option<String>,
        ) -> DomainResult<EquipmentStoppage> {
            Ok(EquipmentStoppage::detected(line_id, work_order_id, start_time, 5))
        }

        async fn end_active_stoppage(
            &self,
            _line_id: &str,
            _end_time: DateTime<Utc>,
        ) -> DomainResult<Option<EquipmentStoppage>> {
            Ok(None)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_until_shutdown_and_survives_errors() {
        let detector = Arc::new(CountingDetector::default());
        let monitor = StoppageMonitor::new(detector.clone(), Duration::from_secs(30));
        let shutdown = CancellationToken::new();

        let handle = monitor.start(shutdown.clone());
        tokio::time::sleep(Duration::from_secs(95)).await;
        assert!(monitor.is_running());

        shutdown.cancel();
        handle.await.unwrap();

        assert!(!monitor.is_running());
        // Immediate first tick, then at 30, 60 and 90 seconds.
        assert_eq!(detector.passes.load(Ordering::SeqCst), 4);
    }
}
