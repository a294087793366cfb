//! Monitoring runtime.
//!
//! [`MonitorHandle`] wires the in-memory stores, the event bus, the
//! stoppage detector and the OEE engine together, starts the background
//! monitor (and optionally the counter simulator) and owns graceful
//! shutdown.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::application::events::{create_event_bus, SharedEventBus};
use crate::application::oee::OeeEngine;
use crate::application::stoppage::{StoppageDetector, StoppageMonitor};
use crate::config::{AppConfig, MetricsConfig};
use crate::domain::equipment_line::EquipmentLine;
use crate::domain::work_order::WorkOrder;
use crate::infrastructure::counters::{CounterSimulator, InMemoryCounterStore, SimulatedDevice};
use crate::infrastructure::storage::{
    InMemoryLineDirectory, InMemoryStoppageStore, InMemoryWorkOrders,
};
use crate::shared::errors::{DomainError, DomainResult};
use crate::shared::retry::{RetryExecutor, RetryPolicy};
use crate::shared::shutdown::ShutdownCoordinator;

// ── Options ────────────────────────────────────────────────────────

pub struct MonitorOptions {
    pub config: AppConfig,
    /// Feed the counter store from simulated devices, one per line.
    pub simulate: bool,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            config: AppConfig::default(),
            simulate: true,
        }
    }
}

/// Identifiers of the `index`-th simulated line: `(line_id, device_id)`.
pub fn simulated_ids(index: u32) -> (String, String) {
    (
        format!("LINE-{:02}", index + 1),
        format!("SIM-{:02}", index + 1),
    )
}

// ── MonitorHandle ──────────────────────────────────────────────────

/// Handle to a running monitoring runtime.
pub struct MonitorHandle {
    pub counters: Arc<InMemoryCounterStore>,
    pub lines: Arc<InMemoryLineDirectory>,
    pub stoppages: Arc<InMemoryStoppageStore>,
    pub work_orders: Arc<InMemoryWorkOrders>,
    pub event_bus: SharedEventBus,
    pub detector: Arc<StoppageDetector>,
    pub engine: Arc<OeeEngine>,
    pub config: AppConfig,

    monitor: Option<StoppageMonitor>,
    shutdown: ShutdownCoordinator,
    tasks: Vec<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Validate `opts.config`, build every component and spawn the
    /// background tasks. Must be called inside a tokio runtime.
    pub fn start(opts: MonitorOptions) -> DomainResult<Self> {
        let config = opts.config;
        config.validate()?;

        info!("Starting OEE monitor...");

        let shutdown = ShutdownCoordinator::default();
        // Retry waits end as soon as shutdown starts.
        let retry_token = shutdown.token().child_token();

        // ── Stores ─────────────────────────────────────────────
        let counters = Arc::new(InMemoryCounterStore::new());
        let lines = Arc::new(InMemoryLineDirectory::new());
        let stoppages = Arc::new(InMemoryStoppageStore::new());
        let work_orders = Arc::new(InMemoryWorkOrders::new());

        let event_bus = create_event_bus();
        info!("🔔 Event bus initialized");

        // ── Services ───────────────────────────────────────────
        let detector = Arc::new(
            StoppageDetector::new(
                lines.clone(),
                counters.clone(),
                stoppages.clone(),
                event_bus.clone(),
                RetryExecutor::new(
                    RetryPolicy::device_io_from(&config.retry.device),
                    retry_token.clone(),
                ),
                RetryExecutor::new(
                    RetryPolicy::network_from(&config.retry.network),
                    retry_token.clone(),
                ),
            )
            .with_settings(config.monitoring.detector_settings()),
        );

        let engine = Arc::new(OeeEngine::new(
            counters.clone(),
            stoppages.clone(),
            work_orders.clone(),
            RetryExecutor::new(
                RetryPolicy::device_io_from(&config.retry.device),
                retry_token,
            ),
            config.oee.clone(),
        ));

        let mut tasks = Vec::new();

        // ── Simulated devices ──────────────────────────────────
        if opts.simulate {
            let simulator = CounterSimulator::new(
                counters.clone(),
                config.simulator.settings(&config.oee),
            );
            for index in 0..config.simulator.lines {
                let (line_id, device_id) = simulated_ids(index);
                let work_order_id = format!("WO-{}", line_id);

                work_orders.insert(WorkOrder {
                    id: work_order_id.clone(),
                    line_id: line_id.clone(),
                    device_id: device_id.clone(),
                    started_at: Utc::now(),
                    completed_at: None,
                    target_rate_per_minute: None,
                });
                lines.insert(
                    EquipmentLine::new(
                        line_id.clone(),
                        format!("Simulated line {}", index + 1),
                        device_id.clone(),
                        config.oee.production_channel,
                    )
                    .with_work_order(work_order_id),
                );

                tasks.push(simulator.spawn_device(
                    device_id,
                    SimulatedDevice::default(),
                    shutdown.token(),
                ));
            }
            info!(lines = config.simulator.lines, "🏭 Counter simulator started");
        }

        // ── Stoppage monitor ───────────────────────────────────
        let monitor = if config.monitoring.enabled {
            let monitor =
                StoppageMonitor::new(detector.clone(), config.monitoring.check_interval());
            tasks.push(monitor.start(shutdown.token()));
            Some(monitor)
        } else {
            info!("Stoppage monitoring disabled by configuration");
            None
        };

        info!("🚀 OEE monitor started.");

        Ok(Self {
            counters,
            lines,
            stoppages,
            work_orders,
            event_bus,
            detector,
            engine,
            config,
            monitor,
            shutdown,
            tasks,
        })
    }

    /// Token cancelled when shutdown starts. Hand it to extra tasks.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.token()
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.as_ref().is_some_and(|m| m.is_running())
    }

    /// Install OS signal listeners (SIGTERM, SIGINT) that trigger shutdown.
    pub fn install_signal_handler(&self) {
        self.shutdown.start_signal_listener();
    }

    /// Trigger graceful shutdown (non-blocking).
    pub fn trigger_shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Wait for shutdown, then for every background task to stop.
    pub async fn wait(self) {
        let tasks = self.tasks;
        let completed = self
            .shutdown
            .shutdown_with_cleanup(|| async move {
                info!("⏳ Waiting for background tasks to complete...");
                for task in tasks {
                    if let Err(e) = task.await {
                        error!(error = %e, "Background task panicked");
                    }
                }
            })
            .await;

        if completed {
            info!("👋 OEE monitor stopped");
        }
    }
}

/// Install the Prometheus recorder with its HTTP listener.
pub fn install_metrics_exporter(config: &MetricsConfig) -> DomainResult<()> {
    let addr = config.socket_addr()?;
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| DomainError::Config(format!("cannot start metrics exporter: {}", e)))?;
    info!("📊 Prometheus metrics exporter listening on http://{}/metrics", addr);
    Ok(())
}

/// Initialize tracing (logging) from the application config.
///
/// Call this once at process startup (before [`MonitorHandle::start`]).
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    match config.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}
