//! OEE monitor - CLI runtime
//!
//! Runs stoppage detection and OEE reporting against simulated counter
//! devices until SIGINT/SIGTERM.
//!
//! ```sh
//! # Run with default config (~/.config/oee-monitor/config.toml)
//! oee-monitor
//!
//! # Custom config path, four simulated lines
//! oee-monitor --config /etc/oee-monitor/config.toml --lines 4
//!
//! # Validate config without starting
//! oee-monitor --check
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::task::JoinHandle;
use tracing::{error, info};

use oee_monitor::config::AppConfig;
use oee_monitor::server::{init_tracing, install_metrics_exporter, MonitorHandle, MonitorOptions};
use reporting::spawn_reporters;

/// OEE monitor for counter-instrumented production lines.
#[derive(Parser, Debug)]
#[command(
    name = "oee-monitor",
    version,
    about = "OEE and stoppage monitoring for production lines",
    long_about = "Computes Availability, Performance, Quality and OEE from cumulative \
                  piece counters and opens/closes stoppages when lines go idle.\n\n\
                  Default config: ~/.config/oee-monitor/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "OEE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Override the number of simulated lines.
    #[arg(long)]
    lines: Option<u32>,

    /// Seconds between OEE reports per line (0 disables reporting).
    #[arg(long, default_value_t = 60)]
    report_interval: u64,

    /// Validate the configuration file and exit without starting.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // ── Load configuration ─────────────────────────────────────
    let config_path = cli.config.unwrap_or_else(oee_monitor::default_config_path);

    let mut config = match AppConfig::load(&config_path) {
        Ok(mut cfg) => {
            if let Some(ref level) = cli.log_level {
                cfg.logging.level = level.clone();
            }
            init_tracing(&cfg);
            info!("Configuration loaded from {}", config_path.display());
            cfg
        }
        Err(e) => {
            if cli.check {
                eprintln!("❌ Invalid configuration: {}", e);
                std::process::exit(1);
            }
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(
                    cli.log_level.as_deref().unwrap_or("info"),
                ))
                .init();
            error!("Failed to load config from {}: {}", config_path.display(), e);
            error!("Using default configuration.");
            AppConfig::default()
        }
    };

    // ── Apply CLI overrides ────────────────────────────────────
    if let Some(lines) = cli.lines {
        info!("CLI override: simulator.lines = {}", lines);
        config.simulator.lines = lines;
    }

    // ── Config validation mode ─────────────────────────────────
    if cli.check {
        if let Err(e) = config.validate() {
            eprintln!("❌ Invalid configuration: {}", e);
            std::process::exit(1);
        }
        println!("✅ Configuration is valid");
        println!("   Config file      : {}", config_path.display());
        println!("   Log level        : {}", config.logging.level);
        println!("   Check interval   : {}s", config.monitoring.check_interval_secs);
        println!(
            "   Stoppage after   : {} min",
            config.monitoring.detection_threshold_minutes
        );
        println!("   Target rate      : {}/min", config.oee.target_rate_per_minute);
        println!("   Simulated lines  : {}", config.simulator.lines);
        if config.metrics.enabled {
            println!("   Metrics          : http://{}/metrics", config.metrics.listen_addr);
        }
        return Ok(());
    }

    if config.metrics.enabled {
        install_metrics_exporter(&config.metrics)?;
    }

    // ── Start runtime ──────────────────────────────────────────
    let handle = MonitorHandle::start(MonitorOptions {
        config,
        simulate: true,
    })?;

    handle.install_signal_handler();

    let reporters = spawn_reporters(&handle, Duration::from_secs(cli.report_interval));

    info!("🚀 Press Ctrl+C to shutdown gracefully.");

    handle.wait().await;
    for reporter in reporters {
        let _ = reporter.await;
    }

    Ok(())
}

mod reporting {
    //! Log-only consumers of the runtime: monitoring events and periodic
    //! OEE reports.

    use super::*;

    use oee_monitor::domain::events::MonitoringEvent;
    use oee_monitor::domain::ports::OeeCalculationService;
    use oee_monitor::server::simulated_ids;
    use tracing::warn;

    pub fn spawn_reporters(
        handle: &MonitorHandle,
        report_interval: Duration,
    ) -> Vec<JoinHandle<()>> {
        let mut tasks = vec![spawn_event_logger(handle)];
        if !report_interval.is_zero() {
            tasks.push(spawn_oee_reporter(handle, report_interval));
        }
        tasks
    }

    fn spawn_event_logger(handle: &MonitorHandle) -> JoinHandle<()> {
        let mut events = handle.event_bus.subscribe();
        let shutdown = handle.shutdown_token();

        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    message = events.recv() => message,
                    _ = shutdown.cancelled() => break,
                };
                let Some(message) = message else { break };

                match &message.event {
                    MonitoringEvent::StoppageDetected(e) => info!(
                        line_id = %e.line_id,
                        stoppage_id = %e.stoppage_id,
                        urgency = ?e.urgency,
                        "📣 {}", e.summary
                    ),
                    MonitoringEvent::StoppageEnded(e) => info!(
                        line_id = %e.line_id,
                        stoppage_id = %e.stoppage_id,
                        duration_minutes = e.duration_minutes,
                        "📣 Stoppage ended"
                    ),
                }
            }
        })
    }

    fn spawn_oee_reporter(handle: &MonitorHandle, every: Duration) -> JoinHandle<()> {
        let engine = handle.engine.clone();
        let line_count = handle.config.simulator.lines;
        let shutdown = handle.shutdown_token();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // The first tick fires immediately; there is nothing to report yet.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown.cancelled() => break,
                }

                let config = engine.get_calculation_configuration().await;
                for index in 0..line_count {
                    let (line_id, device_id) = simulated_ids(index);
                    match engine.calculate_current_oee(&device_id).await {
                        Ok(oee) => {
                            info!(
                                line_id = %line_id,
                                device_id = %device_id,
                                availability = format!("{:.1}", oee.availability.percentage),
                                performance = format!("{:.1}", oee.performance.percentage),
                                quality = format!("{:.1}", oee.quality.percentage),
                                reliable = oee.is_reliable,
                                "📈 OEE {:.1}%",
                                oee.oee
                            );
                            for breach in oee.threshold_breaches(&config) {
                                warn!(
                                    line_id = %line_id,
                                    metric = ?breach.metric,
                                    value = breach.value,
                                    threshold = breach.threshold,
                                    "Metric below alert threshold"
                                );
                            }
                        }
                        Err(e) => warn!(line_id = %line_id, error = %e, "OEE calculation failed"),
                    }
                }
            }
        })
    }
}
