//! Counter device simulator
//!
//! Emulates ADAM-style counter modules feeding the in-memory store: a
//! 32-bit production register that rolls over, an occasional reject
//! count, and random pauses long enough to trip the stoppage detector.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::memory::InMemoryCounterStore;
use crate::domain::counter::COUNTER_MODULUS;

/// Simulation parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorSettings {
    pub tick: Duration,
    pub pieces_per_tick: u64,
    pub production_channel: u8,
    pub reject_channel: u8,
    /// Chance per producing tick that one piece is rejected
    pub reject_probability: f64,
    /// Chance per producing tick that the device starts a pause
    pub pause_probability: f64,
    pub pause_ticks: u32,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(2),
            pieces_per_tick: 1,
            production_channel: 0,
            reject_channel: 1,
            reject_probability: 0.02,
            pause_probability: 0.005,
            pause_ticks: 200,
        }
    }
}

/// What a device did on one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Produced,
    PauseStarted,
    Paused,
}

/// Register state of one simulated device
#[derive(Debug, Clone, Default)]
pub struct SimulatedDevice {
    pub production: u64,
    pub rejects: u64,
    pub paused_ticks_left: u32,
}

impl SimulatedDevice {
    pub fn starting_at(production: u64) -> Self {
        Self {
            production: production % COUNTER_MODULUS,
            ..Default::default()
        }
    }

    pub fn step(&mut self, settings: &SimulatorSettings, rng: &mut impl Rng) -> TickOutcome {
        if self.paused_ticks_left > 0 {
            self.paused_ticks_left -= 1;
            return TickOutcome::Paused;
        }

        if settings.pause_ticks > 0 && rng.gen_bool(settings.pause_probability.clamp(0.0, 1.0)) {
            self.paused_ticks_left = settings.pause_ticks;
            return TickOutcome::PauseStarted;
        }

        self.production = (self.production + settings.pieces_per_tick) % COUNTER_MODULUS;
        if rng.gen_bool(settings.reject_probability.clamp(0.0, 1.0)) {
            self.rejects = (self.rejects + 1) % COUNTER_MODULUS;
        }
        TickOutcome::Produced
    }
}

pub struct CounterSimulator {
    store: Arc<InMemoryCounterStore>,
    settings: SimulatorSettings,
}

impl CounterSimulator {
    pub fn new(store: Arc<InMemoryCounterStore>, settings: SimulatorSettings) -> Self {
        Self { store, settings }
    }

    /// Run one device until `shutdown` fires. Both channels are logged on
    /// every tick, paused or not.
    pub fn spawn_device(
        &self,
        device_id: impl Into<String>,
        mut device: SimulatedDevice,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let device_id = device_id.into();
        let store = self.store.clone();
        let settings = self.settings.clone();

        tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let mut interval = tokio::time::interval(settings.tick);
            info!(
                device_id = %device_id,
                tick_ms = settings.tick.as_millis() as u64,
                "🏭 Simulated device started"
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match device.step(&settings, &mut rng) {
                            TickOutcome::PauseStarted => info!(
                                device_id = %device_id,
                                ticks = settings.pause_ticks,
                                "⏸️ Simulated device pausing"
                            ),
                            TickOutcome::Paused if device.paused_ticks_left == 0 => {
                                info!(device_id = %device_id, "▶️ Simulated device resuming")
                            }
                            _ => {}
                        }

                        let now = Utc::now();
                        let production = device.production;
                        store.ingest(&device_id, settings.production_channel, now, production);
                        store.ingest(&device_id, settings.reject_channel, now, device.rejects);
                        debug!(
                            device_id = %device_id,
                            production,
                            rejects = device.rejects,
                            "Simulated tick"
                        );
                    }
                    _ = shutdown.cancelled() => {
                        info!(device_id = %device_id, "🏭 Simulated device stopped");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pause_probability: f64, reject_probability: f64) -> SimulatorSettings {
        SimulatorSettings {
            pause_probability,
            reject_probability,
            pause_ticks: 3,
            ..Default::default()
        }
    }

    #[test]
    fn producing_device_increments() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut device = SimulatedDevice::default();
        for _ in 0..10 {
            assert_eq!(device.step(&settings(0.0, 0.0), &mut rng), TickOutcome::Produced);
        }
        assert_eq!(device.production, 10);
        assert_eq!(device.rejects, 0);
    }

    #[test]
    fn pause_holds_counter_for_configured_ticks() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut device = SimulatedDevice::default();
        let s = settings(1.0, 0.0);

        assert_eq!(device.step(&s, &mut rng), TickOutcome::PauseStarted);
        for _ in 0..3 {
            assert_eq!(device.step(&s, &mut rng), TickOutcome::Paused);
        }
        assert_eq!(device.production, 0);
        assert_eq!(device.paused_ticks_left, 0);
    }

    #[test]
    fn production_register_rolls_over() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut device = SimulatedDevice::starting_at(COUNTER_MODULUS - 1);
        device.step(&settings(0.0, 1.0), &mut rng);
        assert_eq!(device.production, 0);
        assert_eq!(device.rejects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_device_feeds_store_until_shutdown() {
        let store = Arc::new(InMemoryCounterStore::new());
        let simulator = CounterSimulator::new(
            store.clone(),
            SimulatorSettings {
                tick: Duration::from_secs(1),
                pause_probability: 0.0,
                ..Default::default()
            },
        );
        let shutdown = CancellationToken::new();
        let handle = simulator.spawn_device("SIM-01", SimulatedDevice::default(), shutdown.clone());

        tokio::time::sleep(Duration::from_millis(4500)).await;
        shutdown.cancel();
        handle.await.unwrap();

        // Ticks at 0..=4 s, two channels each.
        assert_eq!(store.reading_count("SIM-01"), 10);
    }
}
