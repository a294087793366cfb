//! Sliding-window rate calculation

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

use crate::domain::counter::counter_delta;

pub const DEFAULT_RATE_WINDOW_SECS: i64 = 60;

/// Pieces per minute derived from the oldest and newest sample inside a
/// sliding time window. Deltas are rollover-aware.
#[derive(Debug, Clone)]
pub struct RateWindow {
    window: Duration,
    samples: VecDeque<(DateTime<Utc>, u64)>,
}

impl RateWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    /// Add a sample and return the rate over the window, 0 with fewer
    /// than two samples.
    pub fn push(&mut self, timestamp: DateTime<Utc>, value: u64) -> f64 {
        self.samples.push_back((timestamp, value));

        let cutoff = timestamp - self.window;
        while self.samples.front().is_some_and(|(ts, _)| *ts <= cutoff) {
            self.samples.pop_front();
        }

        self.rate()
    }

    pub fn rate(&self) -> f64 {
        let (Some((first_ts, _)), Some((last_ts, _))) = (self.samples.front(), self.samples.back())
        else {
            return 0.0;
        };

        let elapsed_ms = (*last_ts - *first_ts).num_milliseconds();
        if elapsed_ms <= 0 {
            return 0.0;
        }

        let count: u64 = self
            .samples
            .iter()
            .zip(self.samples.iter().skip(1))
            .map(|((_, a), (_, b))| counter_delta(*a, *b))
            .sum();

        count as f64 / (elapsed_ms as f64 / 60_000.0)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Default for RateWindow {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_RATE_WINDOW_SECS))
    }
}
