//! Counter telemetry value objects

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::errors::{DomainError, DomainResult};

/// Hardware counters are 32-bit registers (two 16-bit Modbus words).
pub const COUNTER_MODULUS: u64 = 1 << 32;

/// Values above this are close enough to the register limit that a
/// decrease means the counter rolled over rather than being reset.
pub const OVERFLOW_THRESHOLD: u64 = COUNTER_MODULUS - 1_000_000;

/// Quality flag attached to a reading by the acquisition layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadingQuality {
    Good,
    Uncertain,
    Bad,
}

impl ReadingQuality {
    pub fn is_good(&self) -> bool {
        *self == ReadingQuality::Good
    }
}

/// A single counter sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterReading {
    pub device_id: String,
    pub channel: u8,
    pub timestamp: DateTime<Utc>,
    /// Instantaneous rate in pieces per minute
    pub rate: f64,
    /// Cumulative register value
    pub processed_value: u64,
    pub quality: ReadingQuality,
}

impl CounterReading {
    pub fn new(
        device_id: impl Into<String>,
        channel: u8,
        timestamp: DateTime<Utc>,
        processed_value: u64,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            channel,
            timestamp,
            rate: 0.0,
            processed_value,
            quality: ReadingQuality::Good,
        }
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_quality(mut self, quality: ReadingQuality) -> Self {
        self.quality = quality;
        self
    }
}

/// Pieces counted between two cumulative register values.
///
/// A drop from near the register limit is a rollover; any other drop is
/// a counter reset, in which case everything counted since the reset is
/// the new value itself. A previous value beyond 32 bits cannot have come
/// from the register and is also treated as a reset.
pub fn counter_delta(previous: u64, current: u64) -> u64 {
    if current >= previous {
        return current - previous;
    }
    match COUNTER_MODULUS.checked_sub(previous) {
        Some(remaining) if previous >= OVERFLOW_THRESHOLD => remaining + current,
        _ => current,
    }
}

/// A span of zero production activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DowntimePeriod {
    pub start: DateTime<Utc>,
    /// `None` while the period is still running
    pub end: Option<DateTime<Utc>>,
    /// Closed periods: `end - start`. Ongoing periods: duration as of the query.
    pub duration: Duration,
    pub is_ongoing: bool,
}

impl DowntimePeriod {
    pub fn closed(start: DateTime<Utc>, end: DateTime<Utc>) -> DomainResult<Self> {
        if end <= start {
            return Err(DomainError::Validation(format!(
                "downtime end {} must be after start {}",
                end, start
            )));
        }
        Ok(Self {
            start,
            end: Some(end),
            duration: end - start,
            is_ongoing: false,
        })
    }

    pub fn ongoing(start: DateTime<Utc>, as_of: DateTime<Utc>) -> Self {
        Self {
            start,
            end: None,
            duration: (as_of - start).max(Duration::zero()),
            is_ongoing: true,
        }
    }

    pub fn duration_minutes(&self) -> f64 {
        self.duration.num_milliseconds() as f64 / 60_000.0
    }

    /// Portion of a closed period that falls inside `[window_start, window_end)`.
    pub fn clipped_to(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let end = self.end?;
        let start = self.start.max(window_start);
        let end = end.min(window_end);
        (end > start).then_some((start, end))
    }
}

/// Aggregate over one channel and time range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedCounterData {
    pub device_id: String,
    pub channel: u8,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Pieces counted in the window (rollover-aware)
    pub total_count: u64,
    pub average_rate: f64,
    pub max_rate: f64,
    pub sample_count: usize,
}

impl AggregatedCounterData {
    pub fn empty(
        device_id: impl Into<String>,
        channel: u8,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            channel,
            window_start,
            window_end,
            total_count: 0,
            average_rate: 0.0,
            max_rate: 0.0,
            sample_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, minute, 0).unwrap()
    }

    #[test]
    fn delta_handles_normal_increase() {
        assert_eq!(counter_delta(100, 150), 50);
        assert_eq!(counter_delta(150, 150), 0);
    }

    #[test]
    fn delta_handles_rollover() {
        let previous = COUNTER_MODULUS - 10;
        assert_eq!(counter_delta(previous, 5), 15);
    }

    #[test]
    fn delta_treats_low_drop_as_reset() {
        assert_eq!(counter_delta(5_000, 20), 20);
    }

    #[test]
    fn delta_treats_out_of_range_previous_as_reset() {
        assert_eq!(counter_delta(5_000_000_000, 10), 10);
        assert_eq!(counter_delta(COUNTER_MODULUS, 7), 7);
        assert_eq!(counter_delta(u64::MAX, 0), 0);
    }

    #[test]
    fn closed_period_requires_end_after_start() {
        assert!(DowntimePeriod::closed(at(10), at(10)).is_err());
        assert!(DowntimePeriod::closed(at(10), at(5)).is_err());

        let period = DowntimePeriod::closed(at(5), at(15)).unwrap();
        assert!(!period.is_ongoing);
        assert_eq!(period.duration_minutes(), 10.0);
    }

    #[test]
    fn ongoing_period_has_no_end() {
        let period = DowntimePeriod::ongoing(at(5), at(20));
        assert!(period.is_ongoing);
        assert!(period.end.is_none());
        assert_eq!(period.duration_minutes(), 15.0);
        assert!(period.clipped_to(at(0), at(30)).is_none());
    }

    #[test]
    fn clipping_trims_to_window() {
        let period = DowntimePeriod::closed(at(5), at(25)).unwrap();
        assert_eq!(period.clipped_to(at(10), at(20)), Some((at(10), at(20))));
        assert_eq!(period.clipped_to(at(0), at(10)), Some((at(5), at(10))));
        assert_eq!(period.clipped_to(at(30), at(40)), None);
    }
}
