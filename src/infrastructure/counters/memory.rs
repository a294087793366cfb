//! In-memory counter store

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::warn;

use super::rate::RateWindow;
use crate::domain::counter::{
    counter_delta, AggregatedCounterData, CounterDataClient, CounterReading, CounterResult,
    DowntimePeriod, ReadingQuality, OVERFLOW_THRESHOLD,
};

/// Time-series counter store held in memory, fed by the simulator or tests.
#[derive(Default)]
pub struct InMemoryCounterStore {
    /// Readings per device, ordered by timestamp
    readings: DashMap<String, Vec<CounterReading>>,
    rate_windows: DashMap<(String, u8), RateWindow>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a reading as given.
    pub fn record(&self, reading: CounterReading) {
        if reading.processed_value > OVERFLOW_THRESHOLD {
            warn!(
                device_id = %reading.device_id,
                channel = reading.channel,
                value = reading.processed_value,
                "Counter approaching overflow"
            );
        }

        let mut readings = self.readings.entry(reading.device_id.clone()).or_default();
        let at = readings.partition_point(|r| r.timestamp <= reading.timestamp);
        readings.insert(at, reading);
    }

    /// Store a raw register value, deriving its rate from the sliding window.
    pub fn ingest(&self, device_id: &str, channel: u8, timestamp: DateTime<Utc>, value: u64) {
        let rate = self
            .rate_windows
            .entry((device_id.to_string(), channel))
            .or_default()
            .push(timestamp, value);
        self.record(CounterReading::new(device_id, channel, timestamp, value).with_rate(rate));
    }

    pub fn reading_count(&self, device_id: &str) -> usize {
        self.readings.get(device_id).map_or(0, |r| r.len())
    }

    /// Usable samples of one channel, oldest first.
    fn channel_samples(&self, device_id: &str, channel: u8) -> Vec<CounterReading> {
        self.readings
            .get(device_id)
            .map(|readings| {
                readings
                    .iter()
                    .filter(|r| r.channel == channel && r.quality != ReadingQuality::Bad)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Samples inside `[start, end)` plus the newest sample before `start`,
    /// which anchors the first interval of the window.
    fn window_samples(
        samples: &[CounterReading],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> (Option<&CounterReading>, &[CounterReading]) {
        let first = samples.partition_point(|r| r.timestamp < start);
        let last = samples.partition_point(|r| r.timestamp < end).max(first);
        let baseline = first.checked_sub(1).and_then(|i| samples.get(i));
        (baseline, samples.get(first..last).unwrap_or(&[]))
    }

    fn total_count(samples: &[CounterReading]) -> u64 {
        samples
            .windows(2)
            .map(|pair| counter_delta(pair[0].processed_value, pair[1].processed_value))
            .sum()
    }

    /// Pieces counted by every interval ending inside the window, including
    /// the one that starts at the baseline.
    fn window_count(baseline: Option<&CounterReading>, samples: &[CounterReading]) -> u64 {
        let edge = match (baseline, samples.first()) {
            (Some(before), Some(first)) => {
                counter_delta(before.processed_value, first.processed_value)
            }
            _ => 0,
        };
        edge + Self::total_count(samples)
    }

    /// Timestamps of samples whose count moved since the previous sample.
    fn producing_timestamps(samples: &[CounterReading]) -> Vec<DateTime<Utc>> {
        samples
            .windows(2)
            .filter(|pair| counter_delta(pair[0].processed_value, pair[1].processed_value) > 0)
            .map(|pair| pair[1].timestamp)
            .collect()
    }
}

#[async_trait]
impl CounterDataClient for InMemoryCounterStore {
    async fn get_data_for_period(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CounterResult<Vec<CounterReading>> {
        Ok(self
            .readings
            .get(device_id)
            .map(|readings| {
                readings
                    .iter()
                    .filter(|r| r.timestamp >= start && r.timestamp < end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Measured from the newest sample at or before the lookback start, so
    /// sparse logging still yields a rate.
    async fn get_current_rate(
        &self,
        device_id: &str,
        channel: u8,
        lookback_minutes: u32,
    ) -> CounterResult<f64> {
        let now = Utc::now();
        let since = now - Duration::minutes(i64::from(lookback_minutes));
        let samples: Vec<_> = self
            .channel_samples(device_id, channel)
            .into_iter()
            .filter(|r| r.timestamp <= now)
            .collect();

        let first = samples
            .iter()
            .rposition(|r| r.timestamp <= since)
            .unwrap_or(0);
        let relevant = match samples.get(first..) {
            Some(relevant) if relevant.len() >= 2 => relevant,
            _ => return Ok(0.0),
        };

        let elapsed_ms = (relevant[relevant.len() - 1].timestamp - relevant[0].timestamp)
            .num_milliseconds();
        if elapsed_ms <= 0 {
            return Ok(0.0);
        }

        Ok(Self::total_count(relevant) as f64 / (elapsed_ms as f64 / 60_000.0))
    }

    async fn has_production_activity(
        &self,
        device_id: &str,
        channel: u8,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CounterResult<bool> {
        let samples = self.channel_samples(device_id, channel);
        let (baseline, window) = Self::window_samples(&samples, start, end);
        Ok(Self::window_count(baseline, window) > 0)
    }

    /// Gaps between producing samples overlapping `[start, end)`. A gap
    /// still running now is reported as ongoing.
    async fn get_downtime_periods(
        &self,
        device_id: &str,
        channel: u8,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        min_gap_minutes: u32,
    ) -> CounterResult<Vec<DowntimePeriod>> {
        let min_gap = Duration::minutes(i64::from(min_gap_minutes));
        let producing = Self::producing_timestamps(&self.channel_samples(device_id, channel));

        let mut periods: Vec<DowntimePeriod> = producing
            .windows(2)
            .filter(|pair| pair[1] - pair[0] >= min_gap && pair[0] < end && pair[1] > start)
            .filter_map(|pair| DowntimePeriod::closed(pair[0], pair[1]).ok())
            .collect();

        let now = Utc::now();
        if let Some(&last) = producing.last() {
            if now - last >= min_gap && last < end {
                periods.push(DowntimePeriod::ongoing(last, now));
            }
        }

        Ok(periods)
    }

    async fn get_aggregated_data(
        &self,
        device_id: &str,
        channel: u8,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CounterResult<AggregatedCounterData> {
        let samples = self.channel_samples(device_id, channel);
        let (baseline, window) = Self::window_samples(&samples, start, end);
        if window.is_empty() {
            return Ok(AggregatedCounterData::empty(device_id, channel, start, end));
        }

        let rates = window.iter().map(|r| r.rate);
        let max_rate = rates.clone().fold(0.0, f64::max);
        let average_rate = rates.sum::<f64>() / window.len() as f64;

        Ok(AggregatedCounterData {
            device_id: device_id.to_string(),
            channel,
            window_start: start,
            window_end: end,
            total_count: Self::window_count(baseline, window),
            average_rate,
            max_rate,
            sample_count: window.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::counter::COUNTER_MODULUS;
    use chrono::TimeZone;

    const DEVICE: &str = "ADAM-01";

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn store_with(values: &[(i64, u64)]) -> InMemoryCounterStore {
        let store = InMemoryCounterStore::new();
        for (minute, value) in values {
            store.ingest(DEVICE, 0, at(*minute), *value);
        }
        store
    }

    #[tokio::test]
    async fn period_query_is_half_open_and_ordered() {
        let store = store_with(&[(2, 20), (0, 0), (1, 10), (3, 30)]);
        let data = store.get_data_for_period(DEVICE, at(0), at(3)).await.unwrap();
        let minutes: Vec<_> = data.iter().map(|r| r.timestamp).collect();
        assert_eq!(minutes, vec![at(0), at(1), at(2)]);
        assert!(store
            .get_data_for_period("unknown", at(0), at(3))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn aggregate_counts_across_rollover() {
        let store = store_with(&[
            (0, COUNTER_MODULUS - 20),
            (1, COUNTER_MODULUS - 10),
            (2, 10),
            (3, 30),
        ]);
        let aggregate = store
            .get_aggregated_data(DEVICE, 0, at(0), at(10))
            .await
            .unwrap();
        assert_eq!(aggregate.total_count, 50);
        assert_eq!(aggregate.sample_count, 4);
        assert!(aggregate.max_rate > 0.0);
    }

    #[tokio::test]
    async fn empty_aggregate_for_missing_channel() {
        let store = store_with(&[(0, 0), (1, 10)]);
        let aggregate = store
            .get_aggregated_data(DEVICE, 1, at(0), at(10))
            .await
            .unwrap();
        assert_eq!(aggregate.total_count, 0);
        assert_eq!(aggregate.sample_count, 0);
    }

    #[tokio::test]
    async fn bad_samples_are_ignored() {
        let store = store_with(&[(0, 0), (2, 20)]);
        store.record(
            CounterReading::new(DEVICE, 0, at(1), 999_999).with_quality(ReadingQuality::Bad),
        );
        let aggregate = store
            .get_aggregated_data(DEVICE, 0, at(0), at(10))
            .await
            .unwrap();
        assert_eq!(aggregate.total_count, 20);
    }

    #[tokio::test]
    async fn activity_requires_a_positive_delta() {
        let store = store_with(&[(0, 50), (1, 50), (2, 50), (3, 60)]);
        assert!(!store
            .has_production_activity(DEVICE, 0, at(0), at(3))
            .await
            .unwrap());
        assert!(store
            .has_production_activity(DEVICE, 0, at(0), at(4))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn window_edge_interval_is_counted_once() {
        let store = store_with(&[(0, 0), (1, 30), (2, 60), (3, 90), (4, 120)]);

        let whole = store
            .get_aggregated_data(DEVICE, 0, at(1), at(5))
            .await
            .unwrap();
        assert_eq!(whole.total_count, 120);
        assert_eq!(whole.sample_count, 4);

        let mut split = 0;
        for (from, to) in [(1, 3), (3, 5)] {
            split += store
                .get_aggregated_data(DEVICE, 0, at(from), at(to))
                .await
                .unwrap()
                .total_count;
        }
        assert_eq!(split, whole.total_count);
    }

    #[tokio::test]
    async fn activity_seen_from_single_sample_after_baseline() {
        let store = store_with(&[(0, 50), (1, 50), (2, 50), (3, 60)]);
        assert!(store
            .has_production_activity(DEVICE, 0, at(3), at(4))
            .await
            .unwrap());
        assert!(!store
            .has_production_activity(DEVICE, 0, at(1), at(3))
            .await
            .unwrap());
        assert!(!store
            .has_production_activity(DEVICE, 0, at(5), at(9))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn downtime_gaps_between_producing_samples() {
        let store = store_with(&[
            (0, 0),
            (1, 10),
            (2, 20),
            (5, 20),
            (9, 20),
            (10, 30),
            (11, 40),
        ]);

        let periods = store
            .get_downtime_periods(DEVICE, 0, at(0), at(11), 5)
            .await
            .unwrap();
        let closed: Vec<_> = periods.iter().filter(|p| !p.is_ongoing).collect();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].start, at(2));
        assert_eq!(closed[0].end, Some(at(10)));

        // Historical data: the device has been silent since minute 11.
        let ongoing: Vec<_> = store
            .get_downtime_periods(DEVICE, 0, at(0), at(20), 5)
            .await
            .unwrap()
            .into_iter()
            .filter(|p| p.is_ongoing)
            .collect();
        assert_eq!(ongoing.len(), 1);
        assert_eq!(ongoing[0].start, at(11));

        let short = store
            .get_downtime_periods(DEVICE, 0, at(0), at(11), 10)
            .await
            .unwrap();
        assert!(short.iter().all(|p| p.is_ongoing));
    }

    #[tokio::test]
    async fn current_rate_uses_baseline_before_lookback() {
        let store = InMemoryCounterStore::new();
        let now = Utc::now();
        store.ingest(DEVICE, 0, now - Duration::minutes(3), 0);
        store.ingest(DEVICE, 0, now - Duration::minutes(2), 40);
        store.ingest(DEVICE, 0, now - Duration::seconds(30), 100);

        let rate = store.get_current_rate(DEVICE, 0, 1).await.unwrap();
        // From minute -2 to -0.5: 60 pieces in 1.5 minutes.
        assert!((rate - 40.0).abs() < 1e-6);

        let idle = InMemoryCounterStore::new();
        idle.ingest(DEVICE, 0, now - Duration::minutes(3), 70);
        idle.ingest(DEVICE, 0, now - Duration::minutes(1), 70);
        assert_eq!(idle.get_current_rate(DEVICE, 0, 1).await.unwrap(), 0.0);
    }
}
