//! Counter store interface

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::model::{AggregatedCounterData, CounterReading, DowntimePeriod};
use crate::shared::failure::FailureClassification;

/// Counter-store failures are classified at the boundary.
pub type CounterResult<T> = Result<T, FailureClassification>;

/// Read-only access to the time-series counter store.
///
/// Every method is safe to retry; call sites wrap them in the retry
/// executor with the device-I/O policy.
#[async_trait]
pub trait CounterDataClient: Send + Sync {
    /// All channels of `device_id` in `[start, end)`, oldest first.
    async fn get_data_for_period(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CounterResult<Vec<CounterReading>>;

    /// Pieces per minute over the last `lookback_minutes`.
    async fn get_current_rate(
        &self,
        device_id: &str,
        channel: u8,
        lookback_minutes: u32,
    ) -> CounterResult<f64>;

    async fn has_production_activity(
        &self,
        device_id: &str,
        channel: u8,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CounterResult<bool>;

    /// Gaps in production of at least `min_gap_minutes`.
    async fn get_downtime_periods(
        &self,
        device_id: &str,
        channel: u8,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        min_gap_minutes: u32,
    ) -> CounterResult<Vec<DowntimePeriod>>;

    async fn get_aggregated_data(
        &self,
        device_id: &str,
        channel: u8,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CounterResult<AggregatedCounterData>;
}
