//! Fixed-size windows over a time range

use chrono::{DateTime, Duration, Utc};

use crate::domain::{DomainError, DomainResult};

/// Contiguous, non-overlapping `[start, end)` windows of a fixed length.
/// The last window is shorter when the range is not an exact multiple.
#[derive(Debug, Clone)]
pub struct TrendWindows {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    window_ms: i64,
    next: i64,
    count: i64,
}

impl TrendWindows {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, window: Duration) -> DomainResult<Self> {
        let window_ms = window.num_milliseconds();
        if window_ms <= 0 {
            return Err(DomainError::Validation(format!(
                "trend window must be positive, got {} ms",
                window_ms
            )));
        }
        if end <= start {
            return Err(DomainError::Validation(format!(
                "trend range end {} must be after start {}",
                end, start
            )));
        }

        let total_ms = (end - start).num_milliseconds();
        let count = (total_ms + window_ms - 1) / window_ms;

        Ok(Self {
            start,
            end,
            window_ms,
            next: 0,
            count,
        })
    }
}

impl Iterator for TrendWindows {
    type Item = (DateTime<Utc>, DateTime<Utc>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.count {
            return None;
        }
        let window_start = self.start + Duration::milliseconds(self.window_ms * self.next);
        let window_end = (window_start + Duration::milliseconds(self.window_ms)).min(self.end);
        self.next += 1;
        Some((window_start, window_end))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.count - self.next).max(0) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for TrendWindows {}
