//! Equipment stoppage domain entity

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::errors::{DomainError, DomainResult};

/// Reason code assigned by an operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoppageClassification {
    pub category: String,
    pub subcode: Option<String>,
}

/// Detection state of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoppageState {
    /// No open stoppage
    Running,
    /// Open stoppage, still below the classification threshold
    Stopped,
    /// Open stoppage long enough that an operator must assign a reason
    RequiresClassification,
}

/// Urgency attached to stoppage notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StoppageUrgency {
    Low,
    Medium,
    High,
    Critical,
}

impl StoppageUrgency {
    pub fn for_duration(duration_minutes: i64, requires_classification: bool) -> Self {
        if duration_minutes >= 30 {
            Self::Critical
        } else if duration_minutes >= 15 {
            Self::High
        } else if requires_classification {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// A detected or recorded period without production on a line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentStoppage {
    pub id: Uuid,
    pub line_id: String,
    pub work_order_id: Option<String>,
    pub start_time: DateTime<Utc>,
    /// `None` while the stoppage is open
    pub end_time: Option<DateTime<Utc>>,
    pub classification: Option<StoppageClassification>,
    pub auto_detected: bool,
    /// Detection threshold in force when the stoppage was opened
    pub minimum_threshold_minutes: u32,
    pub created_at: DateTime<Utc>,
}

impl EquipmentStoppage {
    /// Open a stoppage found by the detector.
    pub fn detected(
        line_id: impl Into<String>,
        work_order_id: Option<String>,
        start_time: DateTime<Utc>,
        minimum_threshold_minutes: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            line_id: line_id.into(),
            work_order_id,
            start_time,
            end_time: None,
            classification: None,
            auto_detected: true,
            minimum_threshold_minutes,
            created_at: Utc::now(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    pub fn is_classified(&self) -> bool {
        self.classification.is_some()
    }

    /// Elapsed time, measured to `now` while open.
    pub fn duration(&self, now: DateTime<Utc>) -> Duration {
        let end = self.end_time.unwrap_or(now);
        (end - self.start_time).max(Duration::zero())
    }

    pub fn duration_minutes(&self, now: DateTime<Utc>) -> i64 {
        self.duration(now).num_minutes()
    }

    pub fn requires_classification(&self, now: DateTime<Utc>, threshold_minutes: u32) -> bool {
        self.is_open()
            && !self.is_classified()
            && self.duration_minutes(now) >= i64::from(threshold_minutes)
    }

    /// Line state implied by this stoppage. A classified stoppage stays
    /// `Stopped` however long it runs.
    pub fn state(
        &self,
        now: DateTime<Utc>,
        classification_threshold_minutes: u32,
    ) -> StoppageState {
        if !self.is_open() {
            StoppageState::Running
        } else if self.requires_classification(now, classification_threshold_minutes) {
            StoppageState::RequiresClassification
        } else {
            StoppageState::Stopped
        }
    }

    /// Close the stoppage. The end must be strictly after the start.
    pub fn close(&mut self, end_time: DateTime<Utc>) -> DomainResult<()> {
        if !self.is_open() {
            return Err(DomainError::Conflict(format!(
                "stoppage {} is already closed",
                self.id
            )));
        }
        if end_time <= self.start_time {
            return Err(DomainError::Validation(format!(
                "stoppage {} end {} must be after start {}",
                self.id, end_time, self.start_time
            )));
        }
        self.end_time = Some(end_time);
        Ok(())
    }

    pub fn classify(&mut self, category: impl Into<String>, subcode: Option<String>) {
        self.classification = Some(StoppageClassification {
            category: category.into(),
            subcode,
        });
    }

    /// Overlap with `[start, end)`, open stoppages clipped at `end`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        let stop_end = self.end_time.unwrap_or(end);
        self.start_time < end && stop_end > start
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn open_stoppage(minutes_ago: i64) -> (EquipmentStoppage, DateTime<Utc>) {
        let now = Utc::now();
        let stoppage =
            EquipmentStoppage::detected("LINE-1", None, now - Duration::minutes(minutes_ago), 5);
        (stoppage, now)
    }

    #[test]
    fn detected_stoppage_is_open_and_auto() {
        let (s, _) = open_stoppage(6);
        assert!(s.is_open());
        assert!(s.auto_detected);
        assert!(s.classification.is_none());
        assert_eq!(s.minimum_threshold_minutes, 5);
    }

    #[test]
    fn close_sets_end_after_start() {
        let (mut s, now) = open_stoppage(10);
        s.close(now).unwrap();
        assert!(!s.is_open());
        assert!(s.end_time.unwrap() > s.start_time);
        assert_eq!(s.duration_minutes(now + Duration::hours(1)), 10);
    }

    #[test]
    fn close_rejects_end_not_after_start() {
        let (mut s, _) = open_stoppage(10);
        let start = s.start_time;
        assert!(matches!(s.close(start), Err(DomainError::Validation(_))));
        assert!(s.is_open());
    }

    #[test]
    fn close_twice_is_conflict() {
        let (mut s, now) = open_stoppage(10);
        s.close(now).unwrap();
        assert!(matches!(s.close(now), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn state_follows_classification_threshold() {
        let (s, now) = open_stoppage(3);
        assert_eq!(s.state(now, 5), StoppageState::Stopped);

        let (s, now) = open_stoppage(7);
        assert_eq!(s.state(now, 5), StoppageState::RequiresClassification);
        assert!(s.requires_classification(now, 5));

        let (mut s, now) = open_stoppage(7);
        s.close(now).unwrap();
        assert_eq!(s.state(now, 5), StoppageState::Running);
    }

    #[test]
    fn classified_stoppage_no_longer_requires_classification() {
        let (mut s, now) = open_stoppage(20);
        s.classify("MECHANICAL", Some("JAM".to_string()));
        assert!(!s.requires_classification(now, 5));
        assert_eq!(s.state(now, 5), StoppageState::Stopped);
    }

    #[test]
    fn urgency_levels() {
        assert_eq!(StoppageUrgency::for_duration(45, false), StoppageUrgency::Critical);
        assert_eq!(StoppageUrgency::for_duration(30, true), StoppageUrgency::Critical);
        assert_eq!(StoppageUrgency::for_duration(15, false), StoppageUrgency::High);
        assert_eq!(StoppageUrgency::for_duration(10, true), StoppageUrgency::Medium);
        assert_eq!(StoppageUrgency::for_duration(10, false), StoppageUrgency::Low);
    }

    #[test]
    fn overlap_checks_window() {
        let (s, now) = open_stoppage(10);
        assert!(s.overlaps(now - Duration::minutes(30), now));
        assert!(!s.overlaps(now - Duration::minutes(60), now - Duration::minutes(20)));
    }
}
