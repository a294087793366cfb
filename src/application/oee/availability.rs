//! Availability: actual runtime against planned runtime

use chrono::{DateTime, Utc};

use crate::domain::counter::DowntimePeriod;
use crate::domain::oee::Availability;
use crate::domain::stoppage::EquipmentStoppage;

pub type Interval = (DateTime<Utc>, DateTime<Utc>);

pub struct AvailabilityCalculator;

impl AvailabilityCalculator {
    /// Planned runtime is the whole window; downtime intervals must already
    /// be clipped to it. Overlapping intervals are counted once.
    pub fn calculate(
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        downtime: Vec<Interval>,
    ) -> Availability {
        let planned = minutes_between(window_start, window_end).max(0.0);
        let downtime_minutes = merge_intervals(downtime)
            .into_iter()
            .map(|(start, end)| minutes_between(start, end))
            .sum::<f64>()
            .min(planned);
        let actual = (planned - downtime_minutes).max(0.0);

        let percentage = if planned > 0.0 {
            (actual / planned * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        Availability {
            percentage,
            actual_runtime_minutes: actual,
            planned_runtime_minutes: planned,
            downtime_minutes,
        }
    }

    /// Closed counter gaps and closed stoppages, clipped to the window.
    /// Ongoing periods are left out until they end.
    pub fn downtime_intervals(
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        periods: &[DowntimePeriod],
        stoppages: &[EquipmentStoppage],
    ) -> Vec<Interval> {
        let from_periods = periods
            .iter()
            .filter_map(|p| p.clipped_to(window_start, window_end));

        let from_stoppages = stoppages.iter().filter_map(|s| {
            let end = s.end_time?.min(window_end);
            let start = s.start_time.max(window_start);
            (end > start).then_some((start, end))
        });

        from_periods.chain(from_stoppages).collect()
    }
}

/// Sort and coalesce overlapping or touching intervals.
pub fn merge_intervals(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.retain(|(start, end)| end > start);
    intervals.sort_by_key(|(start, _)| *start);

    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for (start, end) in intervals {
        match merged.last_mut() {
            Some((_, last_end)) if start <= *last_end => {
                if end > *last_end {
                    *last_end = end;
                }
            }
            _ => merged.push((start, end)),
        }
    }
    merged
}

pub(crate) fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 60_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn no_downtime_is_full_availability() {
        let a = AvailabilityCalculator::calculate(at(8, 0), at(9, 0), vec![]);
        assert_eq!(a.percentage, 100.0);
        assert_eq!(a.planned_runtime_minutes, 60.0);
        assert_eq!(a.actual_runtime_minutes, 60.0);
    }

    #[test]
    fn downtime_reduces_availability() {
        let a = AvailabilityCalculator::calculate(
            at(8, 0),
            at(9, 0),
            vec![(at(8, 10), at(8, 22))],
        );
        assert_eq!(a.downtime_minutes, 12.0);
        assert!((a.percentage - 80.0).abs() < 1e-9);
    }

    #[test]
    fn overlapping_downtime_counted_once() {
        let merged = merge_intervals(vec![
            (at(8, 30), at(8, 40)),
            (at(8, 10), at(8, 20)),
            (at(8, 15), at(8, 25)),
            (at(8, 25), at(8, 27)),
        ]);
        assert_eq!(merged, vec![(at(8, 10), at(8, 27)), (at(8, 30), at(8, 40))]);

        let a = AvailabilityCalculator::calculate(
            at(8, 0),
            at(9, 0),
            vec![(at(8, 10), at(8, 20)), (at(8, 15), at(8, 25))],
        );
        assert_eq!(a.downtime_minutes, 15.0);
    }

    #[test]
    fn partial_overlaps_are_clipped() {
        let periods = vec![
            DowntimePeriod::closed(at(7, 50), at(8, 10)).unwrap(),
            DowntimePeriod::ongoing(at(8, 50), at(9, 0)),
        ];
        let mut stoppage = EquipmentStoppage::detected("L1", None, at(8, 55), 5);
        stoppage.close(at(9, 30)).unwrap();
        let open = EquipmentStoppage::detected("L1", None, at(8, 30), 5);

        let intervals = AvailabilityCalculator::downtime_intervals(
            at(8, 0),
            at(9, 0),
            &periods,
            &[stoppage, open],
        );
        assert_eq!(intervals, vec![(at(8, 0), at(8, 10)), (at(8, 55), at(9, 0))]);

        let a = AvailabilityCalculator::calculate(at(8, 0), at(9, 0), intervals);
        assert_eq!(a.downtime_minutes, 15.0);
        assert!((a.percentage - 75.0).abs() < 1e-9);
    }

    #[test]
    fn availability_is_bounded() {
        let a = AvailabilityCalculator::calculate(
            at(8, 0),
            at(9, 0),
            vec![(at(7, 0), at(10, 0))],
        );
        assert_eq!(a.percentage, 0.0);
        assert_eq!(a.actual_runtime_minutes, 0.0);

        let empty = AvailabilityCalculator::calculate(at(8, 0), at(8, 0), vec![]);
        assert_eq!(empty.percentage, 0.0);
    }
}
