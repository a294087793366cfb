//! Detection outcomes

use serde::Serialize;

use super::model::EquipmentStoppage;

/// Result of checking whether a new stoppage may be opened on a line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StoppageCreationDecision {
    CreateStoppage,
    UseExisting {
        existing: EquipmentStoppage,
        reason: String,
    },
    NoAction {
        reason: String,
    },
}

impl StoppageCreationDecision {
    pub fn should_create(&self) -> bool {
        matches!(self, Self::CreateStoppage)
    }
}

/// What a single monitoring check did for one line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LineCheckOutcome {
    /// Producing, no open stoppage
    Running,
    /// Idle, but not long enough to open a stoppage
    BelowThreshold { idle_minutes: i64 },
    /// No producing sample inside the activity lookback
    NoActivityData,
    StoppageCreated(EquipmentStoppage),
    StoppageContinuing(EquipmentStoppage),
    StoppageEnded(EquipmentStoppage),
}

impl LineCheckOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::BelowThreshold { .. } => "below_threshold",
            Self::NoActivityData => "no_activity_data",
            Self::StoppageCreated(_) => "stoppage_created",
            Self::StoppageContinuing(_) => "stoppage_continuing",
            Self::StoppageEnded(_) => "stoppage_ended",
        }
    }
}

/// Totals for one pass over every monitored line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitoringSummary {
    pub lines_checked: usize,
    pub stoppages_created: usize,
    pub stoppages_ended: usize,
    pub failures: usize,
}

impl MonitoringSummary {
    pub fn record(&mut self, outcome: &LineCheckOutcome) {
        self.lines_checked += 1;
        match outcome {
            LineCheckOutcome::StoppageCreated(_) => self.stoppages_created += 1,
            LineCheckOutcome::StoppageEnded(_) => self.stoppages_ended += 1,
            _ => {}
        }
    }

    pub fn record_failure(&mut self) {
        self.lines_checked += 1;
        self.failures += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn summary_counts_outcomes() {
        let stoppage = EquipmentStoppage::detected("L1", None, Utc::now(), 5);
        let mut summary = MonitoringSummary::default();
        summary.record(&LineCheckOutcome::Running);
        summary.record(&LineCheckOutcome::StoppageCreated(stoppage.clone()));
        summary.record(&LineCheckOutcome::StoppageContinuing(stoppage));
        summary.record_failure();

        assert_eq!(
            summary,
            MonitoringSummary {
                lines_checked: 4,
                stoppages_created: 1,
                stoppages_ended: 0,
                failures: 1,
            }
        );
    }
}
