//! Performance: actual output against the target rate

use crate::domain::oee::Performance;

pub struct PerformanceCalculator;

impl PerformanceCalculator {
    /// Uncapped. A zero target or zero runtime gives 0.
    pub fn calculate(
        actual_output: u64,
        target_rate_per_minute: f64,
        runtime_minutes: f64,
    ) -> Performance {
        let theoretical_output = (target_rate_per_minute * runtime_minutes).max(0.0);
        let percentage = if theoretical_output > 0.0 {
            actual_output as f64 / theoretical_output * 100.0
        } else {
            0.0
        };

        Performance {
            percentage,
            actual_output,
            theoretical_output,
            target_rate_per_minute,
            runtime_minutes,
        }
    }

    /// Data-quality findings with a matching recommendation each.
    pub fn findings(performance: &Performance) -> Vec<(String, String)> {
        let mut findings = Vec::new();

        if performance.target_rate_per_minute <= 0.0 {
            findings.push((
                "Target rate is not configured, performance reported as 0%".to_string(),
                "Set target_rate_per_minute for this line or work order".to_string(),
            ));
        } else if performance.runtime_minutes <= 0.0 {
            findings.push((
                "No runtime in window, performance reported as 0%".to_string(),
                "Check downtime records for this window".to_string(),
            ));
        }

        if performance.exceeds_target() {
            findings.push((
                format!(
                    "Performance {:.1}% exceeds target: {} pieces against {:.0} expected",
                    performance.percentage,
                    performance.actual_output,
                    performance.theoretical_output
                ),
                format!(
                    "Review the target rate of {:.2} pieces/min, it is likely set too low",
                    performance.target_rate_per_minute
                ),
            ));
        }

        findings
    }
}
