//! Data sufficiency checks ahead of an OEE calculation

use crate::domain::counter::CounterReading;
use crate::domain::oee::DataValidationResult;

/// Judge whether `readings` can support a calculation on `production_channel`.
pub fn assess(
    readings: &[CounterReading],
    production_channel: u8,
    minimum_data_points: usize,
) -> DataValidationResult {
    let (good, bad) = readings
        .iter()
        .filter(|r| r.channel == production_channel)
        .fold((0usize, 0usize), |(good, bad), r| {
            if r.quality.is_good() {
                (good + 1, bad)
            } else {
                (good, bad + 1)
            }
        });

    let mut issues = Vec::new();
    let mut recommendations = Vec::new();

    if good + bad == 0 {
        issues.push(format!(
            "No counter data for production channel {} in window",
            production_channel
        ));
        recommendations.push(format!(
            "Check device connectivity and that channel {} carries the production counter",
            production_channel
        ));
    } else if good < minimum_data_points {
        issues.push(format!(
            "Only {} good data point(s) in window, at least {} required",
            good, minimum_data_points
        ));
        recommendations.push(
            "Widen the calculation window or shorten the device logging interval".to_string(),
        );
    }

    if bad > 0 {
        issues.push(format!("{} data point(s) flagged uncertain or bad", bad));
        recommendations.push("Inspect the device signal quality and wiring".to_string());
    }

    DataValidationResult {
        is_sufficient: good >= minimum_data_points,
        data_points: good,
        minimum_required: minimum_data_points,
        bad_quality_points: bad,
        issues,
        recommendations,
    }
}
