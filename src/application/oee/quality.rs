//! Quality: good pieces among all pieces

use crate::domain::oee::Quality;

pub struct QualityCalculator;

impl QualityCalculator {
    /// Nothing produced counts as no quality loss.
    pub fn calculate(good_count: u64, scrap_count: u64) -> Quality {
        let total = good_count.saturating_add(scrap_count);
        let percentage = if total == 0 {
            100.0
        } else {
            good_count as f64 / total as f64 * 100.0
        };

        Quality {
            percentage,
            good_count,
            scrap_count,
        }
    }

    /// Quality from the production total and the reject count.
    pub fn from_output(total_output: u64, scrap_count: u64) -> Quality {
        Self::calculate(total_output.saturating_sub(scrap_count), scrap_count)
    }
}
