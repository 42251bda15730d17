use chrono::{DateTime, Duration, Timelike, Utc};
use chrono_tz::Tz;
use itertools::Itertools;

use crate::domain::Sample;

/// Expected household load for a future hour.
///
/// The aligner only depends on this trait, so a better predictor can replace
/// the hour-of-day average without touching the solver.
pub trait ConsumptionModel: Send + Sync {
    fn expected_kwh(&self, slot_start: DateTime<Utc>) -> f64;
}

/// Mean of all historical samples per local hour-of-day.
#[derive(Debug, Clone, PartialEq)]
pub struct HourOfDayAverage {
    tz: Tz,
    averages: [Option<f64>; 24],
}

impl HourOfDayAverage {
    /// Average the samples in `[now - history_days, now)`.
    pub fn from_history(history: &[Sample], now: DateTime<Utc>, history_days: u32, tz: Tz) -> Self {
        let cutoff = now - Duration::days(i64::from(history_days));
        let buckets = history
            .iter()
            .filter(|s| s.timestamp >= cutoff && s.timestamp < now && s.value.is_finite())
            .map(|s| (s.timestamp.with_timezone(&tz).hour() as usize, s.value))
            .into_group_map();

        let mut averages = [None; 24];
        for (hour, values) in buckets {
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            averages[hour] = Some(mean.max(0.0));
        }
        Self { tz, averages }
    }

    pub fn average(&self, hour: u32) -> Option<f64> {
        self.averages.get(hour as usize).copied().flatten()
    }

    /// Hours of the day without any history.
    pub fn missing_hours(&self) -> Vec<u32> {
        (0..24).filter(|h| self.averages[*h as usize].is_none()).collect()
    }
}

impl ConsumptionModel for HourOfDayAverage {
    fn expected_kwh(&self, slot_start: DateTime<Utc>) -> f64 {
        // No history for this hour: treated as zero load.
        self.average(slot_start.with_timezone(&self.tz).hour()).unwrap_or(0.0)
    }
}
