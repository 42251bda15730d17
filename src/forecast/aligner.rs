//! Forecast Aligner
//!
//! Merges the consumption history, the solar forecast and the price forecast
//! into one hourly [`Horizon`] starting at the current wall-clock hour.
//!
//! The horizon is cut at the first hour that either the solar or the price
//! forecast does not cover. Values are never extrapolated: optimizing against
//! a guessed price or solar value is worse than planning a shorter horizon.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::{debug, info};

use super::{ConsumptionModel, HourOfDayAverage};
use crate::domain::{hour_start, ForecastInputs, Horizon, HourlySlot, Sample};
use crate::error::{PlannerError, PlannerResult};

#[derive(Debug, Clone)]
pub struct ForecastAligner {
    pub horizon_hours: usize,
    pub consumption_history_days: u32,
    pub feed_in_tariff_ct_per_kwh: f64,
    pub tz: Tz,
}

impl ForecastAligner {
    pub fn new(
        horizon_hours: usize,
        consumption_history_days: u32,
        feed_in_tariff_ct_per_kwh: f64,
        tz: Tz,
    ) -> Self {
        Self {
            horizon_hours,
            consumption_history_days,
            feed_in_tariff_ct_per_kwh,
            tz,
        }
    }

    /// Align the raw inputs using the hour-of-day consumption average.
    pub fn align(&self, now: DateTime<Utc>, inputs: &ForecastInputs) -> PlannerResult<Horizon> {
        let model = HourOfDayAverage::from_history(
            &inputs.consumption_history,
            now,
            self.consumption_history_days,
            self.tz,
        );
        let missing = model.missing_hours();
        if !missing.is_empty() {
            debug!(?missing, "no consumption history for some hours; assuming zero load");
        }
        self.align_with(now, &model, &inputs.solar, &inputs.price)
    }

    /// Align solar and price with an arbitrary consumption model.
    pub fn align_with(
        &self,
        now: DateTime<Utc>,
        consumption: &dyn ConsumptionModel,
        solar: &[Sample],
        price: &[Sample],
    ) -> PlannerResult<Horizon> {
        let start = hour_start(now, self.tz);
        let solar = StepSeries::new(solar);
        let price = StepSeries::new(price);

        if solar.value_at(start).is_none() {
            return Err(PlannerError::InsufficientForecastData(format!(
                "no solar forecast covers the current hour {start}"
            )));
        }
        if price.value_at(start).is_none() {
            return Err(PlannerError::InsufficientForecastData(format!(
                "no price forecast covers the current hour {start}"
            )));
        }

        let solar_hours = solar.coverage(start, self.horizon_hours);
        let price_hours = price.coverage(start, self.horizon_hours);
        let hours = self.horizon_hours.min(solar_hours).min(price_hours);
        info!(
            %start,
            configured = self.horizon_hours,
            solar_hours,
            price_hours,
            hours,
            "forecast horizon aligned"
        );

        let slots = (0..hours)
            .map(|index| {
                let timestamp = start + Duration::hours(index as i64);
                HourlySlot {
                    index,
                    timestamp,
                    consumption_kwh: consumption.expected_kwh(timestamp).max(0.0),
                    // Covered by construction of `hours`.
                    solar_kwh: solar.value_at(timestamp).unwrap_or(0.0).max(0.0),
                    price_import_ct_per_kwh: price.value_at(timestamp).unwrap_or(0.0),
                    price_export_ct_per_kwh: self.feed_in_tariff_ct_per_kwh,
                }
            })
            .collect();
        Horizon::new(slots)
    }
}

/// Piecewise-constant view of a forecast series. A sample is valid from its
/// timestamp until the next sample, and for at most one hour.
struct StepSeries {
    points: Vec<(DateTime<Utc>, f64)>,
}

impl StepSeries {
    fn new(samples: &[Sample]) -> Self {
        let mut sorted: Vec<&Sample> = samples.iter().collect();
        sorted.sort_by_key(|s| s.timestamp);
        let mut points: Vec<(DateTime<Utc>, f64)> = Vec::with_capacity(sorted.len());
        for s in sorted {
            match points.last_mut() {
                // Duplicate timestamps: the later sample wins.
                Some(last) if last.0 == s.timestamp => last.1 = s.value,
                _ => points.push((s.timestamp, s.value)),
            }
        }
        Self { points }
    }

    fn value_at(&self, t: DateTime<Utc>) -> Option<f64> {
        let idx = self.points.partition_point(|(ts, _)| *ts <= t);
        if idx == 0 {
            return None;
        }
        let (start, value) = self.points[idx - 1];
        let max_end = start + Duration::hours(1);
        let end = self
            .points
            .get(idx)
            .map_or(max_end, |(next, _)| (*next).min(max_end));
        (t < end && value.is_finite()).then_some(value)
    }

    fn coverage(&self, start: DateTime<Utc>, max_hours: usize) -> usize {
        (0..max_hours)
            .take_while(|k| self.value_at(start + Duration::hours(*k as i64)).is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
    }

    fn hourly(from: DateTime<Utc>, values: &[f64]) -> Vec<Sample> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Sample::new(from + Duration::hours(i as i64), *v))
            .collect()
    }

    fn aligner(hours: usize) -> ForecastAligner {
        ForecastAligner::new(hours, 7, 7.0, Tz::UTC)
    }

    #[test]
    fn test_truncates_to_shortest_source() {
        let inputs = ForecastInputs {
            consumption_history: vec![],
            solar: hourly(t0(), &[1.0; 10]),
            price: hourly(t0(), &[25.0; 30]),
        };
        let horizon = aligner(48).align(t0(), &inputs).unwrap();
        assert_eq!(horizon.len(), 10);
    }

    #[test]
    fn test_configured_horizon_caps_length() {
        let inputs = ForecastInputs {
            consumption_history: vec![],
            solar: hourly(t0(), &[1.0; 30]),
            price: hourly(t0(), &[25.0; 30]),
        };
        assert_eq!(aligner(12).align(t0(), &inputs).unwrap().len(), 12);
    }

    #[test]
    fn test_gap_truncates_instead_of_skipping() {
        let mut price = hourly(t0(), &[25.0; 5]);
        price.extend(hourly(t0() + Duration::hours(6), &[25.0; 10]));
        let inputs = ForecastInputs {
            consumption_history: vec![],
            solar: hourly(t0(), &[0.0; 24]),
            price,
        };
        assert_eq!(aligner(48).align(t0(), &inputs).unwrap().len(), 5);
    }

    #[test]
    fn test_missing_current_hour_fails() {
        let inputs = ForecastInputs {
            consumption_history: vec![],
            solar: hourly(t0() + Duration::hours(1), &[1.0; 10]),
            price: hourly(t0(), &[25.0; 10]),
        };
        let err = aligner(48).align(t0(), &inputs).unwrap_err();
        assert!(matches!(err, PlannerError::InsufficientForecastData(_)));

        let inputs = ForecastInputs {
            consumption_history: vec![],
            solar: hourly(t0(), &[1.0; 10]),
            price: vec![],
        };
        let err = aligner(48).align(t0(), &inputs).unwrap_err();
        assert!(matches!(err, PlannerError::InsufficientForecastData(_)));
    }

    #[test]
    fn test_mid_hour_run_starts_at_hour_boundary() {
        let inputs = ForecastInputs {
            consumption_history: vec![],
            solar: hourly(t0(), &[1.0, 2.0, 3.0]),
            price: hourly(t0(), &[10.0, 20.0, 30.0]),
        };
        let now = t0() + Duration::minutes(42);
        let horizon = aligner(48).align(now, &inputs).unwrap();
        assert_eq!(horizon.start(), Some(t0()));
        assert_eq!(horizon.slots()[1].solar_kwh, 2.0);
        assert_eq!(horizon.slots()[2].price_import_ct_per_kwh, 30.0);
    }

    #[test]
    fn test_sub_hour_offset_takes_containing_interval() {
        // Price intervals start at :30; the 10:00 slot falls into the 09:30 interval.
        let offset = t0() - Duration::minutes(30);
        let inputs = ForecastInputs {
            consumption_history: vec![],
            solar: hourly(t0(), &[0.0; 4]),
            price: hourly(offset, &[11.0, 22.0, 33.0, 44.0]),
        };
        let horizon = aligner(48).align(t0(), &inputs).unwrap();
        let prices: Vec<f64> = horizon
            .slots()
            .iter()
            .map(|s| s.price_import_ct_per_kwh)
            .collect();
        assert_eq!(prices, vec![11.0, 22.0, 33.0, 44.0]);
    }

    #[test]
    fn test_unsorted_and_duplicate_samples() {
        let mut solar = hourly(t0(), &[1.0, 2.0, 3.0]);
        solar.reverse();
        solar.push(Sample::new(t0() + Duration::hours(1), 2.5));
        let inputs = ForecastInputs {
            consumption_history: vec![],
            solar,
            price: hourly(t0(), &[10.0; 3]),
        };
        let horizon = aligner(48).align(t0(), &inputs).unwrap();
        assert_eq!(horizon.len(), 3);
        assert_eq!(horizon.slots()[1].solar_kwh, 2.5);
    }

    #[test]
    fn test_non_finite_value_breaks_coverage() {
        let inputs = ForecastInputs {
            consumption_history: vec![],
            solar: hourly(t0(), &[1.0, f64::NAN, 1.0]),
            price: hourly(t0(), &[10.0; 3]),
        };
        assert_eq!(aligner(48).align(t0(), &inputs).unwrap().len(), 1);
    }

    #[test]
    fn test_consumption_comes_from_hour_of_day_history() {
        let yesterday = t0() - Duration::days(1);
        let inputs = ForecastInputs {
            consumption_history: vec![
                Sample::new(yesterday, 1.5),
                Sample::new(yesterday - Duration::days(1), 2.5),
            ],
            solar: hourly(t0(), &[0.0; 2]),
            price: hourly(t0(), &[10.0; 2]),
        };
        let horizon = aligner(48).align(t0(), &inputs).unwrap();
        assert_eq!(horizon.slots()[0].consumption_kwh, 2.0);
        // 11:00 has no history.
        assert_eq!(horizon.slots()[1].consumption_kwh, 0.0);
        assert!(horizon.slots().iter().all(|s| s.price_export_ct_per_kwh == 7.0));
    }

    #[test]
    fn test_negative_inputs_are_floored() {
        struct Negative;
        impl ConsumptionModel for Negative {
            fn expected_kwh(&self, _: DateTime<Utc>) -> f64 {
                -0.3
            }
        }
        let horizon = aligner(48)
            .align_with(
                t0(),
                &Negative,
                &hourly(t0(), &[-0.2, 1.0]),
                &hourly(t0(), &[-5.0, 10.0]),
            )
            .unwrap();
        assert_eq!(horizon.slots()[0].solar_kwh, 0.0);
        assert_eq!(horizon.slots()[1].solar_kwh, 1.0);
        assert!(horizon.slots().iter().all(|s| s.consumption_kwh == 0.0));
        // Negative prices are real market prices and pass through.
        assert_eq!(horizon.slots()[0].price_import_ct_per_kwh, -5.0);
    }

    #[test]
    fn test_custom_consumption_model() {
        struct Flat;
        impl ConsumptionModel for Flat {
            fn expected_kwh(&self, _: DateTime<Utc>) -> f64 {
                0.75
            }
        }
        let horizon = aligner(48)
            .align_with(t0(), &Flat, &hourly(t0(), &[0.0; 3]), &hourly(t0(), &[5.0; 3]))
            .unwrap();
        assert!(horizon.slots().iter().all(|s| s.consumption_kwh == 0.75));
    }
}
