use chrono::{DateTime, Duration, Timelike, Utc};
use chrono_tz::Tz;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, PlannerResult};

/// One hour of the planning horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourlySlot {
    /// 0 is the current hour.
    pub index: usize,
    /// Wall-clock start of the hour.
    pub timestamp: DateTime<Utc>,
    pub consumption_kwh: f64,
    pub solar_kwh: f64,
    /// May be negative.
    pub price_import_ct_per_kwh: f64,
    /// Static feed-in tariff.
    pub price_export_ct_per_kwh: f64,
}

/// Contiguous, gap-free sequence of hourly slots actually optimized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Horizon {
    slots: Vec<HourlySlot>,
}

impl Horizon {
    /// Build a horizon, checking that slots are indexed from 0 and exactly
    /// one hour apart, and that forecast quantities are usable.
    pub fn new(slots: Vec<HourlySlot>) -> PlannerResult<Self> {
        for (i, slot) in slots.iter().enumerate() {
            if slot.index != i {
                return Err(PlannerError::InsufficientForecastData(format!(
                    "slot {} carries index {}",
                    i, slot.index
                )));
            }
            if i > 0 && slot.timestamp - slots[i - 1].timestamp != Duration::hours(1) {
                return Err(PlannerError::InsufficientForecastData(format!(
                    "slot {} at {} does not follow {} by one hour",
                    i,
                    slot.timestamp,
                    slots[i - 1].timestamp
                )));
            }
            let quantities = [
                slot.consumption_kwh,
                slot.solar_kwh,
                slot.price_import_ct_per_kwh,
                slot.price_export_ct_per_kwh,
            ];
            if quantities.iter().any(|v| !v.is_finite())
                || slot.consumption_kwh < 0.0
                || slot.solar_kwh < 0.0
            {
                return Err(PlannerError::InsufficientForecastData(format!(
                    "slot {} has unusable values: {:?}",
                    i, slot
                )));
            }
        }
        Ok(Self { slots })
    }

    pub fn slots(&self) -> &[HourlySlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.slots.first().map(|s| s.timestamp)
    }

    pub fn min_import_price(&self) -> Option<f64> {
        self.slots
            .iter()
            .map(|s| OrderedFloat(s.price_import_ct_per_kwh))
            .min()
            .map(|p| p.into_inner())
    }
}

/// Start of the local wall-clock hour containing `ts`.
///
/// Steps back by the local minutes and seconds under the offset in effect at
/// `ts`, so a repeated fall-back hour resolves to the occurrence `ts` is in.
pub fn hour_start(ts: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let local = ts.with_timezone(&tz);
    ts - Duration::minutes(i64::from(local.minute()))
        - Duration::seconds(i64::from(local.second()))
        - Duration::nanoseconds(i64::from(local.nanosecond()))
}
