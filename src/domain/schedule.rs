use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Energy flows below this threshold are numerical noise, not actions.
pub const ACTION_EPSILON_KWH: f64 = 1e-6;

/// Planned energy flows for one hour. All quantities are kWh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlotPlan {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub consumption_kwh: f64,
    pub solar_kwh: f64,
    pub price_import_ct_per_kwh: f64,
    pub grid_to_load: f64,
    pub grid_to_batt: f64,
    pub solar_to_load: f64,
    pub solar_to_batt: f64,
    pub solar_export: f64,
    pub batt_to_load: f64,
    /// State of charge at the end of the slot.
    pub soc_kwh: f64,
    pub soc_percent: f64,
    pub max_discharge_possible_kwh: f64,
}

impl SlotPlan {
    pub fn grid_import(&self) -> f64 {
        self.grid_to_load + self.grid_to_batt
    }

    pub fn battery_charge(&self) -> f64 {
        self.grid_to_batt + self.solar_to_batt
    }
}

/// What the actuation layer should do during the current hour.
///
/// Both flags can be set together. With negative import prices the cheapest
/// plan may charge from the grid and discharge to the house in the same hour,
/// burning energy as conversion losses. Actuators that drive a single
/// inverter mode have to pick one; see `SwitchState::from_plan`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourDecision {
    pub timestamp: DateTime<Utc>,
    pub charge_from_grid: bool,
    pub grid_charge_rate_kw: f64,
    pub discharge_to_load: bool,
}

/// Output of one optimization run.
///
/// Only slot 0 is acted upon. Later slots are a forecast and are recomputed
/// on the next run, never treated as commitments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulePlan {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub feed_in_tariff_ct_per_kwh: f64,
    pub slots: Vec<SlotPlan>,
    /// Import cost minus export credit over the horizon.
    pub total_cost_ct: f64,
    /// Credit given to the energy left in the battery after the last slot.
    pub terminal_value_ct: f64,
    /// The minimized quantity: `total_cost_ct - terminal_value_ct`.
    pub objective_ct: f64,
}

impl SchedulePlan {
    pub fn horizon_hours(&self) -> usize {
        self.slots.len()
    }

    pub fn valid_from(&self) -> Option<DateTime<Utc>> {
        self.slots.first().map(|s| s.timestamp)
    }

    pub fn valid_until(&self) -> Option<DateTime<Utc>> {
        self.slots.last().map(|s| s.timestamp + Duration::hours(1))
    }

    pub fn current(&self) -> Option<&SlotPlan> {
        self.slots.first()
    }

    pub fn decision(&self) -> Option<HourDecision> {
        self.current().map(|slot| HourDecision {
            timestamp: slot.timestamp,
            charge_from_grid: slot.grid_to_batt > ACTION_EPSILON_KWH,
            grid_charge_rate_kw: slot.grid_to_batt,
            discharge_to_load: slot.batt_to_load > ACTION_EPSILON_KWH,
        })
    }

    /// Per-slot series for visualization, keyed by series name.
    pub fn series(&self) -> BTreeMap<&'static str, Vec<(DateTime<Utc>, f64)>> {
        let columns: [(&'static str, fn(&SlotPlan) -> f64); 12] = [
            ("battery_charge_from_solar", |s| s.solar_to_batt),
            ("battery_charge_from_grid", |s| s.grid_to_batt),
            ("battery_discharge", |s| s.batt_to_load),
            ("grid_export", |s| s.solar_export),
            ("grid_import", SlotPlan::grid_import),
            ("state_of_charge", |s| s.soc_kwh),
            ("state_of_charge_percentage", |s| s.soc_percent),
            ("consumption_forecast", |s| s.consumption_kwh),
            ("solar_production_forecast", |s| s.solar_kwh),
            ("maximum_discharge_possible", |s| s.max_discharge_possible_kwh),
            ("battery_charging_from_grid", |s| {
                flag(s.grid_to_batt > ACTION_EPSILON_KWH)
            }),
            ("battery_discharging_enabled", |s| {
                flag(s.batt_to_load > ACTION_EPSILON_KWH)
            }),
        ];
        columns
            .into_iter()
            .map(|(name, value)| {
                let points = self.slots.iter().map(|s| (s.timestamp, value(s))).collect();
                (name, points)
            })
            .collect()
    }
}

fn flag(on: bool) -> f64 {
    if on {
        1.0
    } else {
        0.0
    }
}

/// Upper bound on how much could be discharged in each slot without the
/// plan having to import more from the grid later.
///
/// Where the plan stores energy (SoC rising), exports, or already
/// discharges, the battery content is spare; otherwise it is being held
/// back for a later hour and nothing is spare.
pub fn max_discharge_possible(slots: &mut [SlotPlan], discharge_rate_max_kw: f64) {
    let socs: Vec<f64> = slots.iter().map(|s| s.soc_kwh).collect();
    for (t, slot) in slots.iter_mut().enumerate() {
        let soc = socs[t];
        let soc_next = socs.get(t + 1).copied().unwrap_or(soc);
        let spare = if soc_next > soc
            || slot.solar_export > ACTION_EPSILON_KWH
            || slot.batt_to_load > ACTION_EPSILON_KWH
        {
            soc
        } else {
            0.0
        };
        slot.max_discharge_possible_kwh = spare.min(discharge_rate_max_kw).min(soc).max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn slot(index: i64, soc_kwh: f64) -> SlotPlan {
        SlotPlan {
            index: index as usize,
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap() + Duration::hours(index),
            consumption_kwh: 1.0,
            solar_kwh: 0.0,
            price_import_ct_per_kwh: 25.0,
            grid_to_load: 1.0,
            grid_to_batt: 0.0,
            solar_to_load: 0.0,
            solar_to_batt: 0.0,
            solar_export: 0.0,
            batt_to_load: 0.0,
            soc_kwh,
            soc_percent: soc_kwh * 10.0,
            max_discharge_possible_kwh: 0.0,
        }
    }

    fn plan(slots: Vec<SlotPlan>) -> SchedulePlan {
        SchedulePlan {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            feed_in_tariff_ct_per_kwh: 7.0,
            slots,
            total_cost_ct: 0.0,
            terminal_value_ct: 0.0,
            objective_ct: 0.0,
        }
    }

    #[test]
    fn test_max_discharge_when_soc_rises() {
        let mut slots = vec![slot(0, 4.0), slot(1, 8.0)];
        max_discharge_possible(&mut slots, 6.0);
        assert_eq!(slots[0].max_discharge_possible_kwh, 4.0);
        // Last slot compares against itself: held, nothing spare.
        assert_eq!(slots[1].max_discharge_possible_kwh, 0.0);
    }

    #[test]
    fn test_max_discharge_capped_by_rate() {
        let mut slots = vec![slot(0, 9.0), slot(1, 10.0)];
        max_discharge_possible(&mut slots, 6.0);
        assert_eq!(slots[0].max_discharge_possible_kwh, 6.0);
    }

    #[test]
    fn test_max_discharge_when_already_discharging() {
        let mut s = slot(0, 3.0);
        s.batt_to_load = 1.0;
        let mut slots = vec![s, slot(1, 2.0)];
        max_discharge_possible(&mut slots, 6.0);
        assert_eq!(slots[0].max_discharge_possible_kwh, 3.0);
    }

    #[test]
    fn test_decision_ignores_numerical_noise() {
        let mut s = slot(0, 3.0);
        s.grid_to_batt = 1e-9;
        s.batt_to_load = 0.5;
        let decision = plan(vec![s]).decision().unwrap();
        assert!(!decision.charge_from_grid);
        assert!(decision.discharge_to_load);
    }

    #[test]
    fn test_series_has_one_point_per_slot() {
        let p = plan(vec![slot(0, 1.0), slot(1, 2.0), slot(2, 3.0)]);
        let series = p.series();
        assert_eq!(series.len(), 12);
        assert!(series.values().all(|points| points.len() == 3));
        assert_eq!(series["state_of_charge"][2].1, 3.0);
        assert_eq!(series["grid_import"][0].1, 1.0);
        assert_eq!(p.valid_until(), Some(p.slots[2].timestamp + Duration::hours(1)));
    }

    #[test]
    fn test_empty_plan_has_no_decision() {
        assert!(plan(vec![]).decision().is_none());
    }
}
