//! LP Schedule Solver
//!
//! Formulates the battery schedule over an aligned [`Horizon`] as a linear
//! program and solves it through a pluggable [`LpBackend`].
//!
//! Per slot the program routes energy along six non-negative flows:
//! - grid to load and grid to battery (import, paid at the slot price)
//! - solar to load, solar to battery and solar export (credited at the feed-in tariff)
//! - battery to load
//!
//! plus the end-of-slot state of charge. Efficiency losses are charged once,
//! on the way into the battery. The objective is import cost minus export
//! credit, minus the value of the energy left in the battery at the end
//! (see [`TerminalValuation`]).

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{BackendError, Comparison, GoodLpBackend, LinearProgram, LpBackend, TerminalValuation, VarId};
use crate::domain::{max_discharge_possible, BatteryModel, Horizon, SchedulePlan, SlotPlan};
use crate::error::{PlannerError, PlannerResult};

/// Largest bound or constraint violation accepted from a backend.
const FEASIBILITY_TOLERANCE: f64 = 1e-6;
/// Solver noise below this is reported as an exact zero.
const ZERO_SNAP: f64 = 1e-9;

struct SlotVars {
    grid_to_load: VarId,
    grid_to_batt: VarId,
    solar_to_load: VarId,
    solar_to_batt: VarId,
    solar_export: VarId,
    batt_to_load: VarId,
    soc: VarId,
}

/// Computes cost-optimal hourly battery schedules. Holds no state between
/// calls.
#[derive(Clone)]
pub struct ScheduleSolver {
    backend: Arc<dyn LpBackend>,
    terminal_valuation: TerminalValuation,
}

impl Default for ScheduleSolver {
    fn default() -> Self {
        Self::new(Arc::new(GoodLpBackend), TerminalValuation::default())
    }
}

impl ScheduleSolver {
    pub fn new(backend: Arc<dyn LpBackend>, terminal_valuation: TerminalValuation) -> Self {
        Self {
            backend,
            terminal_valuation,
        }
    }

    pub fn solve(&self, horizon: &Horizon, battery: &BatteryModel) -> PlannerResult<SchedulePlan> {
        // Checked before validation: no state of charge can satisfy both bounds.
        if battery.lower_limit_kwh > battery.capacity_kwh {
            return Err(PlannerError::InfeasibleConfiguration(format!(
                "lower_battery_limit {} kWh exceeds battery_capacity {} kWh",
                battery.lower_limit_kwh, battery.capacity_kwh
            )));
        }
        battery.validate()?;
        if horizon.is_empty() {
            return Err(PlannerError::InsufficientForecastData(
                "horizon has no slots".to_string(),
            ));
        }

        let terminal_price = self
            .terminal_valuation
            .price_ct_per_kwh(horizon.min_import_price());
        let (program, vars) = build_program(horizon, battery, terminal_price);
        debug!(
            slots = horizon.len(),
            variables = program.variables().len(),
            constraints = program.constraints().len(),
            backend = self.backend.name(),
            "solving schedule"
        );

        let started = Instant::now();
        let values = self.backend.solve(&program).map_err(|e| match e {
            BackendError::Infeasible => PlannerError::InfeasibleConfiguration(format!(
                "no feasible schedule for initial SoC {} kWh within [{}, {}] kWh",
                battery.initial_soc_kwh, battery.lower_limit_kwh, battery.capacity_kwh
            )),
            other => PlannerError::SolverError(format!("{}: {}", self.backend.name(), other)),
        })?;
        let elapsed = started.elapsed();

        if values.len() != program.variables().len() {
            return Err(PlannerError::SolverError(format!(
                "{} returned {} values for {} variables",
                self.backend.name(),
                values.len(),
                program.variables().len()
            )));
        }
        let (violation, at) = program.max_violation(&values);
        if violation > FEASIBILITY_TOLERANCE {
            warn!(violation, at = at.unwrap_or("?"), "backend solution rejected");
            return Err(PlannerError::SolverError(format!(
                "solution violates {} by {violation:e}",
                at.unwrap_or("a constraint")
            )));
        }

        let value = |v: VarId| {
            let x = values[v.index()];
            if x.abs() < ZERO_SNAP {
                0.0
            } else {
                x
            }
        };
        let mut slots: Vec<SlotPlan> = horizon
            .slots()
            .iter()
            .zip(&vars)
            .map(|(slot, v)| {
                let soc_kwh = value(v.soc);
                SlotPlan {
                    index: slot.index,
                    timestamp: slot.timestamp,
                    consumption_kwh: slot.consumption_kwh,
                    solar_kwh: slot.solar_kwh,
                    price_import_ct_per_kwh: slot.price_import_ct_per_kwh,
                    grid_to_load: value(v.grid_to_load),
                    grid_to_batt: value(v.grid_to_batt),
                    solar_to_load: value(v.solar_to_load),
                    solar_to_batt: value(v.solar_to_batt),
                    solar_export: value(v.solar_export),
                    batt_to_load: value(v.batt_to_load),
                    soc_kwh,
                    soc_percent: battery.soc_percent(soc_kwh),
                    max_discharge_possible_kwh: 0.0,
                }
            })
            .collect();
        max_discharge_possible(&mut slots, battery.discharge_rate_max_kw);

        let total_cost_ct: f64 = horizon
            .slots()
            .iter()
            .zip(&slots)
            .map(|(h, p)| {
                h.price_import_ct_per_kwh * p.grid_import()
                    - h.price_export_ct_per_kwh * p.solar_export
            })
            .sum();
        let terminal_value_ct = slots
            .last()
            .map_or(0.0, |last| terminal_price * last.soc_kwh);
        let feed_in_tariff_ct_per_kwh = horizon
            .slots()
            .first()
            .map_or(0.0, |s| s.price_export_ct_per_kwh);

        info!(
            slots = slots.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            total_cost_ct,
            terminal_value_ct,
            lp_objective_ct = program.evaluate_objective(&values),
            "schedule solved"
        );

        Ok(SchedulePlan {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            feed_in_tariff_ct_per_kwh,
            slots,
            total_cost_ct,
            terminal_value_ct,
            objective_ct: total_cost_ct - terminal_value_ct,
        })
    }
}

fn build_program(
    horizon: &Horizon,
    battery: &BatteryModel,
    terminal_price: f64,
) -> (LinearProgram, Vec<SlotVars>) {
    let mut lp = LinearProgram::new();
    let mut vars: Vec<SlotVars> = Vec::with_capacity(horizon.len());

    for slot in horizon.slots() {
        let i = slot.index;
        let mut flow = |name: &str| lp.add_variable(format!("{name}[{i}]"), 0.0, f64::INFINITY);
        let v = SlotVars {
            grid_to_load: flow("grid_to_load"),
            grid_to_batt: flow("grid_to_batt"),
            solar_to_load: flow("solar_to_load"),
            solar_to_batt: flow("solar_to_batt"),
            solar_export: flow("solar_export"),
            batt_to_load: flow("batt_to_load"),
            soc: lp.add_variable(
                format!("soc[{i}]"),
                battery.lower_limit_kwh,
                battery.capacity_kwh,
            ),
        };

        lp.add_constraint(
            format!("solar_balance[{i}]"),
            [(v.solar_to_load, 1.0), (v.solar_to_batt, 1.0), (v.solar_export, 1.0)],
            Comparison::Eq,
            slot.solar_kwh,
        );
        lp.add_constraint(
            format!("load_balance[{i}]"),
            [(v.grid_to_load, 1.0), (v.solar_to_load, 1.0), (v.batt_to_load, 1.0)],
            Comparison::Eq,
            slot.consumption_kwh,
        );
        lp.add_constraint(
            format!("charge_rate[{i}]"),
            [(v.grid_to_batt, 1.0), (v.solar_to_batt, 1.0)],
            Comparison::Le,
            battery.charge_rate_max_kw,
        );
        lp.add_constraint(
            format!("discharge_rate[{i}]"),
            [(v.batt_to_load, 1.0)],
            Comparison::Le,
            battery.discharge_rate_max_kw,
        );

        // soc[i] - eff * charge + discharge = soc[i-1]
        let mut dynamics = vec![
            (v.soc, 1.0),
            (v.grid_to_batt, -battery.efficiency),
            (v.solar_to_batt, -battery.efficiency),
            (v.batt_to_load, 1.0),
        ];
        let rhs = match vars.last() {
            Some(prev) => {
                dynamics.push((prev.soc, -1.0));
                0.0
            }
            None => battery.initial_soc_kwh,
        };
        lp.add_constraint(format!("soc_dynamics[{i}]"), dynamics, Comparison::Eq, rhs);

        lp.add_objective_term(v.grid_to_load, slot.price_import_ct_per_kwh);
        lp.add_objective_term(v.grid_to_batt, slot.price_import_ct_per_kwh);
        lp.add_objective_term(v.solar_export, -slot.price_export_ct_per_kwh);

        vars.push(v);
    }

    if let Some(last) = vars.last() {
        if terminal_price != 0.0 {
            lp.add_objective_term(last.soc, -terminal_price);
        }
    }
    (lp, vars)
}
