use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, PlannerResult};

/// Static battery parameters for one planning run.
///
/// All energies are in kWh and all rates in kW. Slots are one hour long, so
/// a rate limit is numerically the energy that can move within one slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryModel {
    pub capacity_kwh: f64,
    /// Round-trip efficiency, applied once on the charge leg.
    pub efficiency: f64,
    pub charge_rate_max_kw: f64,
    pub discharge_rate_max_kw: f64,
    /// Reserve the plan never discharges below.
    pub lower_limit_kwh: f64,
    /// Live state of charge, read once per run.
    pub initial_soc_kwh: f64,
}

impl BatteryModel {
    /// Validate the static parameters. Out-of-range values are rejected,
    /// never clamped.
    pub fn validate(&self) -> PlannerResult<()> {
        let fields = [
            ("battery_capacity", self.capacity_kwh),
            ("battery_efficiency", self.efficiency),
            ("charge_rate_max", self.charge_rate_max_kw),
            ("discharge_rate_max", self.discharge_rate_max_kw),
            ("lower_battery_limit", self.lower_limit_kwh),
            ("initial_soc", self.initial_soc_kwh),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(invalid(format!("{name} must be a finite number, got {value}")));
            }
        }

        if self.capacity_kwh <= 0.0 {
            return Err(invalid(format!(
                "battery_capacity must be positive, got {}",
                self.capacity_kwh
            )));
        }
        if self.efficiency <= 0.0 || self.efficiency > 1.0 {
            return Err(invalid(format!(
                "battery_efficiency must be in (0, 1], got {}",
                self.efficiency
            )));
        }
        if self.charge_rate_max_kw <= 0.0 {
            return Err(invalid(format!(
                "charge_rate_max must be positive, got {}",
                self.charge_rate_max_kw
            )));
        }
        if self.discharge_rate_max_kw <= 0.0 {
            return Err(invalid(format!(
                "discharge_rate_max must be positive, got {}",
                self.discharge_rate_max_kw
            )));
        }
        if self.lower_limit_kwh < 0.0 || self.lower_limit_kwh > self.capacity_kwh {
            return Err(invalid(format!(
                "lower_battery_limit must be in [0, {}], got {}",
                self.capacity_kwh, self.lower_limit_kwh
            )));
        }
        Ok(())
    }

    pub fn with_initial_soc(self, initial_soc_kwh: f64) -> Self {
        Self {
            initial_soc_kwh,
            ..self
        }
    }

    pub fn soc_percent(&self, soc_kwh: f64) -> f64 {
        soc_kwh / self.capacity_kwh * 100.0
    }
}

fn invalid(msg: String) -> PlannerError {
    PlannerError::InvalidConfiguration(msg)
}

/// Live state-of-charge reading as reported by the battery sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value", rename_all = "snake_case")]
pub enum SocReading {
    Percent(f64),
    KilowattHours(f64),
}

impl SocReading {
    pub fn to_kwh(self, capacity_kwh: f64) -> f64 {
        match self {
            Self::Percent(p) => p / 100.0 * capacity_kwh,
            Self::KilowattHours(kwh) => kwh,
        }
    }
}
