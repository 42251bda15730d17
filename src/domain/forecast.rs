use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SocReading;

/// One timestamped value of an input series (kWh for consumption and solar,
/// ct/kWh for prices).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Raw forecast inputs as delivered by the acquisition layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastInputs {
    /// Historical household usage, arbitrary resolution.
    pub consumption_history: Vec<Sample>,
    /// Hourly PV production forecast (today + tomorrow).
    pub solar: Vec<Sample>,
    /// Hourly import price forecast in ct/kWh.
    pub price: Vec<Sample>,
}

/// Everything a run reads from the outside world, captured at one instant so
/// that a plan is never computed against inconsistent inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSnapshot {
    pub captured_at: DateTime<Utc>,
    pub soc: SocReading,
    pub forecasts: ForecastInputs,
}
