use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::domain::BatteryModel;
use crate::error::{PlannerError, PlannerResult};
use crate::forecast::{JsonFileSourceConfig, PriceUnit};
use crate::optimizer::TerminalValuation;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub battery: BatteryConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub actuation: ActuationConfig,
}

/// Static battery parameters. Energies in kWh, rates in kW.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BatteryConfig {
    pub battery_capacity: f64,
    pub battery_efficiency: f64,
    pub charge_rate_max: f64,
    pub discharge_rate_max: f64,
    pub lower_battery_limit: f64,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            battery_capacity: 11.2,
            battery_efficiency: 0.9,
            charge_rate_max: 6.0,
            discharge_rate_max: 6.0,
            lower_battery_limit: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Maximum number of hourly slots to optimize.
    pub time_horizon: usize,
    pub consumption_history_days: u32,
    /// ct/kWh paid for exported energy.
    pub feed_in_tariff: f64,
    pub terminal_valuation: TerminalValuation,
    /// IANA zone used for hour boundaries and hour-of-day averaging.
    pub timezone: String,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            time_horizon: 48,
            consumption_history_days: 7,
            feed_in_tariff: 7.0,
            terminal_valuation: TerminalValuation::default(),
            timezone: "UTC".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub startup_delay_seconds: u64,
    pub solve_timeout_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            startup_delay_seconds: 30,
            solve_timeout_seconds: 60,
        }
    }
}

impl SchedulerConfig {
    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_seconds)
    }

    pub fn solve_timeout(&self) -> Duration {
        Duration::from_secs(self.solve_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub solar_path: PathBuf,
    pub price_path: PathBuf,
    pub soc_path: PathBuf,
    pub consumption_path: PathBuf,
    pub history_path: PathBuf,
    pub price_unit: PriceUnit,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            solar_path: "data/solar_forecast.json".into(),
            price_path: "data/price_forecast.json".into(),
            soc_path: "data/battery_soc.json".into(),
            consumption_path: "data/consumption.json".into(),
            history_path: "data/consumption_history.json".into(),
            price_unit: PriceUnit::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ActuationConfig {
    /// Where the plan series are published; nothing is written when unset.
    pub publish_path: Option<PathBuf>,
}

impl Config {
    /// Defaults, then `config/default.toml`, then `WATTPLAN__SECTION__KEY`
    /// environment variables.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("WATTPLAN__").split("__"))
    }

    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let cfg: Config = Self::figment()
            .extract()
            .context("loading configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> PlannerResult<()> {
        self.battery_model(self.battery.lower_battery_limit)
            .validate()?;
        if self.planner.time_horizon < 1 {
            return Err(PlannerError::InvalidConfiguration(
                "time_horizon must be at least 1 hour".to_string(),
            ));
        }
        if self.planner.consumption_history_days < 1 {
            return Err(PlannerError::InvalidConfiguration(
                "consumption_history_days must be at least 1".to_string(),
            ));
        }
        if !self.planner.feed_in_tariff.is_finite() {
            return Err(PlannerError::InvalidConfiguration(format!(
                "feed_in_tariff must be a finite number, got {}",
                self.planner.feed_in_tariff
            )));
        }
        if self.scheduler.solve_timeout_seconds == 0 {
            return Err(PlannerError::InvalidConfiguration(
                "solve_timeout_seconds must be positive".to_string(),
            ));
        }
        self.timezone()?;
        Ok(())
    }

    pub fn battery_model(&self, initial_soc_kwh: f64) -> BatteryModel {
        BatteryModel {
            capacity_kwh: self.battery.battery_capacity,
            efficiency: self.battery.battery_efficiency,
            charge_rate_max_kw: self.battery.charge_rate_max,
            discharge_rate_max_kw: self.battery.discharge_rate_max,
            lower_limit_kwh: self.battery.lower_battery_limit,
            initial_soc_kwh,
        }
    }

    pub fn timezone(&self) -> PlannerResult<Tz> {
        self.planner.timezone.parse::<Tz>().map_err(|e| {
            PlannerError::InvalidConfiguration(format!(
                "unknown timezone {:?}: {}",
                self.planner.timezone, e
            ))
        })
    }

    pub fn source_config(&self) -> JsonFileSourceConfig {
        JsonFileSourceConfig {
            solar_path: self.sources.solar_path.clone(),
            price_path: self.sources.price_path.clone(),
            soc_path: self.sources.soc_path.clone(),
            consumption_path: self.sources.consumption_path.clone(),
            history_path: self.sources.history_path.clone(),
            history_days: self.planner.consumption_history_days,
            price_unit: self.sources.price_unit,
        }
    }
}
