use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::ConsumptionHistory;
use crate::domain::{ForecastInputs, InputSnapshot, Sample, SocReading};

/// Supplies a consistent snapshot of live readings and forecasts.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    async fn snapshot(&self, now: DateTime<Utc>) -> Result<InputSnapshot>;
}

/// Unit of the prices in the price file.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PriceUnit {
    #[default]
    CtPerKwh,
    EurPerKwh,
}

impl PriceUnit {
    pub fn to_ct_factor(self) -> f64 {
        match self {
            Self::CtPerKwh => 1.0,
            Self::EurPerKwh => 100.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JsonFileSourceConfig {
    pub solar_path: PathBuf,
    pub price_path: PathBuf,
    pub soc_path: PathBuf,
    /// Recent consumption readings, merged into the history on each snapshot.
    pub consumption_path: PathBuf,
    pub history_path: PathBuf,
    pub history_days: u32,
    pub price_unit: PriceUnit,
}

/// Reads forecasts from JSON files written by an external integration.
///
/// Sample files hold `[{"timestamp": "...", "value": ...}]`; the SoC file
/// holds `{"unit": "percent" | "kilowatt_hours", "value": ...}`.
pub struct JsonFileSource {
    cfg: JsonFileSourceConfig,
    history: Mutex<Option<ConsumptionHistory>>,
}

impl JsonFileSource {
    pub fn new(cfg: JsonFileSourceConfig) -> Self {
        Self {
            cfg,
            history: Mutex::new(None),
        }
    }

    async fn refresh_history(&self, now: DateTime<Utc>) -> Result<Vec<Sample>> {
        let mut guard = self.history.lock().await;
        if guard.is_none() {
            *guard = Some(ConsumptionHistory::load(&self.cfg.history_path).await);
        }
        let history = guard.as_mut().context("consumption history not loaded")?;

        let pruned = history.prune(now - Duration::days(i64::from(self.cfg.history_days)));
        let readings: Vec<Sample> = match read_json_optional(&self.cfg.consumption_path).await? {
            Some(readings) => readings,
            None => Vec::new(),
        };
        let added = history.extend_newer(readings);
        debug!(pruned, added, total = history.samples().len(), "consumption history refreshed");
        // The in-memory history is still valid when the file cannot be written.
        if let Err(e) = history.save().await {
            warn!(path = %self.cfg.history_path.display(), error = %e, "failed to save consumption history");
        }
        Ok(history.samples().to_vec())
    }
}

#[async_trait]
impl ForecastSource for JsonFileSource {
    async fn snapshot(&self, now: DateTime<Utc>) -> Result<InputSnapshot> {
        let soc: SocReading = read_json(&self.cfg.soc_path).await?;
        // Tomorrow's data may not be published yet; an absent file is an empty series.
        let solar: Vec<Sample> = read_json_optional(&self.cfg.solar_path)
            .await?
            .unwrap_or_default();
        let factor = self.cfg.price_unit.to_ct_factor();
        let price: Vec<Sample> = read_json_optional::<Vec<Sample>>(&self.cfg.price_path)
            .await?
            .unwrap_or_default()
            .into_iter()
            .map(|s| Sample::new(s.timestamp, s.value * factor))
            .collect();
        let consumption_history = self.refresh_history(now).await?;

        Ok(InputSnapshot {
            captured_at: now,
            soc,
            forecasts: ForecastInputs {
                consumption_history,
                solar,
                price,
            },
        })
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
}

async fn read_json_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::try_exists(path).await {
        Ok(true) => read_json(path).await.map(Some),
        Ok(false) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("checking {}", path.display())),
    }
}

/// Snapshot source over fixed in-memory data.
#[derive(Debug, Clone)]
pub struct StaticSource {
    pub soc: SocReading,
    pub forecasts: ForecastInputs,
}

#[async_trait]
impl ForecastSource for StaticSource {
    async fn snapshot(&self, now: DateTime<Utc>) -> Result<InputSnapshot> {
        Ok(InputSnapshot {
            captured_at: now,
            soc: self.soc,
            forecasts: self.forecasts.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("wattplan-source-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn config(dir: &Path, price_unit: PriceUnit) -> JsonFileSourceConfig {
        JsonFileSourceConfig {
            solar_path: dir.join("solar.json"),
            price_path: dir.join("price.json"),
            soc_path: dir.join("soc.json"),
            consumption_path: dir.join("consumption.json"),
            history_path: dir.join("history.json"),
            history_days: 7,
            price_unit,
        }
    }

    #[tokio::test]
    async fn test_snapshot_reads_all_files() {
        let dir = dir();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        std::fs::write(dir.join("soc.json"), r#"{"unit":"percent","value":40.0}"#).unwrap();
        std::fs::write(
            dir.join("price.json"),
            r#"[{"timestamp":"2024-06-01T12:00:00Z","value":0.25}]"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("solar.json"),
            r#"[{"timestamp":"2024-06-01T12:00:00Z","value":1.5}]"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("consumption.json"),
            r#"[{"timestamp":"2024-06-01T11:00:00Z","value":0.8}]"#,
        )
        .unwrap();

        let source = JsonFileSource::new(config(&dir, PriceUnit::EurPerKwh));
        let snapshot = source.snapshot(now).await.unwrap();

        assert_eq!(snapshot.soc, SocReading::Percent(40.0));
        assert!((snapshot.forecasts.price[0].value - 25.0).abs() < 1e-9);
        assert_eq!(snapshot.forecasts.solar[0].value, 1.5);
        assert_eq!(snapshot.forecasts.consumption_history.len(), 1);
        assert!(dir.join("history.json").exists());

        // A second snapshot must not duplicate already stored readings.
        let snapshot = source.snapshot(now).await.unwrap();
        assert_eq!(snapshot.forecasts.consumption_history.len(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_unwritable_history_does_not_fail_snapshot() {
        let dir = dir();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        std::fs::write(dir.join("soc.json"), r#"{"unit":"kilowatt_hours","value":3.0}"#).unwrap();
        std::fs::write(
            dir.join("price.json"),
            r#"[{"timestamp":"2024-06-01T12:00:00Z","value":20.0}]"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("solar.json"),
            r#"[{"timestamp":"2024-06-01T12:00:00Z","value":0.5}]"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("consumption.json"),
            r#"[{"timestamp":"2024-06-01T11:00:00Z","value":0.8}]"#,
        )
        .unwrap();

        let mut cfg = config(&dir, PriceUnit::CtPerKwh);
        cfg.history_path = dir.join("missing_dir").join("history.json");
        let source = JsonFileSource::new(cfg);
        let snapshot = source.snapshot(now).await.unwrap();

        assert_eq!(snapshot.forecasts.consumption_history.len(), 1);
        assert!(!dir.join("missing_dir").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_missing_soc_is_an_error() {
        let dir = dir();
        let source = JsonFileSource::new(config(&dir, PriceUnit::CtPerKwh));
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        assert!(source.snapshot(now).await.is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_price_unit_parsing() {
        assert_eq!("eur_per_kwh".parse::<PriceUnit>().unwrap(), PriceUnit::EurPerKwh);
        assert_eq!(PriceUnit::CtPerKwh.to_string(), "ct_per_kwh");
    }
}
