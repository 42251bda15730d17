use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::domain::Sample;

/// Rolling store of consumption readings backing the hour-of-day forecast.
///
/// Persisted as a JSON array of samples. Samples older than the lookback
/// window are dropped on every refresh.
#[derive(Debug, Clone, Default)]
pub struct ConsumptionHistory {
    path: Option<PathBuf>,
    samples: Vec<Sample>,
}

impl ConsumptionHistory {
    /// Load the history file. A missing or unreadable file starts an empty
    /// history rather than failing the run.
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let samples = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Vec<Sample>>(&bytes) {
                Ok(samples) => {
                    info!(path = %path.display(), samples = samples.len(), "loaded consumption history");
                    samples
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt consumption history, starting fresh");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no consumption history yet, starting fresh");
                Vec::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read consumption history, starting fresh");
                Vec::new()
            }
        };
        Self {
            path: Some(path),
            samples,
        }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.samples.iter().map(|s| s.timestamp).max()
    }

    /// Drop samples older than `cutoff`. Returns how many were removed.
    pub fn prune(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.samples.len();
        self.samples.retain(|s| s.timestamp >= cutoff);
        before - self.samples.len()
    }

    /// Append readings strictly newer than the latest stored one.
    pub fn extend_newer(&mut self, readings: impl IntoIterator<Item = Sample>) -> usize {
        let last = self.last_timestamp();
        let before = self.samples.len();
        self.samples.extend(
            readings
                .into_iter()
                .filter(|s| last.map_or(true, |last| s.timestamp > last)),
        );
        self.samples.sort_by_key(|s| s.timestamp);
        self.samples.len() - before
    }

    /// Write the history back, replacing the file atomically.
    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_vec(&self.samples)?;
        write_atomic(path, &json).await
    }
}

pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}
