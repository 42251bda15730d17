use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{HourDecision, SchedulePlan};
use crate::forecast::history::write_atomic;

/// Applies the current-hour decision of a fresh plan.
#[async_trait]
pub trait Actuator: Send + Sync {
    async fn apply(&self, plan: &SchedulePlan) -> Result<()>;
}

/// Commanded state of the two battery switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SwitchState {
    pub charging_from_grid: bool,
    pub discharging_to_house: bool,
}

impl SwitchState {
    /// The switches are mutually exclusive. When the plan both grid-charges
    /// and discharges in the current hour, the larger flow wins.
    pub fn from_plan(plan: &SchedulePlan) -> Self {
        let Some(d) = plan.decision() else {
            return Self::default();
        };
        if d.charge_from_grid && d.discharge_to_load {
            let charging = plan
                .current()
                .map_or(false, |slot| slot.grid_to_batt >= slot.batt_to_load);
            debug!(charging, "plan charges and discharges in the same hour");
            return Self {
                charging_from_grid: charging,
                discharging_to_house: !charging,
            };
        }
        Self {
            charging_from_grid: d.charge_from_grid,
            discharging_to_house: d.discharge_to_load,
        }
    }

    /// Switches whose state differs from `previous`. Every switch counts as
    /// changed when there is no previous state.
    pub fn changes(&self, previous: Option<SwitchState>) -> Vec<(&'static str, bool)> {
        let switches = [
            ("charging_from_grid", self.charging_from_grid, previous.map(|p| p.charging_from_grid)),
            (
                "discharging_to_house",
                self.discharging_to_house,
                previous.map(|p| p.discharging_to_house),
            ),
        ];
        switches
            .into_iter()
            .filter(|(_, now, before)| Some(*now) != *before)
            .map(|(name, now, _)| (name, now))
            .collect()
    }
}

#[derive(Serialize)]
struct Published<'a> {
    plan_id: Uuid,
    created_at: DateTime<Utc>,
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
    total_cost_ct: f64,
    objective_ct: f64,
    switches: SwitchState,
    series: BTreeMap<&'static str, Vec<(DateTime<Utc>, f64)>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    decision: Option<&'a HourDecision>,
}

/// Logs switch changes and optionally publishes the plan series as JSON.
#[derive(Debug, Default)]
pub struct LoggingActuator {
    publish_path: Option<PathBuf>,
    last: Mutex<Option<SwitchState>>,
}

impl LoggingActuator {
    pub fn new(publish_path: Option<PathBuf>) -> Self {
        Self {
            publish_path,
            last: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> Option<SwitchState> {
        *self.last.lock().await
    }
}

#[async_trait]
impl Actuator for LoggingActuator {
    async fn apply(&self, plan: &SchedulePlan) -> Result<()> {
        let next = SwitchState::from_plan(plan);
        let mut last = self.last.lock().await;
        let changes = next.changes(*last);
        if changes.is_empty() {
            debug!(?next, "switch state unchanged");
        }
        for (switch, on) in changes {
            info!(switch, on, "switch changed");
        }
        *last = Some(next);
        drop(last);

        if let Some(path) = &self.publish_path {
            let decision = plan.decision();
            let published = Published {
                plan_id: plan.id,
                created_at: plan.created_at,
                valid_from: plan.valid_from(),
                valid_until: plan.valid_until(),
                total_cost_ct: plan.total_cost_ct,
                objective_ct: plan.objective_ct,
                switches: next,
                series: plan.series(),
                decision: decision.as_ref(),
            };
            let json = serde_json::to_vec_pretty(&published)?;
            write_atomic(path, &json).await?;
            debug!(path = %path.display(), "plan published");
        }
        Ok(())
    }
}
