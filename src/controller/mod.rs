pub mod actuation;
pub mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

pub use actuation::{Actuator, LoggingActuator, SwitchState};
pub use scheduler::{RunStats, Trigger, TriggerLoop};

use crate::config::Config;
use crate::domain::{BatteryModel, InputSnapshot, SchedulePlan};
use crate::error::{PlannerError, PlannerResult};
use crate::forecast::{ForecastAligner, ForecastSource, JsonFileSource};
use crate::optimizer::{GoodLpBackend, ScheduleSolver};

/// Runs the capture, align, solve and actuate pipeline.
///
/// Runs are serialized. The latest successful plan is kept until a later run
/// succeeds; a failed run never replaces or clears it.
pub struct Planner {
    source: Arc<dyn ForecastSource>,
    aligner: ForecastAligner,
    solver: ScheduleSolver,
    /// Static parameters; the initial SoC is filled in from each snapshot.
    battery: BatteryModel,
    actuator: Arc<dyn Actuator>,
    solve_timeout: Duration,
    run_lock: Mutex<()>,
    latest: RwLock<Option<SchedulePlan>>,
}

impl Planner {
    pub fn new(
        source: Arc<dyn ForecastSource>,
        aligner: ForecastAligner,
        solver: ScheduleSolver,
        battery: BatteryModel,
        actuator: Arc<dyn Actuator>,
        solve_timeout: Duration,
    ) -> Self {
        Self {
            source,
            aligner,
            solver,
            battery,
            actuator,
            solve_timeout,
            run_lock: Mutex::new(()),
            latest: RwLock::new(None),
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        cfg.validate()?;
        let aligner = ForecastAligner::new(
            cfg.planner.time_horizon,
            cfg.planner.consumption_history_days,
            cfg.planner.feed_in_tariff,
            cfg.timezone()?,
        );
        let solver = ScheduleSolver::new(Arc::new(GoodLpBackend), cfg.planner.terminal_valuation);
        Ok(Self::new(
            Arc::new(JsonFileSource::new(cfg.source_config())),
            aligner,
            solver,
            cfg.battery_model(cfg.battery.lower_battery_limit),
            Arc::new(LoggingActuator::new(cfg.actuation.publish_path.clone())),
            cfg.scheduler.solve_timeout(),
        ))
    }

    pub async fn latest_plan(&self) -> Option<SchedulePlan> {
        self.latest.read().await.clone()
    }

    /// Capture fresh inputs, plan, store and actuate.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SchedulePlan> {
        let _guard = self.run_lock.lock().await;

        let snapshot = match self.source.snapshot(now).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "failed to capture inputs; keeping previous plan");
                return Err(e);
            }
        };
        let plan = match self.plan_snapshot(snapshot).await {
            Ok(plan) => plan,
            Err(e) => {
                error!(kind = e.kind(), error = %e, "planning failed; keeping previous plan");
                return Err(e.into());
            }
        };

        *self.latest.write().await = Some(plan.clone());
        if let Err(e) = self.actuator.apply(&plan).await {
            warn!(error = %e, "actuation failed");
            return Err(e);
        }
        Ok(plan)
    }

    /// Plan from an already captured snapshot. Does not touch the stored plan.
    pub async fn plan_snapshot(&self, snapshot: InputSnapshot) -> PlannerResult<SchedulePlan> {
        let initial_soc_kwh = snapshot.soc.to_kwh(self.battery.capacity_kwh);
        let battery = self.battery.with_initial_soc(initial_soc_kwh);
        let horizon = self
            .aligner
            .align(snapshot.captured_at, &snapshot.forecasts)?;
        info!(
            captured_at = %snapshot.captured_at,
            initial_soc_kwh,
            slots = horizon.len(),
            "planning"
        );

        let solver = self.solver.clone();
        // A panicking backend surfaces as a join error; release builds unwind.
        let task = tokio::task::spawn_blocking(move || solver.solve(&horizon, &battery));
        match tokio::time::timeout(self.solve_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(PlannerError::SolverError(format!(
                "solver task failed: {join}"
            ))),
            Err(_) => Err(PlannerError::SolverError(format!(
                "solve exceeded {:?}",
                self.solve_timeout
            ))),
        }
    }
}
