use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use wattplan::config::Config;
use wattplan::controller::{Planner, TriggerLoop};
use wattplan::telemetry::{self, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = Config::load()?;
    let tz = cfg.timezone()?;

    if cfg.actuation.publish_path.is_none() {
        warn!("actuation.publish_path not set; plans are only logged");
    }

    let planner = Arc::new(Planner::from_config(&cfg)?);
    let trigger = TriggerLoop::new(planner, cfg.scheduler.startup_delay(), tz);
    telemetry::spawn_manual_trigger_listener(trigger.manual_trigger());

    info!(
        horizon_hours = cfg.planner.time_horizon,
        capacity_kwh = cfg.battery.battery_capacity,
        terminal_valuation = %cfg.planner.terminal_valuation,
        %tz,
        "starting wattplan"
    );

    trigger.run(telemetry::shutdown_signal()).await;

    warn!("shutdown complete");
    Ok(())
}
