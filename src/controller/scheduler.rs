use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::{Notify, RwLock};
use tokio::time::{sleep, Duration, Instant};
use tracing::{error, info};

use super::Planner;
use crate::domain::hour_start;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Trigger {
    Startup,
    Hourly,
    Manual,
}

/// Outcome counters of planning runs.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub run_count: u64,
    pub success_count: u64,
    pub error_count: u64,
}

/// Fires planning runs once shortly after startup, at the start of every
/// hour, and whenever the manual trigger is notified.
pub struct TriggerLoop {
    planner: Arc<Planner>,
    startup_delay: Duration,
    tz: Tz,
    manual: Arc<Notify>,
    stats: Arc<RwLock<RunStats>>,
}

impl TriggerLoop {
    pub fn new(planner: Arc<Planner>, startup_delay: Duration, tz: Tz) -> Self {
        Self {
            planner,
            startup_delay,
            tz,
            manual: Arc::new(Notify::new()),
            stats: Arc::new(RwLock::new(RunStats::default())),
        }
    }

    /// Handle for requesting an immediate run. A request made while a run is
    /// in progress is served right after it.
    pub fn manual_trigger(&self) -> Arc<Notify> {
        self.manual.clone()
    }

    pub async fn stats(&self) -> RunStats {
        self.stats.read().await.clone()
    }

    /// Run until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let timer = sleep(self.startup_delay);
        tokio::pin!(timer);
        let mut scheduled = Trigger::Startup;
        info!(startup_delay_s = self.startup_delay.as_secs(), tz = %self.tz, "trigger loop started");

        loop {
            let trigger = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("trigger loop stopped");
                    return;
                }
                _ = &mut timer => scheduled,
                _ = self.manual.notified() => Trigger::Manual,
            };

            self.fire(trigger).await;

            if trigger != Trigger::Manual {
                scheduled = Trigger::Hourly;
                let wait = until_next_hour(Utc::now(), self.tz);
                timer.as_mut().reset(Instant::now() + wait);
                info!(next_in_s = wait.as_secs(), "next hourly run scheduled");
            }
        }
    }

    pub async fn fire(&self, trigger: Trigger) {
        let now = Utc::now();
        {
            let mut stats = self.stats.write().await;
            stats.last_run = Some(now);
            stats.run_count += 1;
        }
        info!(%trigger, "planning run started");

        match self.planner.run_once(now).await {
            Ok(plan) => {
                let mut stats = self.stats.write().await;
                stats.last_success = Some(now);
                stats.success_count += 1;
                stats.last_error = None;
                info!(%trigger, plan_id = %plan.id, slots = plan.horizon_hours(), "planning run completed");
            }
            Err(e) => {
                let mut stats = self.stats.write().await;
                stats.error_count += 1;
                stats.last_error = Some(e.to_string());
                error!(%trigger, error = %e, "planning run failed");
            }
        }
    }
}

/// Time left until the next wall-clock hour in `tz`.
pub fn until_next_hour(now: DateTime<Utc>, tz: Tz) -> Duration {
    let next = hour_start(now, tz) + chrono::Duration::hours(1);
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::LoggingActuator;
    use crate::domain::{ForecastInputs, Sample, SocReading};
    use crate::forecast::{ForecastAligner, StaticSource};
    use crate::optimizer::ScheduleSolver;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    #[case::utc(Tz::UTC, 12, 15, 45 * 60)]
    #[case::on_the_hour(Tz::UTC, 12, 0, 3600)]
    // Kolkata is UTC+05:30, so local hours start at :30 UTC.
    #[case::half_hour_zone(chrono_tz::Asia::Kolkata, 12, 15, 15 * 60)]
    fn test_until_next_hour(#[case] tz: Tz, #[case] hour: u32, #[case] minute: u32, #[case] secs: u64) {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, hour, minute, 0).unwrap();
        assert_eq!(until_next_hour(now, tz), Duration::from_secs(secs));
    }

    fn planner(hours_covered: i64) -> Arc<Planner> {
        let start = hour_start(Utc::now(), Tz::UTC);
        let hourly = |value: f64| -> Vec<Sample> {
            (0..hours_covered)
                .map(|h| Sample::new(start + chrono::Duration::hours(h), value))
                .collect()
        };
        let source = StaticSource {
            soc: SocReading::Percent(40.0),
            forecasts: ForecastInputs {
                consumption_history: vec![],
                solar: hourly(0.5),
                price: hourly(25.0),
            },
        };
        Arc::new(Planner::new(
            Arc::new(source),
            ForecastAligner::new(48, 7, 7.0, Tz::UTC),
            ScheduleSolver::default(),
            crate::config::Config::default().battery_model(1.0),
            Arc::new(LoggingActuator::default()),
            std::time::Duration::from_secs(10),
        ))
    }

    async fn wait_for_runs(trigger: &TriggerLoop, runs: u64) -> RunStats {
        for _ in 0..200 {
            let stats = trigger.stats().await;
            if stats.run_count >= runs {
                return stats;
            }
            sleep(Duration::from_millis(10)).await;
        }
        trigger.stats().await
    }

    #[cfg(feature = "optimization")]
    #[tokio::test]
    async fn test_startup_and_manual_runs() {
        let trigger = Arc::new(TriggerLoop::new(planner(3), Duration::from_millis(10), Tz::UTC));
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let looped = trigger.clone();
        let handle = tokio::spawn(async move {
            looped
                .run(async {
                    let _ = stopped.await;
                })
                .await
        });

        let stats = wait_for_runs(&trigger, 1).await;
        assert_eq!(stats.success_count, 1, "{:?}", stats.last_error);

        trigger.manual_trigger().notify_one();
        let stats = wait_for_runs(&trigger, 2).await;
        assert_eq!(stats.run_count, 2);
        assert_eq!(stats.success_count, 2);

        stop.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_run_is_counted() {
        let trigger = TriggerLoop::new(planner(0), Duration::from_secs(30), Tz::UTC);
        trigger.fire(Trigger::Manual).await;
        let stats = trigger.stats().await;
        assert_eq!(stats.run_count, 1);
        assert_eq!(stats.error_count, 1);
        assert!(stats.last_error.unwrap().contains("Insufficient forecast data"));
        assert!(stats.last_success.is_none());
    }

    #[test]
    fn test_trigger_names() {
        assert_eq!(Trigger::Hourly.to_string(), "hourly");
    }
}
