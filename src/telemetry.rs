use std::sync::Arc;

use tokio::signal;
use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! { _ = ctrl_c => {}, _ = terminate => {}, }
    info!("shutdown signal received");
}

/// Forward SIGUSR1 to the manual planning trigger.
#[cfg(unix)]
pub fn spawn_manual_trigger_listener(trigger: Arc<Notify>) {
    tokio::spawn(async move {
        let mut usr1 = match signal::unix::signal(signal::unix::SignalKind::user_defined1()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGUSR1; manual trigger disabled");
                return;
            }
        };
        while usr1.recv().await.is_some() {
            info!("manual planning run requested");
            trigger.notify_one();
        }
    });
}

#[cfg(not(unix))]
pub fn spawn_manual_trigger_listener(_trigger: Arc<Notify>) {
    warn!("manual trigger signal is only supported on unix");
}
