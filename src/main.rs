//! uptrail entry point.

use uptrail::config::{ScheduleInterval, ServerConfig, DEFAULT_SCHEDULE};
use uptrail::db::{self, format_uptime, Store, TargetStore};
use uptrail::probe::NetProber;
use uptrail::scheduler::{Dispatcher, Trigger};

use chrono::Utc;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("uptrail=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::with_history_limit(&cfg.db_path, cfg.history_limit)?);
    store.seed_schedule_interval(&cfg.default_schedule)?;
    tracing::info!("Database initialized successfully");

    // Add sample target if none exist
    let targets = store.list_targets()?;
    if targets.is_empty() {
        tracing::info!("Adding sample target: https://www.google.com");
        let mut target = db::Target {
            address: "https://www.google.com".to_string(),
            probe_mode: db::ProbeMode::Http,
            attempt_count: 3,
            ..Default::default()
        };
        store.add_target(&mut target)?;
    } else {
        log_target_summary(&targets);
    }

    let stored = store.schedule_interval()?.unwrap_or_else(|| DEFAULT_SCHEDULE.to_string());
    let interval = match ScheduleInterval::parse(&stored) {
        Ok(i) => i,
        Err(e) => {
            tracing::warn!("{}; falling back to {}", e, DEFAULT_SCHEDULE);
            ScheduleInterval::parse(DEFAULT_SCHEDULE)?
        }
    };

    // Start scheduler
    let prober = Arc::new(NetProber::new()?);
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), prober));
    let (trigger, task) = Trigger::spawn(dispatcher, store.clone(), interval);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    trigger.shutdown().await?;
    task.await?;

    Ok(())
}

/// Log the state each target was left in by the previous run.
fn log_target_summary(targets: &[db::Target]) {
    let now = Utc::now();
    for target in targets {
        tracing::info!(
            "{} [{}] {} - uptime: {}, avg latency: {}",
            target.address,
            target.probe_mode,
            if target.is_up() { "UP" } else { "DOWN" },
            format_uptime(target.uptime(now)),
            target
                .average_latency()
                .map(|ms| format!("{} ms", ms))
                .unwrap_or_else(|| "N/A".to_string())
        );
    }
}
