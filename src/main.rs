use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;

use riskmonitor::config::{AppConfig, PublishSinkKind};
use riskmonitor::external::publisher::{BroadcastPublisher, PgNotifyPublisher, PublishSink};
use riskmonitor::logging::{init_logging, LoggingConfig};
use riskmonitor::services::job_scheduler_service::{JobContext, JobSchedules, JobSchedulerService};
use riskmonitor::state::EngineState;
use riskmonitor::store::postgres::PgStore;

const BROADCAST_CAPACITY: usize = 1_024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging FIRST
    init_logging(&LoggingConfig::from_env())?;

    let config = AppConfig::from_env().map_err(anyhow::Error::msg)?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to Postgres")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("🗄️ Database migrations applied");

    let publisher: Arc<dyn PublishSink> = match config.publish.sink {
        PublishSinkKind::PgNotify => {
            tracing::info!("📣 Publishing risk events via pg_notify on '{}'", config.publish.channel);
            Arc::new(PgNotifyPublisher::new(pool.clone(), config.publish.channel.clone()))
        }
        PublishSinkKind::Broadcast => {
            tracing::info!("📣 Publishing risk events to in-process subscribers");
            Arc::new(BroadcastPublisher::new(BROADCAST_CAPACITY))
        }
    };

    let store = Arc::new(PgStore::new(pool.clone()));
    let state = EngineState::build(store.clone(), store, publisher, &config);

    let cancel = CancellationToken::new();
    let context = JobContext {
        monitor: state.monitor.clone(),
        alerts: state.alerts.clone(),
        alert_retention_days: config.alert.cleanup_days,
        cancel: cancel.clone(),
    };
    let schedules = JobSchedules {
        monitor: config.monitor.schedule.clone(),
        alert_cleanup: config.alert.cleanup_schedule.clone(),
    };

    let mut scheduler = JobSchedulerService::new(pool.clone(), context, schedules).await?;
    scheduler.start().await?;

    tracing::info!("🚀 Risk monitor running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("🛑 Shutdown signal received");
    scheduler.stop().await?;
    pool.close().await;
    tracing::info!("👋 Risk monitor stopped");

    Ok(())
}
