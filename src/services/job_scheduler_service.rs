use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::errors::AppError;
use crate::jobs::{alert_cleanup_job, risk_monitor_job::{self, RiskMonitor}};
use crate::services::alert_service::AlertEngine;

// Context passed to job functions
#[derive(Clone)]
pub struct JobContext {
    pub monitor: Arc<RiskMonitor>,
    pub alerts: AlertEngine,
    pub alert_retention_days: i64,
    pub cancel: CancellationToken,
}

/// Cron expressions (with a seconds field) for the recurring jobs.
#[derive(Debug, Clone)]
pub struct JobSchedules {
    pub monitor: String,
    pub alert_cleanup: String,
}

pub struct JobSchedulerService {
    scheduler: JobScheduler,
    context: JobContext,
    pool: PgPool,
    schedules: JobSchedules,
}

impl JobSchedulerService {
    pub async fn new(
        pool: PgPool,
        context: JobContext,
        schedules: JobSchedules,
    ) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::External(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self {
            scheduler,
            context,
            pool,
            schedules,
        })
    }

    /// Start all scheduled jobs
    pub async fn start(&mut self) -> Result<(), AppError> {
        info!("🚀 Starting job scheduler...");

        let monitor_schedule = self.schedules.monitor.clone();
        self.schedule_job(
            &monitor_schedule,
            "risk_monitor",
            "Portfolio VaR, liquidity, limits and AML",
            risk_monitor_job::monitor_all_portfolios,
        )
        .await?;

        let cleanup_schedule = self.schedules.alert_cleanup.clone();
        self.schedule_job(
            &cleanup_schedule,
            "alert_cleanup",
            "Delete resolved and dismissed alerts past retention",
            alert_cleanup_job::cleanup_closed_alerts,
        )
        .await?;

        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::External(format!("Failed to start scheduler: {}", e)))?;

        info!("✅ Job scheduler started successfully with 2 jobs");
        Ok(())
    }

    /// Cancels in-flight passes, then stops the scheduler.
    pub async fn stop(&mut self) -> Result<(), AppError> {
        info!("🛑 Stopping job scheduler...");
        self.context.cancel.cancel();
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::External(format!("Failed to stop scheduler: {}", e)))?;
        info!("✅ Job scheduler stopped");
        Ok(())
    }

    /// Helper to schedule a job with tracking
    async fn schedule_job<F, Fut>(
        &mut self,
        schedule: &str,
        job_name: &'static str,
        description: &str,
        job_fn: F,
    ) -> Result<(), AppError>
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<JobResult, AppError>> + Send + 'static,
    {
        let context = self.context.clone();
        let pool = self.pool.clone();
        let job_fn = Arc::new(job_fn);

        let job = Job::new_async(schedule, move |_uuid, _l| {
            let context = context.clone();
            let pool = pool.clone();
            let job_fn = job_fn.clone();
            Box::pin(async move {
                execute_job_with_tracking(&pool, job_name, context, job_fn).await;
            })
        })
        .map_err(|e| AppError::External(format!("Failed to create job {}: {}", job_name, e)))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::External(format!("Failed to add job {}: {}", job_name, e)))?;

        info!("📅 Scheduled: {} - {} [cron: {}]", job_name, description, schedule);
        Ok(())
    }
}

// Job tracking wrapper
async fn execute_job_with_tracking<F, Fut>(
    pool: &PgPool,
    job_name: &str,
    context: JobContext,
    job_fn: Arc<F>,
) where
    F: Fn(JobContext) -> Fut,
    Fut: std::future::Future<Output = Result<JobResult, AppError>>,
{
    if context.cancel.is_cancelled() {
        return;
    }

    info!("🏃 Starting job: {}", job_name);
    let started_at = Utc::now();

    // A tracking failure should not cost us a monitor pass
    let job_id = match record_job_start(pool, job_name).await {
        Ok(id) => Some(id),
        Err(e) => {
            error!("Failed to record job start: {}", e);
            None
        }
    };

    let result = job_fn(context).await;

    let duration_ms = (Utc::now() - started_at).num_milliseconds();

    match result {
        Ok(job_result) => {
            info!(
                "✅ Job completed: {} (processed: {}, failed: {}, duration: {}ms)",
                job_name, job_result.items_processed, job_result.items_failed, duration_ms
            );

            if let Some(job_id) = job_id {
                if let Err(e) = record_job_success(pool, job_id, &job_result, duration_ms).await {
                    error!("Failed to record job success: {}", e);
                }
            }
        }
        Err(e) => {
            error!("❌ Job failed: {} - {}", job_name, e);

            if let Some(job_id) = job_id {
                if let Err(e) = record_job_failure(pool, job_id, &e.to_string(), duration_ms).await {
                    error!("Failed to record job failure: {}", e);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobResult {
    pub items_processed: i32,
    pub items_failed: i32,
}

// Database functions for job tracking
async fn record_job_start(pool: &PgPool, job_name: &str) -> Result<i32, AppError> {
    let id: i32 = sqlx::query_scalar(
        r#"
        INSERT INTO job_runs (job_name, status)
        VALUES ($1, 'running'::job_status)
        RETURNING id
        "#,
    )
    .bind(job_name)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

async fn record_job_success(
    pool: &PgPool,
    job_id: i32,
    result: &JobResult,
    duration_ms: i64,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE job_runs
        SET completed_at = NOW(),
            status = 'success'::job_status,
            items_processed = $2,
            items_failed = $3,
            duration_ms = $4
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .bind(result.items_processed)
    .bind(result.items_failed)
    .bind(duration_ms)
    .execute(pool)
    .await?;

    Ok(())
}

async fn record_job_failure(
    pool: &PgPool,
    job_id: i32,
    error_message: &str,
    duration_ms: i64,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE job_runs
        SET completed_at = NOW(),
            status = 'failed'::job_status,
            error_message = $2,
            duration_ms = $3
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .bind(error_message)
    .bind(duration_ms)
    .execute(pool)
    .await?;

    Ok(())
}
