//! Alert Retention Job
//!
//! Runs daily (3:00 AM by default) and deletes RESOLVED and DISMISSED alerts
//! older than the configured retention. ACTIVE and ACKNOWLEDGED alerts are
//! never removed.

use tracing::info;

use crate::errors::AppError;
use crate::services::job_scheduler_service::{JobContext, JobResult};

pub async fn cleanup_closed_alerts(ctx: JobContext) -> Result<JobResult, AppError> {
    info!(
        "🧹 Cleaning up closed alerts older than {} days",
        ctx.alert_retention_days
    );

    let deleted = ctx.alerts.cleanup_old_alerts(ctx.alert_retention_days).await?;

    Ok(JobResult {
        items_processed: i32::try_from(deleted).unwrap_or(i32::MAX),
        items_failed: 0,
    })
}
