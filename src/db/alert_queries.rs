use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::decode_error;
use crate::models::{Alert, AlertContext, AlertStatus, AlertType};

#[derive(Debug, sqlx::FromRow)]
struct AlertRow {
    id: Uuid,
    portfolio_id: Uuid,
    alert_type: String,
    severity: String,
    title: String,
    description: String,
    source: String,
    status: String,
    triggered_by: Json<AlertContext>,
    resolution: Option<String>,
    acknowledged_by: Option<Uuid>,
    acknowledged_at: Option<DateTime<Utc>>,
    resolved_by: Option<Uuid>,
    resolved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AlertRow> for Alert {
    type Error = sqlx::Error;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        Ok(Alert {
            id: row.id,
            portfolio_id: row.portfolio_id,
            alert_type: row.alert_type.parse().map_err(decode_error)?,
            severity: row.severity.parse().map_err(decode_error)?,
            title: row.title,
            description: row.description,
            source: row.source,
            status: row.status.parse().map_err(decode_error)?,
            triggered_by: row.triggered_by.0,
            resolution: row.resolution,
            acknowledged_by: row.acknowledged_by,
            acknowledged_at: row.acknowledged_at,
            resolved_by: row.resolved_by,
            resolved_at: row.resolved_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const ALERT_COLUMNS: &str = r#"
    id, portfolio_id, alert_type, severity, title, description, source, status,
    triggered_by, resolution, acknowledged_by, acknowledged_at,
    resolved_by, resolved_at, created_at, updated_at
"#;

pub async fn insert_alert(pool: &PgPool, alert: &Alert) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO alerts (
            id, portfolio_id, alert_type, severity, title, description, source, status,
            triggered_by, resolution, acknowledged_by, acknowledged_at,
            resolved_by, resolved_at, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        "#,
    )
    .bind(alert.id)
    .bind(alert.portfolio_id)
    .bind(alert.alert_type.as_str())
    .bind(alert.severity.as_str())
    .bind(&alert.title)
    .bind(&alert.description)
    .bind(&alert.source)
    .bind(alert.status.as_str())
    .bind(Json(&alert.triggered_by))
    .bind(&alert.resolution)
    .bind(alert.acknowledged_by)
    .bind(alert.acknowledged_at)
    .bind(alert.resolved_by)
    .bind(alert.resolved_at)
    .bind(alert.created_at)
    .bind(alert.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn exists_recent_active(
    pool: &PgPool,
    portfolio_id: Uuid,
    alert_type: AlertType,
    since: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM alerts
            WHERE portfolio_id = $1
              AND alert_type = $2
              AND status = $3
              AND created_at > $4
        )
        "#,
    )
    .bind(portfolio_id)
    .bind(alert_type.as_str())
    .bind(AlertStatus::Active.as_str())
    .bind(since)
    .fetch_one(pool)
    .await
}

pub async fn fetch_alert(pool: &PgPool, alert_id: Uuid) -> Result<Alert, sqlx::Error> {
    let sql = format!("SELECT {} FROM alerts WHERE id = $1", ALERT_COLUMNS);
    let row = sqlx::query_as::<_, AlertRow>(&sql)
        .bind(alert_id)
        .fetch_one(pool)
        .await?;

    Alert::try_from(row)
}

/// Persists the lifecycle fields of an alert.
pub async fn update_alert(pool: &PgPool, alert: &Alert) -> Result<(), sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE alerts
        SET status = $2,
            resolution = $3,
            acknowledged_by = $4,
            acknowledged_at = $5,
            resolved_by = $6,
            resolved_at = $7,
            updated_at = $8
        WHERE id = $1
        "#,
    )
    .bind(alert.id)
    .bind(alert.status.as_str())
    .bind(&alert.resolution)
    .bind(alert.acknowledged_by)
    .bind(alert.acknowledged_at)
    .bind(alert.resolved_by)
    .bind(alert.resolved_at)
    .bind(alert.updated_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(sqlx::Error::RowNotFound);
    }
    Ok(())
}

pub async fn fetch_active(pool: &PgPool, portfolio_id: Uuid) -> Result<Vec<Alert>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM alerts WHERE portfolio_id = $1 AND status = $2 ORDER BY created_at DESC",
        ALERT_COLUMNS
    );
    let rows = sqlx::query_as::<_, AlertRow>(&sql)
        .bind(portfolio_id)
        .bind(AlertStatus::Active.as_str())
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(Alert::try_from).collect()
}

pub async fn delete_closed_before(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM alerts
        WHERE status IN ($1, $2)
          AND created_at < $3
        "#,
    )
    .bind(AlertStatus::Resolved.as_str())
    .bind(AlertStatus::Dismissed.as_str())
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
