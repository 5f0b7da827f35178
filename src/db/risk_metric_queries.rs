use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::decode_error;
use crate::models::{MetricDetails, MetricType, RiskHistory, RiskMetric};

#[derive(Debug, sqlx::FromRow)]
struct MetricRow {
    id: Uuid,
    portfolio_id: Uuid,
    metric_type: String,
    value: f64,
    threshold: f64,
    status: String,
    confidence_level: Option<f64>,
    time_horizon_days: Option<i32>,
    calculated_at: DateTime<Utc>,
    details: Json<MetricDetails>,
}

impl TryFrom<MetricRow> for RiskMetric {
    type Error = sqlx::Error;

    fn try_from(row: MetricRow) -> Result<Self, Self::Error> {
        Ok(RiskMetric {
            id: row.id,
            portfolio_id: row.portfolio_id,
            metric_type: row.metric_type.parse().map_err(decode_error)?,
            value: row.value,
            threshold: row.threshold,
            status: row.status.parse().map_err(decode_error)?,
            confidence_level: row.confidence_level,
            time_horizon_days: row.time_horizon_days.map(|d| d.max(0) as u32),
            calculated_at: row.calculated_at,
            details: row.details.0,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    id: Uuid,
    portfolio_id: Uuid,
    metric_type: String,
    value: f64,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for RiskHistory {
    type Error = sqlx::Error;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        Ok(RiskHistory {
            id: row.id,
            portfolio_id: row.portfolio_id,
            metric_type: row.metric_type.parse().map_err(decode_error)?,
            value: row.value,
            recorded_at: row.recorded_at,
        })
    }
}

pub async fn insert_metric(pool: &PgPool, metric: &RiskMetric) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO risk_metrics (
            id, portfolio_id, metric_type, value, threshold, status,
            confidence_level, time_horizon_days, calculated_at, details
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(metric.id)
    .bind(metric.portfolio_id)
    .bind(metric.metric_type.as_str())
    .bind(metric.value)
    .bind(metric.threshold)
    .bind(metric.status.as_str())
    .bind(metric.confidence_level)
    .bind(metric.time_horizon_days.map(|d| d as i32))
    .bind(metric.calculated_at)
    .bind(Json(&metric.details))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn insert_history(pool: &PgPool, point: &RiskHistory) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO risk_history (id, portfolio_id, metric_type, value, recorded_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(point.id)
    .bind(point.portfolio_id)
    .bind(point.metric_type.as_str())
    .bind(point.value)
    .bind(point.recorded_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn fetch_history(
    pool: &PgPool,
    portfolio_id: Uuid,
    metric_type: Option<MetricType>,
    limit: i64,
) -> Result<Vec<RiskHistory>, sqlx::Error> {
    let rows = sqlx::query_as::<_, HistoryRow>(
        r#"
        SELECT id, portfolio_id, metric_type, value, recorded_at
        FROM risk_history
        WHERE portfolio_id = $1
          AND ($2::text IS NULL OR metric_type = $2)
        ORDER BY recorded_at DESC
        LIMIT $3
        "#,
    )
    .bind(portfolio_id)
    .bind(metric_type.map(|t| t.as_str()))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(RiskHistory::try_from).collect()
}

pub async fn fetch_latest(pool: &PgPool, portfolio_id: Uuid) -> Result<Vec<RiskMetric>, sqlx::Error> {
    let rows = sqlx::query_as::<_, MetricRow>(
        r#"
        SELECT DISTINCT ON (metric_type)
            id, portfolio_id, metric_type, value, threshold, status,
            confidence_level, time_horizon_days, calculated_at, details
        FROM risk_metrics
        WHERE portfolio_id = $1
        ORDER BY metric_type, calculated_at DESC
        "#,
    )
    .bind(portfolio_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(RiskMetric::try_from).collect()
}
