use sqlx::PgPool;
use uuid::Uuid;

use crate::models::RiskThresholds;

const THRESHOLD_COLUMNS: &str = r#"
    id,
    portfolio_id,
    max_var_95,
    max_var_99,
    max_position_size,
    max_single_asset_exposure,
    max_sector_exposure,
    min_liquidity_ratio,
    max_leverage,
    max_concentration,
    max_daily_loss,
    max_weekly_loss,
    max_drawdown,
    require_stop_loss,
    max_stop_loss_distance,
    created_at,
    updated_at
"#;

pub async fn find_thresholds(
    pool: &PgPool,
    portfolio_id: Uuid,
) -> Result<Option<RiskThresholds>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM risk_thresholds WHERE portfolio_id = $1",
        THRESHOLD_COLUMNS
    );
    sqlx::query_as::<_, RiskThresholds>(&sql)
        .bind(portfolio_id)
        .fetch_optional(pool)
        .await
}

/// Insert thresholds for a portfolio. If a concurrent evaluation created them
/// first, the existing row wins and is returned.
pub async fn insert_thresholds(
    pool: &PgPool,
    t: &RiskThresholds,
) -> Result<RiskThresholds, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO risk_thresholds (
            id, portfolio_id,
            max_var_95, max_var_99,
            max_position_size, max_single_asset_exposure, max_sector_exposure,
            min_liquidity_ratio, max_leverage, max_concentration,
            max_daily_loss, max_weekly_loss, max_drawdown,
            require_stop_loss, max_stop_loss_distance,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        ON CONFLICT (portfolio_id) DO NOTHING
        "#,
    )
    .bind(t.id)
    .bind(t.portfolio_id)
    .bind(t.max_var_95)
    .bind(t.max_var_99)
    .bind(t.max_position_size)
    .bind(t.max_single_asset_exposure)
    .bind(t.max_sector_exposure)
    .bind(t.min_liquidity_ratio)
    .bind(t.max_leverage)
    .bind(t.max_concentration)
    .bind(t.max_daily_loss)
    .bind(t.max_weekly_loss)
    .bind(t.max_drawdown)
    .bind(t.require_stop_loss)
    .bind(t.max_stop_loss_distance)
    .bind(t.created_at)
    .bind(t.updated_at)
    .execute(pool)
    .await?;

    find_thresholds(pool, t.portfolio_id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
}
