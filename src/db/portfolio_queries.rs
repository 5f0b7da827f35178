use bigdecimal::BigDecimal;
use sqlx::PgPool;
use uuid::Uuid;

use super::decimal_to_f64;
use crate::models::{AssetType, Portfolio, Position};

#[derive(Debug, sqlx::FromRow)]
struct PortfolioRow {
    id: Uuid,
    name: String,
    currency: String,
    total_value: BigDecimal,
}

#[derive(Debug, sqlx::FromRow)]
struct PositionRow {
    id: Uuid,
    portfolio_id: Uuid,
    symbol: String,
    quantity: BigDecimal,
    average_price: BigDecimal,
    current_price: BigDecimal,
    market_value: BigDecimal,
    asset_type: String,
    liquidity: String,
}

impl From<PositionRow> for Position {
    fn from(row: PositionRow) -> Self {
        Position {
            id: row.id,
            portfolio_id: row.portfolio_id,
            symbol: row.symbol,
            quantity: decimal_to_f64(&row.quantity),
            average_price: decimal_to_f64(&row.average_price),
            current_price: decimal_to_f64(&row.current_price),
            market_value: decimal_to_f64(&row.market_value),
            asset_type: row.asset_type.parse().unwrap_or(AssetType::Other),
            liquidity: row.liquidity.parse().unwrap_or_default(),
        }
    }
}

pub async fn list_portfolio_ids(pool: &PgPool) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT id FROM portfolios
        ORDER BY created_at
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Portfolio with its positions. `RowNotFound` when the id is unknown.
pub async fn fetch_portfolio(pool: &PgPool, portfolio_id: Uuid) -> Result<Portfolio, sqlx::Error> {
    let row = sqlx::query_as::<_, PortfolioRow>(
        r#"
        SELECT id, name, currency, total_value
        FROM portfolios
        WHERE id = $1
        "#,
    )
    .bind(portfolio_id)
    .fetch_one(pool)
    .await?;

    let positions = sqlx::query_as::<_, PositionRow>(
        r#"
        SELECT
            id,
            portfolio_id,
            symbol,
            quantity,
            average_price,
            current_price,
            market_value,
            asset_type,
            liquidity
        FROM positions
        WHERE portfolio_id = $1
        ORDER BY symbol
        "#,
    )
    .bind(portfolio_id)
    .fetch_all(pool)
    .await?;

    Ok(Portfolio {
        id: row.id,
        name: row.name,
        total_value: decimal_to_f64(&row.total_value).max(0.0),
        currency: row.currency,
        positions: positions.into_iter().map(Position::from).collect(),
    })
}
