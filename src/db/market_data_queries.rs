use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::{MarketDepth, MarketQuote};

#[derive(Debug, sqlx::FromRow)]
struct QuoteRow {
    symbol: String,
    average_daily_volume: f64,
    bid_ask_spread: f64,
    market_cap: f64,
    depth: Option<Json<MarketDepth>>,
}

impl From<QuoteRow> for MarketQuote {
    fn from(row: QuoteRow) -> Self {
        MarketQuote {
            symbol: row.symbol,
            average_daily_volume: row.average_daily_volume.max(0.0),
            bid_ask_spread: row.bid_ask_spread.max(0.0),
            market_cap: row.market_cap.max(0.0),
            depth: row.depth.map(|d| d.0),
        }
    }
}

pub async fn fetch_quote(pool: &PgPool, symbol: &str) -> Result<Option<MarketQuote>, sqlx::Error> {
    let row = sqlx::query_as::<_, QuoteRow>(
        r#"
        SELECT symbol, average_daily_volume, bid_ask_spread, market_cap, depth
        FROM market_data
        WHERE symbol = $1
        "#,
    )
    .bind(symbol)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(MarketQuote::from))
}
