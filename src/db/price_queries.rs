use std::collections::HashMap;

use bigdecimal::BigDecimal;
use sqlx::PgPool;

use super::decimal_to_f64;

#[derive(Debug, sqlx::FromRow)]
struct CloseRow {
    ticker: String,
    close_price: BigDecimal,
}

/// The last `days` closes for each ticker, oldest first.
pub async fn fetch_closes(
    pool: &PgPool,
    tickers: &[String],
    days: i64,
) -> Result<HashMap<String, Vec<f64>>, sqlx::Error> {
    if tickers.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = sqlx::query_as::<_, CloseRow>(
        r#"
        SELECT ticker, close_price
        FROM (
            SELECT
                ticker,
                date,
                close_price,
                ROW_NUMBER() OVER (PARTITION BY ticker ORDER BY date DESC) AS rn
            FROM price_history
            WHERE ticker = ANY($1)
        ) recent
        WHERE rn <= $2
        ORDER BY ticker, date ASC
        "#,
    )
    .bind(tickers)
    .bind(days)
    .fetch_all(pool)
    .await?;

    let mut closes: HashMap<String, Vec<f64>> = HashMap::new();
    for row in rows {
        closes
            .entry(row.ticker)
            .or_default()
            .push(decimal_to_f64(&row.close_price));
    }
    Ok(closes)
}
