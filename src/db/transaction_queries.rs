use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{decimal_to_f64, decode_error};
use crate::models::{TradeRiskAnalysis, Transaction};

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    portfolio_id: Uuid,
    symbol: String,
    side: String,
    quantity: BigDecimal,
    price: BigDecimal,
    amount: BigDecimal,
    stop_loss: Option<BigDecimal>,
    aml_checked: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = sqlx::Error;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Transaction {
            id: row.id,
            portfolio_id: row.portfolio_id,
            symbol: row.symbol,
            side: row.side.parse().map_err(decode_error)?,
            quantity: decimal_to_f64(&row.quantity),
            price: decimal_to_f64(&row.price),
            amount: decimal_to_f64(&row.amount),
            stop_loss: row.stop_loss.as_ref().map(decimal_to_f64),
            aml_checked: row.aml_checked,
            created_at: row.created_at,
        })
    }
}

/// Transactions created after `since`, newest first.
pub async fn fetch_recent(
    pool: &PgPool,
    portfolio_id: Uuid,
    since: DateTime<Utc>,
) -> Result<Vec<Transaction>, sqlx::Error> {
    let rows = sqlx::query_as::<_, TransactionRow>(
        r#"
        SELECT
            id, portfolio_id, symbol, side, quantity, price, amount,
            stop_loss, aml_checked, created_at
        FROM transactions
        WHERE portfolio_id = $1
          AND created_at > $2
        ORDER BY created_at DESC
        "#,
    )
    .bind(portfolio_id)
    .bind(since)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Transaction::try_from).collect()
}

pub async fn mark_aml_checked(pool: &PgPool, transaction_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE transactions
        SET aml_checked = TRUE
        WHERE id = $1
        "#,
    )
    .bind(transaction_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Stores the pre-trade verdict on the transaction row. A trade that was never
/// booked has no row and the update is a no-op.
pub async fn record_trade_risk(
    pool: &PgPool,
    analysis: &TradeRiskAnalysis,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE transactions
        SET risk_approved = $2,
            requires_review = $3,
            risk_violations = $4,
            risk_score = $5
        WHERE id = $1
        "#,
    )
    .bind(analysis.trade_id)
    .bind(analysis.approved)
    .bind(analysis.requires_review)
    .bind(Json(&analysis.violations))
    .bind(analysis.risk_score.round() as i32)
    .execute(pool)
    .await?;

    Ok(())
}
