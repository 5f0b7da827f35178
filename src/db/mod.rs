pub mod alert_queries;
pub mod market_data_queries;
pub mod portfolio_queries;
pub mod price_queries;
pub mod risk_metric_queries;
pub mod risk_threshold_queries;
pub mod transaction_queries;

use bigdecimal::{BigDecimal, ToPrimitive};

/// NUMERIC columns are read as BigDecimal and handed to the engine as f64.
pub(crate) fn decimal_to_f64(value: &BigDecimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

pub(crate) fn decode_error(message: String) -> sqlx::Error {
    sqlx::Error::Decode(message.into())
}
