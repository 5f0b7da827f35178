use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    AlertStore, MetricStore, PortfolioStore, PriceHistoryStore, ThresholdStore, TransactionStore,
};
use crate::db::{
    alert_queries, market_data_queries, portfolio_queries, price_queries, risk_metric_queries,
    risk_threshold_queries, transaction_queries,
};
use crate::errors::AppError;
use crate::external::market_data::MarketDataProvider;
use crate::models::{
    Alert, AlertType, MarketDepth, MarketQuote, MetricType, Portfolio, RiskHistory, RiskMetric,
    RiskThresholds, TradeRiskAnalysis, Transaction,
};

/// Postgres-backed implementation of every store the engine needs.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PortfolioStore for PgStore {
    async fn list_portfolio_ids(&self) -> Result<Vec<Uuid>, AppError> {
        Ok(portfolio_queries::list_portfolio_ids(&self.pool).await?)
    }

    async fn get_portfolio(&self, portfolio_id: Uuid) -> Result<Portfolio, AppError> {
        portfolio_queries::fetch_portfolio(&self.pool, portfolio_id)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => {
                    AppError::NotFound(format!("portfolio {}", portfolio_id))
                }
                other => AppError::Db(other),
            })
    }
}

#[async_trait]
impl ThresholdStore for PgStore {
    async fn find_thresholds(&self, portfolio_id: Uuid) -> Result<Option<RiskThresholds>, AppError> {
        Ok(risk_threshold_queries::find_thresholds(&self.pool, portfolio_id).await?)
    }

    async fn insert_thresholds(&self, thresholds: &RiskThresholds) -> Result<RiskThresholds, AppError> {
        Ok(risk_threshold_queries::insert_thresholds(&self.pool, thresholds).await?)
    }
}

#[async_trait]
impl MetricStore for PgStore {
    async fn insert_metric(&self, metric: &RiskMetric) -> Result<(), AppError> {
        Ok(risk_metric_queries::insert_metric(&self.pool, metric).await?)
    }

    async fn insert_history(&self, point: &RiskHistory) -> Result<(), AppError> {
        Ok(risk_metric_queries::insert_history(&self.pool, point).await?)
    }

    async fn risk_history(
        &self,
        portfolio_id: Uuid,
        metric_type: Option<MetricType>,
        limit: i64,
    ) -> Result<Vec<RiskHistory>, AppError> {
        Ok(risk_metric_queries::fetch_history(&self.pool, portfolio_id, metric_type, limit).await?)
    }

    async fn latest_metrics(&self, portfolio_id: Uuid) -> Result<Vec<RiskMetric>, AppError> {
        Ok(risk_metric_queries::fetch_latest(&self.pool, portfolio_id).await?)
    }
}

#[async_trait]
impl AlertStore for PgStore {
    async fn insert_alert(&self, alert: &Alert) -> Result<(), AppError> {
        Ok(alert_queries::insert_alert(&self.pool, alert).await?)
    }

    async fn has_recent_active(
        &self,
        portfolio_id: Uuid,
        alert_type: AlertType,
        since: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        Ok(alert_queries::exists_recent_active(&self.pool, portfolio_id, alert_type, since).await?)
    }

    async fn get_alert(&self, alert_id: Uuid) -> Result<Alert, AppError> {
        alert_queries::fetch_alert(&self.pool, alert_id)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => AppError::NotFound(format!("alert {}", alert_id)),
                other => AppError::Db(other),
            })
    }

    async fn update_alert(&self, alert: &Alert) -> Result<(), AppError> {
        Ok(alert_queries::update_alert(&self.pool, alert).await?)
    }

    async fn active_alerts(&self, portfolio_id: Uuid) -> Result<Vec<Alert>, AppError> {
        Ok(alert_queries::fetch_active(&self.pool, portfolio_id).await?)
    }

    async fn delete_closed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        Ok(alert_queries::delete_closed_before(&self.pool, cutoff).await?)
    }
}

#[async_trait]
impl TransactionStore for PgStore {
    async fn recent_transactions(
        &self,
        portfolio_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, AppError> {
        Ok(transaction_queries::fetch_recent(&self.pool, portfolio_id, since).await?)
    }

    async fn mark_aml_checked(&self, transaction_id: Uuid) -> Result<(), AppError> {
        Ok(transaction_queries::mark_aml_checked(&self.pool, transaction_id).await?)
    }

    async fn record_trade_risk(&self, analysis: &TradeRiskAnalysis) -> Result<(), AppError> {
        Ok(transaction_queries::record_trade_risk(&self.pool, analysis).await?)
    }
}

#[async_trait]
impl PriceHistoryStore for PgStore {
    async fn price_history(
        &self,
        symbols: &[String],
        days: i64,
    ) -> Result<HashMap<String, Vec<f64>>, AppError> {
        Ok(price_queries::fetch_closes(&self.pool, symbols, days).await?)
    }
}

/// Market data read from the `market_data` table, one row per symbol.
#[async_trait]
impl MarketDataProvider for PgStore {
    async fn average_daily_volume(&self, symbol: &str) -> Result<f64, AppError> {
        Ok(self.quote(symbol).await?.average_daily_volume)
    }

    async fn bid_ask_spread(&self, symbol: &str) -> Result<f64, AppError> {
        Ok(self.quote(symbol).await?.bid_ask_spread)
    }

    async fn market_depth(&self, symbol: &str) -> Result<Option<MarketDepth>, AppError> {
        Ok(self.quote(symbol).await?.depth)
    }

    async fn market_cap(&self, symbol: &str) -> Result<f64, AppError> {
        Ok(self.quote(symbol).await?.market_cap)
    }

    async fn quote(&self, symbol: &str) -> Result<MarketQuote, AppError> {
        let quote = market_data_queries::fetch_quote(&self.pool, symbol).await?;
        Ok(quote.unwrap_or_else(|| MarketQuote::unknown(symbol)))
    }
}
