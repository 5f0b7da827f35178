//! Collaborator interfaces the engine reads from and writes to.
//!
//! Every service receives the stores it needs as `Arc<dyn ...>` so the same
//! engine runs against Postgres in production and [`memory::InMemoryStore`]
//! in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{
    Alert, AlertType, MetricType, Portfolio, RiskHistory, RiskMetric, RiskThresholds,
    TradeRiskAnalysis, Transaction,
};

pub mod memory;
pub mod postgres;

#[async_trait]
pub trait PortfolioStore: Send + Sync {
    async fn list_portfolio_ids(&self) -> Result<Vec<Uuid>, AppError>;

    /// Fresh snapshot with positions. `NotFound` when absent.
    async fn get_portfolio(&self, portfolio_id: Uuid) -> Result<Portfolio, AppError>;
}

#[async_trait]
pub trait ThresholdStore: Send + Sync {
    async fn find_thresholds(&self, portfolio_id: Uuid) -> Result<Option<RiskThresholds>, AppError>;

    /// Inserts unless a row for the portfolio already exists; returns the stored row.
    async fn insert_thresholds(&self, thresholds: &RiskThresholds) -> Result<RiskThresholds, AppError>;
}

/// Thresholds for a portfolio, created with defaults the first time they are asked for.
pub async fn get_or_create_thresholds(
    store: &dyn ThresholdStore,
    portfolio_id: Uuid,
) -> Result<RiskThresholds, AppError> {
    match store.find_thresholds(portfolio_id).await? {
        Some(thresholds) => Ok(thresholds),
        None => {
            store
                .insert_thresholds(&RiskThresholds::defaults_for(portfolio_id))
                .await
        }
    }
}

#[async_trait]
pub trait MetricStore: Send + Sync {
    async fn insert_metric(&self, metric: &RiskMetric) -> Result<(), AppError>;

    async fn insert_history(&self, point: &RiskHistory) -> Result<(), AppError>;

    /// Newest first.
    async fn risk_history(
        &self,
        portfolio_id: Uuid,
        metric_type: Option<MetricType>,
        limit: i64,
    ) -> Result<Vec<RiskHistory>, AppError>;

    /// Most recent metric of each type.
    async fn latest_metrics(&self, portfolio_id: Uuid) -> Result<Vec<RiskMetric>, AppError>;
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn insert_alert(&self, alert: &Alert) -> Result<(), AppError>;

    /// Whether an ACTIVE alert of this type was created after `since`.
    async fn has_recent_active(
        &self,
        portfolio_id: Uuid,
        alert_type: AlertType,
        since: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    async fn get_alert(&self, alert_id: Uuid) -> Result<Alert, AppError>;

    async fn update_alert(&self, alert: &Alert) -> Result<(), AppError>;

    /// ACTIVE alerts, newest first.
    async fn active_alerts(&self, portfolio_id: Uuid) -> Result<Vec<Alert>, AppError>;

    /// Deletes RESOLVED and DISMISSED alerts created before `cutoff`.
    async fn delete_closed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn recent_transactions(
        &self,
        portfolio_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, AppError>;

    async fn mark_aml_checked(&self, transaction_id: Uuid) -> Result<(), AppError>;

    /// Attaches a pre-trade verdict to the transaction record.
    async fn record_trade_risk(&self, analysis: &TradeRiskAnalysis) -> Result<(), AppError>;
}

#[async_trait]
pub trait PriceHistoryStore: Send + Sync {
    /// The last `days` closing prices per symbol, oldest first. Symbols
    /// without history are absent from the map.
    async fn price_history(
        &self,
        symbols: &[String],
        days: i64,
    ) -> Result<HashMap<String, Vec<f64>>, AppError>;
}
