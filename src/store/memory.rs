use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{
    AlertStore, MetricStore, PortfolioStore, PriceHistoryStore, ThresholdStore, TransactionStore,
};
use crate::errors::AppError;
use crate::models::{
    Alert, AlertStatus, AlertType, MetricType, Portfolio, RiskHistory, RiskMetric,
    RiskThresholds, TradeRiskAnalysis, Transaction,
};

/// Process-local store backing tests and demos.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    portfolios: Arc<DashMap<Uuid, Portfolio>>,
    thresholds: Arc<DashMap<Uuid, RiskThresholds>>,
    metrics: Arc<RwLock<Vec<RiskMetric>>>,
    history: Arc<RwLock<Vec<RiskHistory>>>,
    alerts: Arc<DashMap<Uuid, Alert>>,
    transactions: Arc<DashMap<Uuid, Transaction>>,
    trade_risk: Arc<DashMap<Uuid, TradeRiskAnalysis>>,
    prices: Arc<DashMap<String, Vec<f64>>>,
    fail_history_writes: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_portfolio(&self, portfolio: Portfolio) {
        self.portfolios.insert(portfolio.id, portfolio);
    }

    pub fn set_thresholds(&self, thresholds: RiskThresholds) {
        self.thresholds.insert(thresholds.portfolio_id, thresholds);
    }

    pub fn set_price_history(&self, symbol: &str, prices: Vec<f64>) {
        self.prices.insert(symbol.to_string(), prices);
    }

    pub fn add_transaction(&self, tx: Transaction) {
        self.transactions.insert(tx.id, tx);
    }

    pub fn transaction(&self, id: Uuid) -> Option<Transaction> {
        self.transactions.get(&id).map(|t| t.value().clone())
    }

    pub fn trade_risk(&self, transaction_id: Uuid) -> Option<TradeRiskAnalysis> {
        self.trade_risk.get(&transaction_id).map(|a| a.value().clone())
    }

    /// Every stored alert of a portfolio, oldest first.
    pub fn alerts_for(&self, portfolio_id: Uuid) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self
            .alerts
            .iter()
            .filter(|a| a.portfolio_id == portfolio_id)
            .map(|a| a.value().clone())
            .collect();
        alerts.sort_by_key(|a| a.created_at);
        alerts
    }

    pub fn metrics_for(&self, portfolio_id: Uuid) -> Vec<RiskMetric> {
        self.metrics
            .read()
            .iter()
            .filter(|m| m.portfolio_id == portfolio_id)
            .cloned()
            .collect()
    }

    /// Makes RiskHistory writes fail, for exercising the warn-only path.
    pub fn fail_history_writes(&self, fail: bool) {
        self.fail_history_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PortfolioStore for InMemoryStore {
    async fn list_portfolio_ids(&self) -> Result<Vec<Uuid>, AppError> {
        Ok(self.portfolios.iter().map(|p| *p.key()).collect())
    }

    async fn get_portfolio(&self, portfolio_id: Uuid) -> Result<Portfolio, AppError> {
        self.portfolios
            .get(&portfolio_id)
            .map(|p| p.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("portfolio {}", portfolio_id)))
    }
}

#[async_trait]
impl ThresholdStore for InMemoryStore {
    async fn find_thresholds(&self, portfolio_id: Uuid) -> Result<Option<RiskThresholds>, AppError> {
        Ok(self.thresholds.get(&portfolio_id).map(|t| t.value().clone()))
    }

    async fn insert_thresholds(&self, thresholds: &RiskThresholds) -> Result<RiskThresholds, AppError> {
        let stored = self
            .thresholds
            .entry(thresholds.portfolio_id)
            .or_insert_with(|| thresholds.clone());
        Ok(stored.value().clone())
    }
}

#[async_trait]
impl MetricStore for InMemoryStore {
    async fn insert_metric(&self, metric: &RiskMetric) -> Result<(), AppError> {
        self.metrics.write().push(metric.clone());
        Ok(())
    }

    async fn insert_history(&self, point: &RiskHistory) -> Result<(), AppError> {
        if self.fail_history_writes.load(Ordering::SeqCst) {
            return Err(AppError::External("history write rejected".to_string()));
        }
        self.history.write().push(point.clone());
        Ok(())
    }

    async fn risk_history(
        &self,
        portfolio_id: Uuid,
        metric_type: Option<MetricType>,
        limit: i64,
    ) -> Result<Vec<RiskHistory>, AppError> {
        let mut points: Vec<RiskHistory> = self
            .history
            .read()
            .iter()
            .filter(|h| h.portfolio_id == portfolio_id)
            .filter(|h| metric_type.map_or(true, |t| h.metric_type == t))
            .cloned()
            .collect();
        points.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        points.truncate(limit.max(0) as usize);
        Ok(points)
    }

    async fn latest_metrics(&self, portfolio_id: Uuid) -> Result<Vec<RiskMetric>, AppError> {
        let mut latest: HashMap<MetricType, RiskMetric> = HashMap::new();
        for metric in self.metrics.read().iter().filter(|m| m.portfolio_id == portfolio_id) {
            let newer = latest
                .get(&metric.metric_type)
                .map_or(true, |existing| metric.calculated_at >= existing.calculated_at);
            if newer {
                latest.insert(metric.metric_type, metric.clone());
            }
        }
        let mut metrics: Vec<RiskMetric> = latest.into_values().collect();
        metrics.sort_by_key(|m| m.metric_type.as_str());
        Ok(metrics)
    }
}

#[async_trait]
impl AlertStore for InMemoryStore {
    async fn insert_alert(&self, alert: &Alert) -> Result<(), AppError> {
        self.alerts.insert(alert.id, alert.clone());
        Ok(())
    }

    async fn has_recent_active(
        &self,
        portfolio_id: Uuid,
        alert_type: AlertType,
        since: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        Ok(self.alerts.iter().any(|a| {
            a.portfolio_id == portfolio_id
                && a.alert_type == alert_type
                && a.status == AlertStatus::Active
                && a.created_at > since
        }))
    }

    async fn get_alert(&self, alert_id: Uuid) -> Result<Alert, AppError> {
        self.alerts
            .get(&alert_id)
            .map(|a| a.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("alert {}", alert_id)))
    }

    async fn update_alert(&self, alert: &Alert) -> Result<(), AppError> {
        match self.alerts.get_mut(&alert.id) {
            Some(mut entry) => {
                *entry = alert.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!("alert {}", alert.id))),
        }
    }

    async fn active_alerts(&self, portfolio_id: Uuid) -> Result<Vec<Alert>, AppError> {
        let mut alerts: Vec<Alert> = self
            .alerts
            .iter()
            .filter(|a| a.portfolio_id == portfolio_id && a.status == AlertStatus::Active)
            .map(|a| a.value().clone())
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(alerts)
    }

    async fn delete_closed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let before = self.alerts.len();
        self.alerts
            .retain(|_, a| !(a.status.is_terminal() && a.created_at < cutoff));
        Ok((before - self.alerts.len()) as u64)
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn recent_transactions(
        &self,
        portfolio_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, AppError> {
        let mut txs: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|t| t.portfolio_id == portfolio_id && t.created_at > since)
            .map(|t| t.value().clone())
            .collect();
        txs.sort_by_key(|t| t.created_at);
        Ok(txs)
    }

    async fn mark_aml_checked(&self, transaction_id: Uuid) -> Result<(), AppError> {
        match self.transactions.get_mut(&transaction_id) {
            Some(mut tx) => {
                tx.aml_checked = true;
                Ok(())
            }
            None => Err(AppError::NotFound(format!("transaction {}", transaction_id))),
        }
    }

    async fn record_trade_risk(&self, analysis: &TradeRiskAnalysis) -> Result<(), AppError> {
        self.trade_risk.insert(analysis.trade_id, analysis.clone());
        Ok(())
    }
}

#[async_trait]
impl PriceHistoryStore for InMemoryStore {
    async fn price_history(
        &self,
        symbols: &[String],
        days: i64,
    ) -> Result<HashMap<String, Vec<f64>>, AppError> {
        let keep = days.max(0) as usize;
        Ok(symbols
            .iter()
            .filter_map(|symbol| {
                self.prices.get(symbol).map(|prices| {
                    let start = prices.len().saturating_sub(keep);
                    (symbol.clone(), prices[start..].to_vec())
                })
            })
            .collect())
    }
}
