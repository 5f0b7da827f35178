use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;

use crate::config::AppConfig;
use crate::external::market_data::MarketDataProvider;
use crate::external::publisher::PublishSink;
use crate::jobs::risk_monitor_job::{MonitorSettings, RiskMonitor};
use crate::services::alert_service::AlertEngine;
use crate::services::compliance_service::{AmlRules, ComplianceService};
use crate::services::liquidity_service::LiquidityCalculator;
use crate::services::risk_service::{RiskService, RiskStores};
use crate::services::trade_risk_service::{RiskThresholdEvaluator, TradeRiskDeps};
use crate::services::var_service::VarCalculator;
use crate::store::{
    AlertStore, MetricStore, PortfolioStore, PriceHistoryStore, ThresholdStore, TransactionStore,
};

/// Every store the engine talks to, in one type.
pub trait EngineStore:
    PortfolioStore + ThresholdStore + MetricStore + AlertStore + TransactionStore + PriceHistoryStore
{
}

impl<T> EngineStore for T where
    T: PortfolioStore + ThresholdStore + MetricStore + AlertStore + TransactionStore + PriceHistoryStore
{
}

/// The wired-up engine: one instance of each service sharing the same collaborators.
#[derive(Clone)]
pub struct EngineState {
    pub risk: RiskService,
    pub evaluator: RiskThresholdEvaluator,
    pub compliance: ComplianceService,
    pub alerts: AlertEngine,
    pub monitor: Arc<RiskMonitor>,
}

impl EngineState {
    pub fn build<S: EngineStore + 'static>(
        store: Arc<S>,
        market_data: Arc<dyn MarketDataProvider>,
        publisher: Arc<dyn PublishSink>,
        config: &AppConfig,
    ) -> Self {
        let var = VarCalculator::new(config.risk.monte_carlo_simulations);
        let liquidity = LiquidityCalculator::new(market_data);
        let alerts = AlertEngine::new(store.clone(), publisher.clone());

        let risk = RiskService::new(
            RiskStores {
                portfolios: store.clone(),
                thresholds: store.clone(),
                metrics: store.clone(),
                prices: store.clone(),
            },
            var.clone(),
            liquidity.clone(),
            config.risk.var_time_horizon_days,
            config.risk.var_history_days,
        );

        let evaluator = RiskThresholdEvaluator::new(
            TradeRiskDeps {
                portfolios: store.clone(),
                thresholds: store.clone(),
                prices: store.clone(),
                transactions: store.clone(),
                var,
                liquidity,
                alerts: alerts.clone(),
            },
            config.risk.var_history_days,
        );

        let compliance = ComplianceService::new(
            AmlRules {
                large_transaction: config.alert.aml_large_transaction,
                velocity_count: config.alert.aml_velocity_count,
                velocity_window: ChronoDuration::hours(24),
            },
            config.risk.position_limit_percent,
        );

        let monitor = Arc::new(RiskMonitor::new(
            store.clone(),
            store,
            risk.clone(),
            compliance.clone(),
            alerts.clone(),
            publisher,
            MonitorSettings {
                concurrency: config.monitor.concurrency,
                portfolio_timeout: Duration::from_secs(config.monitor.portfolio_timeout_secs),
            },
        ));

        Self {
            risk,
            evaluator,
            compliance,
            alerts,
            monitor,
        }
    }
}
