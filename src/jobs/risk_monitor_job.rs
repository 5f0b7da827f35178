//! Periodic Risk Monitor Job
//!
//! Runs on the monitor schedule (every 30 seconds by default) and re-evaluates
//! every portfolio:
//!
//! 1. VaR and liquidity metrics are recomputed and persisted
//! 2. RISK_BREACH / LIQUIDITY_RISK alerts are raised for WARNING and CRITICAL results
//! 3. Position limits are checked (COMPLIANCE_VIOLATION)
//! 4. The last 24 hours of transactions are screened for large amounts and velocity
//! 5. A compact `risk_update` event is published
//!
//! Portfolios are fanned out to a bounded number of concurrent evaluations.
//! One portfolio failing, timing out or being cancelled never stops the others.
//! A pass that is still running when the next tick fires is skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::external::publisher::PublishSink;
use crate::models::{NewAlert, Portfolio, PublishEvent, RiskUpdate};
use crate::services::alert_service::{
    large_transaction_alert, liquidity_alert, position_limit_alert, var_status_alert,
    velocity_alert, AlertEngine,
};
use crate::services::compliance_service::{count_since, ComplianceService};
use crate::services::job_scheduler_service::{JobContext, JobResult};
use crate::services::risk_service::RiskService;
use crate::store::{PortfolioStore, TransactionStore};

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub concurrency: usize,
    pub portfolio_timeout: StdDuration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            portfolio_timeout: StdDuration::from_secs(20),
        }
    }
}

/// What one portfolio evaluation produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioSummary {
    pub portfolio_id: Uuid,
    pub var_95: Option<f64>,
    pub liquidity_ratio: Option<f64>,
    pub alerts_raised: usize,
}

pub struct RiskMonitor {
    portfolios: Arc<dyn PortfolioStore>,
    transactions: Arc<dyn TransactionStore>,
    risk: RiskService,
    compliance: ComplianceService,
    alerts: AlertEngine,
    publisher: Arc<dyn PublishSink>,
    settings: MonitorSettings,
    running: AtomicBool,
}

/// Clears the running flag when a pass ends, however it ends.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RiskMonitor {
    pub fn new(
        portfolios: Arc<dyn PortfolioStore>,
        transactions: Arc<dyn TransactionStore>,
        risk: RiskService,
        compliance: ComplianceService,
        alerts: AlertEngine,
        publisher: Arc<dyn PublishSink>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            portfolios,
            transactions,
            risk,
            compliance,
            alerts,
            publisher,
            settings,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// One pass over every portfolio.
    pub async fn run_pass(&self, cancel: &CancellationToken) -> Result<JobResult, AppError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("⏭️ Previous risk monitor pass still running, skipping this tick");
            return Ok(JobResult::default());
        }
        let _guard = PassGuard(&self.running);

        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let portfolio_ids = self.portfolios.list_portfolio_ids().await?;
        if portfolio_ids.is_empty() {
            debug!("No portfolios to monitor");
            return Ok(JobResult::default());
        }

        info!("🔍 Monitoring {} portfolios", portfolio_ids.len());

        let concurrency = self.settings.concurrency.max(1);
        let results: Vec<(Uuid, Result<PortfolioSummary, AppError>)> = stream::iter(portfolio_ids)
            .map(|portfolio_id| async move {
                (portfolio_id, self.evaluate_with_deadline(portfolio_id, cancel).await)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut result = JobResult::default();
        for (portfolio_id, outcome) in results {
            match outcome {
                Ok(summary) => {
                    result.items_processed += 1;
                    debug!(
                        portfolio_id = %portfolio_id,
                        alerts = summary.alerts_raised,
                        "Portfolio evaluated"
                    );
                }
                Err(AppError::Cancelled) => {
                    result.items_failed += 1;
                    debug!("Evaluation of portfolio {} cancelled", portfolio_id);
                }
                Err(e) => {
                    result.items_failed += 1;
                    error!("❌ Failed to monitor portfolio {}: {}", portfolio_id, e);
                }
            }
        }

        if cancel.is_cancelled() {
            info!("🛑 Risk monitor pass cancelled");
        }
        Ok(result)
    }

    async fn evaluate_with_deadline(
        &self,
        portfolio_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<PortfolioSummary, AppError> {
        let deadline = self.settings.portfolio_timeout;
        tokio::select! {
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            outcome = tokio::time::timeout(deadline, self.evaluate_portfolio(portfolio_id)) => {
                outcome.map_err(|_| {
                    AppError::Timeout(format!("portfolio {} after {:?}", portfolio_id, deadline))
                })?
            }
        }
    }

    /// Metrics, alerts and the `risk_update` event for a single portfolio.
    pub async fn evaluate_portfolio(&self, portfolio_id: Uuid) -> Result<PortfolioSummary, AppError> {
        let portfolio = self.portfolios.get_portfolio(portfolio_id).await?;
        let mut summary = PortfolioSummary {
            portfolio_id,
            var_95: None,
            liquidity_ratio: None,
            alerts_raised: 0,
        };

        if portfolio.is_empty() {
            debug!("Portfolio {} has no positions, skipping metrics", portfolio_id);
        } else {
            self.check_var(&mut summary).await?;
            self.check_liquidity(&mut summary).await?;
            self.check_position_limits(&portfolio, &mut summary).await?;
        }
        self.check_transactions(&mut summary).await?;

        self.publish_update(&summary).await;
        Ok(summary)
    }

    async fn check_var(&self, summary: &mut PortfolioSummary) -> Result<(), AppError> {
        let assessment = match self.risk.calculate_portfolio_var(summary.portfolio_id).await {
            Ok(assessment) => assessment,
            Err(AppError::InsufficientData(reason)) => {
                debug!(
                    "Skipping VaR for portfolio {}: {}",
                    summary.portfolio_id, reason
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        summary.var_95 = Some(assessment.result.var_95);
        if let Some(alert) = var_status_alert(
            summary.portfolio_id,
            &assessment.result,
            assessment.metric.threshold,
            assessment.metric.status,
        ) {
            self.raise(alert, summary).await?;
        }
        Ok(())
    }

    async fn check_liquidity(&self, summary: &mut PortfolioSummary) -> Result<(), AppError> {
        let assessment = self
            .risk
            .calculate_portfolio_liquidity(summary.portfolio_id)
            .await?;

        summary.liquidity_ratio = Some(assessment.result.liquidity_ratio);
        if let Some(alert) = liquidity_alert(summary.portfolio_id, &assessment.result, assessment.risk) {
            self.raise(alert, summary).await?;
        }
        Ok(())
    }

    async fn check_position_limits(
        &self,
        portfolio: &Portfolio,
        summary: &mut PortfolioSummary,
    ) -> Result<(), AppError> {
        let limits = self
            .compliance
            .check_position_limits(portfolio, self.compliance.position_limit_percent());
        if let Some(alert) = position_limit_alert(&limits) {
            self.raise(alert, summary).await?;
        }
        Ok(())
    }

    async fn check_transactions(&self, summary: &mut PortfolioSummary) -> Result<(), AppError> {
        let rules = self.compliance.rules();
        let since = Utc::now() - rules.velocity_window;
        let recent = self
            .transactions
            .recent_transactions(summary.portfolio_id, since)
            .await?;

        for tx in recent
            .iter()
            .filter(|tx| tx.amount > rules.large_transaction && !tx.aml_checked)
        {
            // Suppressed ones stay unchecked and are screened again next pass
            if self
                .raise(large_transaction_alert(tx, rules.large_transaction), summary)
                .await?
            {
                self.transactions.mark_aml_checked(tx.id).await?;
            }
        }

        let count = count_since(&recent, since);
        if count > rules.velocity_count {
            self.raise(
                velocity_alert(summary.portfolio_id, count, rules.velocity_count),
                summary,
            )
            .await?;
        }
        Ok(())
    }

    /// Whether a new alert was stored.
    async fn raise(
        &self,
        alert: NewAlert,
        summary: &mut PortfolioSummary,
    ) -> Result<bool, AppError> {
        let created = self.alerts.raise(alert).await?.created().is_some();
        if created {
            summary.alerts_raised += 1;
        }
        Ok(created)
    }

    async fn publish_update(&self, summary: &PortfolioSummary) {
        let update = RiskUpdate {
            portfolio_id: summary.portfolio_id,
            var: summary.var_95,
            liquidity: summary.liquidity_ratio,
            timestamp: Utc::now().timestamp(),
        };
        let event = match PublishEvent::risk_update(&update) {
            Ok(event) => event,
            Err(e) => {
                warn!("Failed to encode risk update for {}: {}", summary.portfolio_id, e);
                return;
            }
        };
        if let Err(e) = self.publisher.publish(&event).await {
            warn!("Failed to publish risk update for {}: {}", summary.portfolio_id, e);
        }
    }
}

/// Scheduler entry point.
pub async fn monitor_all_portfolios(ctx: JobContext) -> Result<JobResult, AppError> {
    info!("📡 Starting risk monitor pass");
    ctx.monitor.run_pass(&ctx.cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::market_data::StaticMarketData;
    use crate::external::publisher::MemoryPublisher;
    use crate::models::{
        AlertType, AssetType, EventType, MarketQuote, MetricType, Position, RiskThresholds,
        TradeSide, Transaction,
    };
    use crate::services::compliance_service::AmlRules;
    use crate::services::liquidity_service::LiquidityCalculator;
    use crate::services::risk_service::RiskStores;
    use crate::services::var_service::VarCalculator;
    use crate::store::memory::InMemoryStore;
    use crate::store::{MetricStore, PriceHistoryStore};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct Fixture {
        monitor: RiskMonitor,
        store: InMemoryStore,
        publisher: MemoryPublisher,
    }

    /// Price feed that is always down.
    struct UnreachablePrices;

    #[async_trait]
    impl PriceHistoryStore for UnreachablePrices {
        async fn price_history(
            &self,
            _symbols: &[String],
            _days: i64,
        ) -> Result<HashMap<String, Vec<f64>>, AppError> {
            Err(AppError::External("price feed down".to_string()))
        }
    }

    /// Lists one extra portfolio id that cannot be loaded.
    struct ListsUnknownPortfolio {
        inner: Arc<InMemoryStore>,
        unknown: Uuid,
    }

    #[async_trait]
    impl PortfolioStore for ListsUnknownPortfolio {
        async fn list_portfolio_ids(&self) -> Result<Vec<Uuid>, AppError> {
            let mut ids = self.inner.list_portfolio_ids().await?;
            ids.push(self.unknown);
            Ok(ids)
        }

        async fn get_portfolio(&self, portfolio_id: Uuid) -> Result<Portfolio, AppError> {
            if portfolio_id == self.unknown {
                return Err(AppError::External("portfolio service unavailable".to_string()));
            }
            self.inner.get_portfolio(portfolio_id).await
        }
    }

    fn fixture(quotes: Vec<MarketQuote>) -> Fixture {
        fixture_with(InMemoryStore::new(), quotes, None, None)
    }

    fn fixture_with(
        store: InMemoryStore,
        quotes: Vec<MarketQuote>,
        portfolios: Option<Arc<dyn PortfolioStore>>,
        prices: Option<Arc<dyn PriceHistoryStore>>,
    ) -> Fixture {
        let publisher = MemoryPublisher::new();
        let shared = Arc::new(store.clone());
        let market = Arc::new(StaticMarketData::with_quotes(quotes));
        let portfolios: Arc<dyn PortfolioStore> = match portfolios {
            Some(portfolios) => portfolios,
            None => shared.clone(),
        };
        let prices: Arc<dyn PriceHistoryStore> = match prices {
            Some(prices) => prices,
            None => shared.clone(),
        };

        let risk = RiskService::new(
            RiskStores {
                portfolios: shared.clone(),
                thresholds: shared.clone(),
                metrics: shared.clone(),
                prices,
            },
            VarCalculator::new(500).with_seed(7),
            LiquidityCalculator::new(market),
            1,
            252,
        );
        let alerts = AlertEngine::new(shared.clone(), Arc::new(publisher.clone()));
        let monitor = RiskMonitor::new(
            portfolios,
            shared,
            risk,
            ComplianceService::new(AmlRules::default(), 25.0),
            alerts,
            Arc::new(publisher.clone()),
            MonitorSettings::default(),
        );

        Fixture {
            monitor,
            store,
            publisher,
        }
    }

    fn liquid_quote(symbol: &str) -> MarketQuote {
        MarketQuote {
            symbol: symbol.to_string(),
            average_daily_volume: 50_000_000.0,
            bid_ask_spread: 0.0005,
            market_cap: 2_000_000_000_000.0,
            depth: None,
        }
    }

    #[tokio::test]
    async fn test_pass_publishes_update_per_portfolio() {
        let fx = fixture(vec![liquid_quote("AAPL"), liquid_quote("MSFT")]);
        for _ in 0..3 {
            fx.store.upsert_portfolio(Portfolio::new(
                "Balanced",
                vec![
                    Position::new(Uuid::nil(), "AAPL", 10.0, 100.0, 100.0, AssetType::Stock),
                    Position::new(Uuid::nil(), "MSFT", 10.0, 100.0, 100.0, AssetType::Stock),
                ],
            ));
        }

        let result = fx.monitor.run_pass(&CancellationToken::new()).await.unwrap();
        assert_eq!(result.items_processed, 3);
        assert_eq!(result.items_failed, 0);

        let updates: Vec<_> = fx
            .publisher
            .events()
            .into_iter()
            .filter(|e| e.event_type == EventType::RiskUpdate)
            .collect();
        assert_eq!(updates.len(), 3);
        // No price history, so VaR is skipped but liquidity is still reported
        assert!(updates[0].data["var"].is_null());
        assert!(updates[0].data["liquidity"].as_f64().is_some());
    }

    #[tokio::test]
    async fn test_concentrated_portfolio_raises_compliance_alert_once() {
        let fx = fixture(vec![liquid_quote("AAPL"), liquid_quote("TLT")]);
        let portfolio = Portfolio::new(
            "Concentrated",
            vec![
                Position::new(Uuid::nil(), "AAPL", 90.0, 100.0, 100.0, AssetType::Stock),
                Position::new(Uuid::nil(), "TLT", 10.0, 100.0, 100.0, AssetType::GovernmentBond),
            ],
        );
        let pid = portfolio.id;
        fx.store.upsert_portfolio(portfolio);

        fx.monitor.run_pass(&CancellationToken::new()).await.unwrap();
        fx.monitor.run_pass(&CancellationToken::new()).await.unwrap();

        let compliance: Vec<_> = fx
            .store
            .alerts_for(pid)
            .into_iter()
            .filter(|a| a.alert_type == AlertType::ComplianceViolation)
            .collect();
        assert_eq!(compliance.len(), 1);
    }

    #[tokio::test]
    async fn test_large_transactions_are_marked_checked() {
        let fx = fixture(vec![liquid_quote("AAPL")]);
        let portfolio = Portfolio::new(
            "Trading",
            vec![Position::new(Uuid::nil(), "AAPL", 10.0, 100.0, 100.0, AssetType::Stock)],
        );
        let pid = portfolio.id;
        fx.store.upsert_portfolio(portfolio);
        fx.store.set_thresholds(RiskThresholds::defaults_for(pid));

        let large = Transaction::new(pid, "AAPL", TradeSide::Buy, 100.0, 150.0);
        let small = Transaction::new(pid, "AAPL", TradeSide::Buy, 1.0, 150.0);
        let (large_id, small_id) = (large.id, small.id);
        fx.store.add_transaction(large);
        fx.store.add_transaction(small);

        let summary = fx.monitor.evaluate_portfolio(pid).await.unwrap();
        assert!(summary.alerts_raised >= 1);
        assert!(fx.store.transaction(large_id).unwrap().aml_checked);
        assert!(!fx.store.transaction(small_id).unwrap().aml_checked);

        let aml_events = fx
            .publisher
            .events()
            .into_iter()
            .filter(|e| e.event_type == EventType::AmlAlert)
            .count();
        assert_eq!(aml_events, 1);
    }

    #[tokio::test]
    async fn test_velocity_alert_over_limit() {
        let fx = fixture(Vec::new());
        let portfolio = Portfolio::new("Busy", Vec::new());
        let pid = portfolio.id;
        fx.store.upsert_portfolio(portfolio);
        for _ in 0..11 {
            fx.store
                .add_transaction(Transaction::new(pid, "AAPL", TradeSide::Sell, 1.0, 10.0));
        }

        let summary = fx.monitor.evaluate_portfolio(pid).await.unwrap();
        assert_eq!(summary.alerts_raised, 1);
        let alerts = fx.store.alerts_for(pid);
        assert_eq!(alerts[0].title, "High Transaction Velocity");
    }

    #[tokio::test]
    async fn test_failing_portfolio_does_not_stop_the_pass() {
        let store = InMemoryStore::new();
        let listing = Arc::new(ListsUnknownPortfolio {
            inner: Arc::new(store.clone()),
            unknown: Uuid::new_v4(),
        });
        let fx = fixture_with(store, vec![liquid_quote("AAPL")], Some(listing), None);
        for _ in 0..2 {
            let portfolio = Portfolio::new(
                "Healthy",
                vec![Position::new(Uuid::nil(), "AAPL", 10.0, 100.0, 100.0, AssetType::Stock)],
            );
            fx.store.upsert_portfolio(portfolio);
        }

        let result = fx.monitor.run_pass(&CancellationToken::new()).await.unwrap();
        assert_eq!(result.items_processed, 2);
        assert_eq!(result.items_failed, 1);

        let updates = fx
            .publisher
            .events()
            .into_iter()
            .filter(|e| e.event_type == EventType::RiskUpdate)
            .count();
        assert_eq!(updates, 2);
    }

    #[tokio::test]
    async fn test_price_feed_outage_skips_only_var() {
        let fx = fixture_with(
            InMemoryStore::new(),
            vec![liquid_quote("AAPL")],
            None,
            Some(Arc::new(UnreachablePrices)),
        );
        let portfolio = Portfolio::new(
            "Feedless",
            vec![Position::new(Uuid::nil(), "AAPL", 10.0, 100.0, 100.0, AssetType::Stock)],
        );
        let pid = portfolio.id;
        fx.store.upsert_portfolio(portfolio);

        let summary = fx.monitor.evaluate_portfolio(pid).await.unwrap();
        assert!(summary.var_95.is_none());
        assert!(summary.liquidity_ratio.is_some());

        let metrics = fx.store.latest_metrics(pid).await.unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].metric_type, MetricType::LiquidityRatio);

        let updates = fx
            .publisher
            .events()
            .into_iter()
            .filter(|e| e.event_type == EventType::RiskUpdate)
            .count();
        assert_eq!(updates, 1);
    }

    #[tokio::test]
    async fn test_suppressed_large_transaction_stays_unchecked() {
        let fx = fixture(Vec::new());
        let portfolio = Portfolio::new("Whale", Vec::new());
        let pid = portfolio.id;
        fx.store.upsert_portfolio(portfolio);

        let first = Transaction::new(pid, "AAPL", TradeSide::Buy, 100.0, 150.0);
        let second = Transaction::new(pid, "MSFT", TradeSide::Buy, 100.0, 200.0);
        let ids = [first.id, second.id];
        fx.store.add_transaction(first);
        fx.store.add_transaction(second);

        let summary = fx.monitor.evaluate_portfolio(pid).await.unwrap();
        assert_eq!(summary.alerts_raised, 1);

        let suspicious = fx
            .store
            .alerts_for(pid)
            .into_iter()
            .filter(|a| a.alert_type == AlertType::SuspiciousActivity)
            .count();
        assert_eq!(suspicious, 1);

        let checked = ids
            .iter()
            .filter(|id| fx.store.transaction(**id).unwrap().aml_checked)
            .count();
        assert_eq!(checked, 1);
    }

    #[tokio::test]
    async fn test_cancelled_token_aborts_pass() {
        let fx = fixture(Vec::new());
        fx.store.upsert_portfolio(Portfolio::new("Any", Vec::new()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(matches!(
            fx.monitor.run_pass(&cancel).await,
            Err(AppError::Cancelled)
        ));
        assert!(!fx.monitor.is_running());
    }
}
