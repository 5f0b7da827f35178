use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::models::{
    Portfolio, RiskThresholds, RiskViolation, TradeRiskAnalysis, TradeSide, Transaction,
    ViolationSeverity, ViolationType,
};
use crate::services::alert_service::{trade_violation_alert, AlertEngine};
use crate::services::liquidity_service::LiquidityCalculator;
use crate::services::var_service::VarCalculator;
use crate::store::{
    get_or_create_thresholds, PortfolioStore, PriceHistoryStore, ThresholdStore, TransactionStore,
};

/// Assumed VaR growth from a single trade.
pub const VAR_IMPACT_ESTIMATE: f64 = 0.02;
/// Assumed liquidity-ratio loss from a single trade.
pub const LIQUIDITY_IMPACT_ESTIMATE: f64 = 0.05;
const SUGGESTED_STOP_DISTANCE: f64 = 0.02;
const TARGET_PORTFOLIO_IMPACT: f64 = 0.10;
const HEDGE_CONCENTRATION_IMPACT: f64 = 0.30;
const HEDGE_RECOMMENDATION: &str =
    "Consider hedging with inverse ETF or options to reduce concentration risk";

/// Stores and calculators the pre-trade evaluator works against.
#[derive(Clone)]
pub struct TradeRiskDeps {
    pub portfolios: Arc<dyn PortfolioStore>,
    pub thresholds: Arc<dyn ThresholdStore>,
    pub prices: Arc<dyn PriceHistoryStore>,
    pub transactions: Arc<dyn TransactionStore>,
    pub var: VarCalculator,
    pub liquidity: LiquidityCalculator,
    pub alerts: AlertEngine,
}

/// Pre-trade check: turns a proposed transaction into approve / review / reject.
#[derive(Clone)]
pub struct RiskThresholdEvaluator {
    deps: TradeRiskDeps,
    history_days: i64,
}

impl RiskThresholdEvaluator {
    pub fn new(deps: TradeRiskDeps, history_days: i64) -> Self {
        Self { deps, history_days }
    }

    /// Same as [`Self::evaluate_transaction`], abandoned with `Timeout` after `deadline`.
    pub async fn evaluate_transaction_within(
        &self,
        tx: &Transaction,
        deadline: Duration,
    ) -> Result<TradeRiskAnalysis, AppError> {
        tokio::time::timeout(deadline, self.evaluate_transaction(tx))
            .await
            .map_err(|_| AppError::Timeout(format!("trade evaluation {}", tx.id)))?
    }

    pub async fn evaluate_transaction(&self, tx: &Transaction) -> Result<TradeRiskAnalysis, AppError> {
        let portfolio = self.deps.portfolios.get_portfolio(tx.portfolio_id).await?;
        let thresholds = get_or_create_thresholds(self.deps.thresholds.as_ref(), tx.portfolio_id).await?;

        let mut analysis = TradeRiskAnalysis::for_transaction(tx);
        analysis.position_risk = position_risk(tx, &thresholds);

        if let Some(v) = check_position_size(tx, &portfolio, &thresholds) {
            analysis.violations.push(v);
        }

        if let Some(current_var) = self.current_var(&portfolio).await {
            let (impact, violation) = check_var_impact(current_var, &portfolio, &thresholds);
            analysis.portfolio_impact = impact;
            analysis.violations.extend(violation);
        }

        let (concentration, violation) = check_concentration(tx, &portfolio, &thresholds);
        analysis.concentration_impact = concentration;
        analysis.violations.extend(violation);

        let (liquidity, violation) = match self
            .deps
            .liquidity
            .analyze(&portfolio.positions, portfolio.total_value)
            .await
        {
            Ok(result) => check_liquidity_impact(result.liquidity_ratio, &thresholds),
            Err(e) => {
                warn!("Liquidity unavailable for trade {}: {}", tx.id, e);
                (LIQUIDITY_IMPACT_ESTIMATE, None)
            }
        };
        analysis.liquidity_impact = liquidity;
        analysis.violations.extend(violation);

        if thresholds.require_stop_loss && !tx.has_stop_loss() {
            analysis.violations.push(RiskViolation {
                violation_type: ViolationType::StopLossRequired,
                severity: ViolationSeverity::Warning,
                description: "Stop loss is required but not set".to_string(),
                current_value: 0.0,
                limit: 0.0,
                impact: 0.0,
            });
            analysis.suggested_stop_loss = Some(suggested_stop_loss(tx));
        }

        analysis.risk_score = risk_score(&analysis);
        let (approved, requires_review) = approval(&analysis);
        analysis.approved = approved;
        analysis.requires_review = requires_review;

        if analysis.risk_score > 70.0 || !analysis.violations.is_empty() {
            add_recommendations(&mut analysis, tx);
        }

        if let Err(e) = self.deps.transactions.record_trade_risk(&analysis).await {
            warn!("Failed to record risk verdict for transaction {}: {}", tx.id, e);
        }

        // Trades sent to review alert as well as rejected ones
        if !analysis.approved && !analysis.violations.is_empty() {
            self.raise_violation_alerts(tx, &analysis).await;
        }

        info!(
            "📋 Trade {} {} {} evaluated: score {:.1}, approved={}, review={}, {} violation(s)",
            tx.side,
            tx.quantity,
            tx.symbol,
            analysis.risk_score,
            analysis.approved,
            analysis.requires_review,
            analysis.violations.len()
        );

        Ok(analysis)
    }

    /// Blended VaR95 of the current holdings, `None` when it cannot be computed.
    async fn current_var(&self, portfolio: &Portfolio) -> Option<f64> {
        let symbols: Vec<String> = portfolio.positions.iter().map(|p| p.symbol.clone()).collect();
        let history = match self.deps.prices.price_history(&symbols, self.history_days).await {
            Ok(history) => history,
            Err(e) => {
                warn!("Price history unavailable for portfolio {}: {}", portfolio.id, e);
                return None;
            }
        };
        match self.deps.var.calculate(&portfolio.positions, &history, 1) {
            Ok(result) => Some(result.var_95),
            Err(e) => {
                debug!("Skipping VaR impact for portfolio {}: {}", portfolio.id, e);
                None
            }
        }
    }

    async fn raise_violation_alerts(&self, tx: &Transaction, analysis: &TradeRiskAnalysis) {
        for violation in &analysis.violations {
            let Some(candidate) = trade_violation_alert(tx, violation) else {
                continue;
            };
            if let Err(e) = self.deps.alerts.raise(candidate).await {
                warn!(
                    "Failed to raise {} alert for transaction {}: {}",
                    violation.violation_type.as_str(),
                    tx.id,
                    e
                );
            }
        }
    }
}

// ==============================================================================
// Individual Checks
// ==============================================================================

/// Currency at risk: distance to the stop, or the maximum allowed stop distance
/// when the trade carries no stop.
pub fn position_risk(tx: &Transaction, thresholds: &RiskThresholds) -> f64 {
    match tx.stop_loss {
        Some(stop) if tx.has_stop_loss() => tx.quantity * (tx.price - stop).abs(),
        _ => tx.trade_value() * thresholds.max_stop_loss_distance,
    }
}

pub fn check_position_size(
    tx: &Transaction,
    portfolio: &Portfolio,
    thresholds: &RiskThresholds,
) -> Option<RiskViolation> {
    if portfolio.total_value <= 0.0 {
        return None;
    }
    let position_percent = tx.trade_value() / portfolio.total_value;
    if position_percent <= thresholds.max_position_size {
        return None;
    }

    Some(RiskViolation {
        violation_type: ViolationType::PositionSize,
        severity: ViolationSeverity::Violation,
        description: format!("Position size {:.2}% exceeds maximum", position_percent * 100.0),
        current_value: position_percent,
        limit: thresholds.max_position_size,
        impact: relative_excess(position_percent, thresholds.max_position_size),
    })
}

/// Projects VaR after the trade with the fixed growth estimate.
pub fn check_var_impact(
    current_var: f64,
    portfolio: &Portfolio,
    thresholds: &RiskThresholds,
) -> (f64, Option<RiskViolation>) {
    let new_var = current_var * (1.0 + VAR_IMPACT_ESTIMATE);
    let limit = thresholds.var95_limit(portfolio.total_value);

    let violation = (new_var > limit).then(|| RiskViolation {
        violation_type: ViolationType::VarLimit,
        severity: ViolationSeverity::Critical,
        description: "Trade would increase VaR beyond limit".to_string(),
        current_value: new_var,
        limit,
        impact: relative_excess(new_var, limit),
    });

    (VAR_IMPACT_ESTIMATE, violation)
}

/// Adds the new position's squared weight to the current HHI.
pub fn check_concentration(
    tx: &Transaction,
    portfolio: &Portfolio,
    thresholds: &RiskThresholds,
) -> (f64, Option<RiskViolation>) {
    if portfolio.total_value <= 0.0 {
        return (0.0, None);
    }

    let hhi = portfolio.herfindahl_index();
    let new_value = tx.trade_value();
    let new_weight = new_value / (portfolio.total_value + new_value);
    let new_hhi = hhi + new_weight * new_weight;

    let violation = (new_hhi > thresholds.max_concentration).then(|| RiskViolation {
        violation_type: ViolationType::ConcentrationLimit,
        severity: ViolationSeverity::Warning,
        description: "Portfolio concentration exceeds limit".to_string(),
        current_value: new_hhi,
        limit: thresholds.max_concentration,
        impact: relative_excess(new_hhi, thresholds.max_concentration),
    });

    (new_hhi - hhi, violation)
}

/// Projects the liquidity ratio after the trade with the fixed loss estimate.
pub fn check_liquidity_impact(
    liquidity_ratio: f64,
    thresholds: &RiskThresholds,
) -> (f64, Option<RiskViolation>) {
    let new_ratio = liquidity_ratio - LIQUIDITY_IMPACT_ESTIMATE;
    let min = thresholds.min_liquidity_ratio;

    let violation = (new_ratio < min).then(|| RiskViolation {
        violation_type: ViolationType::LiquidityRatio,
        severity: ViolationSeverity::Warning,
        description: "Trade reduces liquidity below minimum".to_string(),
        current_value: new_ratio,
        limit: min,
        impact: if min > 0.0 { (min - new_ratio) / min } else { 0.0 },
    });

    (LIQUIDITY_IMPACT_ESTIMATE, violation)
}

pub fn suggested_stop_loss(tx: &Transaction) -> f64 {
    match tx.side {
        TradeSide::Buy => tx.price * (1.0 - SUGGESTED_STOP_DISTANCE),
        TradeSide::Sell => tx.price * (1.0 + SUGGESTED_STOP_DISTANCE),
    }
}

fn relative_excess(value: f64, limit: f64) -> f64 {
    if limit > 0.0 {
        (value - limit) / limit
    } else {
        0.0
    }
}

// ==============================================================================
// Scoring & Decision
// ==============================================================================

/// Violation points plus weighted impacts, in [0, 100].
pub fn risk_score(analysis: &TradeRiskAnalysis) -> f64 {
    let violations: f64 = analysis
        .violations
        .iter()
        .map(|v| v.severity.score_points())
        .sum();
    let score = violations
        + analysis.portfolio_impact * 20.0
        + analysis.concentration_impact * 100.0 * 15.0
        + analysis.liquidity_impact * 15.0;
    score.clamp(0.0, 100.0)
}

/// Returns `(approved, requires_review)`. Both false means rejected.
pub fn approval(analysis: &TradeRiskAnalysis) -> (bool, bool) {
    if analysis.has_critical() {
        return (false, false);
    }
    if analysis.risk_score > 70.0 || analysis.violations.len() > 2 {
        return (false, true);
    }
    if analysis.risk_score < 30.0 && analysis.violations.is_empty() {
        return (true, false);
    }
    (false, true)
}

fn add_recommendations(analysis: &mut TradeRiskAnalysis, tx: &Transaction) {
    if analysis.portfolio_impact > TARGET_PORTFOLIO_IMPACT {
        analysis.suggested_size = Some(tx.quantity * TARGET_PORTFOLIO_IMPACT / analysis.portfolio_impact);
    }
    if analysis.concentration_impact > HEDGE_CONCENTRATION_IMPACT {
        analysis.hedge_recommendation = Some(HEDGE_RECOMMENDATION.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::market_data::StaticMarketData;
    use crate::external::publisher::MemoryPublisher;
    use crate::models::{AlertType, AssetType, MarketQuote, Position};
    use crate::store::memory::InMemoryStore;
    use uuid::Uuid;

    fn setup(market: StaticMarketData) -> (RiskThresholdEvaluator, InMemoryStore) {
        let store = InMemoryStore::new();
        let shared = Arc::new(store.clone());
        let alerts = AlertEngine::new(shared.clone(), Arc::new(MemoryPublisher::new()));
        let deps = TradeRiskDeps {
            portfolios: shared.clone(),
            thresholds: shared.clone(),
            prices: shared.clone(),
            transactions: shared,
            var: VarCalculator::new(2_000).with_seed(7),
            liquidity: LiquidityCalculator::new(Arc::new(market)),
            alerts,
        };
        (RiskThresholdEvaluator::new(deps, 252), store)
    }

    /// Ten $10,000 stock positions.
    fn diversified() -> Portfolio {
        let positions = (0..10)
            .map(|i| Position::new(Uuid::nil(), format!("SYM{}", i), 100.0, 100.0, 100.0, AssetType::Stock))
            .collect();
        Portfolio::new("Diversified", positions)
    }

    fn deep_market(portfolio: &Portfolio) -> StaticMarketData {
        StaticMarketData::with_quotes(portfolio.positions.iter().map(|p| MarketQuote {
            symbol: p.symbol.clone(),
            average_daily_volume: 50_000_000.0,
            bid_ask_spread: 0.0005,
            market_cap: 500_000_000_000.0,
            depth: None,
        }))
    }

    #[test]
    fn test_position_size_violation() {
        let portfolio = diversified();
        let thresholds = RiskThresholds::defaults_for(portfolio.id);
        let tx = Transaction::new(portfolio.id, "NEW", TradeSide::Buy, 300.0, 100.0);

        let v = check_position_size(&tx, &portfolio, &thresholds).unwrap();
        assert_eq!(v.severity, ViolationSeverity::Violation);
        assert!((v.impact - 0.20).abs() < 1e-9);
    }

    #[test]
    fn test_suggested_stop_by_side() {
        let buy = Transaction::new(Uuid::nil(), "AAPL", TradeSide::Buy, 1.0, 100.0);
        let sell = Transaction::new(Uuid::nil(), "AAPL", TradeSide::Sell, 1.0, 100.0);
        assert!((suggested_stop_loss(&buy) - 98.0).abs() < 1e-9);
        assert!((suggested_stop_loss(&sell) - 102.0).abs() < 1e-9);
    }

    #[test]
    fn test_position_risk_uses_stop_distance() {
        let thresholds = RiskThresholds::defaults_for(Uuid::nil());
        let tx = Transaction::new(Uuid::nil(), "AAPL", TradeSide::Buy, 10.0, 100.0);
        assert!((position_risk(&tx, &thresholds) - 50.0).abs() < 1e-9);
        let with_stop = tx.with_stop_loss(95.0);
        assert!((position_risk(&with_stop, &thresholds) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_is_capped() {
        let mut analysis = TradeRiskAnalysis::for_transaction(&Transaction::new(
            Uuid::nil(),
            "AAPL",
            TradeSide::Buy,
            1.0,
            1.0,
        ));
        analysis.concentration_impact = 0.9;
        assert_eq!(risk_score(&analysis), 100.0);
    }

    #[tokio::test]
    async fn test_clean_trade_is_approved() {
        let portfolio = diversified();
        let (evaluator, store) = setup(deep_market(&portfolio));
        store.upsert_portfolio(portfolio.clone());

        let tx = Transaction::new(portfolio.id, "SYM0", TradeSide::Buy, 50.0, 100.0).with_stop_loss(97.0);
        let analysis = evaluator.evaluate_transaction(&tx).await.unwrap();

        assert!(analysis.violations.is_empty(), "{:?}", analysis.violations);
        assert!(analysis.risk_score < 30.0);
        assert!(analysis.approved);
        assert!(!analysis.requires_review);
        assert!(store.trade_risk(tx.id).is_some());
    }

    #[tokio::test]
    async fn test_oversized_trade_needs_review_with_hedge() {
        let portfolio = diversified();
        let (evaluator, store) = setup(deep_market(&portfolio));
        store.upsert_portfolio(portfolio.clone());

        let tx = Transaction::new(portfolio.id, "BIG", TradeSide::Buy, 2_000.0, 100.0);
        let analysis = evaluator.evaluate_transaction(&tx).await.unwrap();

        assert!(analysis
            .violations
            .iter()
            .any(|v| v.violation_type == ViolationType::PositionSize));
        assert!(!analysis.approved);
        assert!(analysis.requires_review);
        assert!(analysis
            .suggested_stop_loss
            .is_some_and(|stop| (stop - 98.0).abs() < 1e-9));
        assert_eq!(analysis.hedge_recommendation.as_deref(), Some(HEDGE_RECOMMENDATION));

        // Only the position-size violation is severe enough to alert
        let alerts = store.alerts_for(portfolio.id);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::RiskViolation);
    }

    #[tokio::test]
    async fn test_var_breach_rejects_and_alerts() {
        let portfolio = diversified();
        let (evaluator, store) = setup(deep_market(&portfolio));
        store.upsert_portfolio(portfolio.clone());
        let mut thresholds = RiskThresholds::defaults_for(portfolio.id);
        thresholds.max_var_95 = 0.0001;
        store.set_thresholds(thresholds);
        for p in &portfolio.positions {
            store.set_price_history(&p.symbol, vec![100.0, 95.0, 101.0, 90.0, 99.0, 92.0, 97.0]);
        }

        let tx = Transaction::new(portfolio.id, "SYM1", TradeSide::Sell, 10.0, 100.0).with_stop_loss(103.0);
        let analysis = evaluator.evaluate_transaction(&tx).await.unwrap();

        assert!(analysis.has_critical());
        assert!(!analysis.approved);
        assert!(!analysis.requires_review);
        assert!((analysis.portfolio_impact - VAR_IMPACT_ESTIMATE).abs() < 1e-12);

        let alerts = store.alerts_for(portfolio.id);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::RiskViolation);
    }

    #[tokio::test]
    async fn test_unknown_portfolio_is_not_found() {
        let (evaluator, _store) = setup(StaticMarketData::new());
        let tx = Transaction::new(Uuid::new_v4(), "AAPL", TradeSide::Buy, 1.0, 1.0);
        assert!(matches!(
            evaluator.evaluate_transaction(&tx).await,
            Err(AppError::NotFound(_))
        ));
    }
}
