/// Risk Engine Scenario Tests
///
/// End-to-end checks of the risk engine through the library crate:
/// - Position analytics (market value, PnL)
/// - VaR percentile selection and method ordering
/// - Liquidity degenerate fallbacks and risk assessment bands
/// - Pre-trade position-size violations and approval rules
/// - AML screening of individual transactions
/// - Alert deduplication windows
/// - A full monitor pass against the in-memory store
///
/// Everything runs against in-memory collaborators; no database is needed.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use riskmonitor::config::{
    AlertConfig, AppConfig, MonitorConfig, PublishConfig, PublishSinkKind, RiskConfig,
};
use riskmonitor::external::market_data::StaticMarketData;
use riskmonitor::external::publisher::MemoryPublisher;
use riskmonitor::models::{
    AlertStatus, AlertType, AmlFlag, AssetType, EventType, LiquidityClass, LiquidityRiskLevel,
    MarketQuote, MetricType, Portfolio, Position, RiskThresholds, TradeSide, Transaction,
    ViolationSeverity, ViolationType,
};
use riskmonitor::services::alert_service::{risk_breach_alert, RaiseOutcome};
use riskmonitor::services::liquidity_service::{
    analyze_position, analyze_with_quotes, assess_liquidity_risk, NO_VOLUME_DAYS,
};
use riskmonitor::services::trade_risk_service::check_position_size;
use riskmonitor::services::var_service::{
    historical_var, monte_carlo_var, parametric_var, AssetReturns,
};
use riskmonitor::state::EngineState;
use riskmonitor::store::memory::InMemoryStore;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://localhost/riskmonitor_test".to_string(),
        database_max_connections: 1,
        monitor: MonitorConfig::default(),
        risk: RiskConfig {
            monte_carlo_simulations: 1_000,
            ..RiskConfig::default()
        },
        alert: AlertConfig::default(),
        publish: PublishConfig {
            sink: PublishSinkKind::Broadcast,
            channel: "risk_events".to_string(),
        },
    }
}

fn liquid_quote(symbol: &str) -> MarketQuote {
    MarketQuote {
        symbol: symbol.to_string(),
        average_daily_volume: 40_000_000.0,
        bid_ask_spread: 0.0005,
        market_cap: 1_500_000_000_000.0,
        depth: None,
    }
}

fn random_returns(rng: &mut StdRng, n: usize) -> Vec<f64> {
    (0..n).map(|_| rng.random_range(-0.08..0.08)).collect()
}

// ---------------------------------------------------------------------------
// Scenario A: position analytics
// ---------------------------------------------------------------------------

#[test]
fn scenario_a_position_market_value_and_pnl() {
    let position = Position::new(Uuid::new_v4(), "AAPL", 100.0, 150.0, 155.0, AssetType::Stock);

    assert_eq!(position.market_value, 15_500.0);
    assert_eq!(position.pnl(), 500.0);
    assert!((position.pnl_percent() - 3.33).abs() < 0.01);
    assert!((position.weight(100_000.0) - 0.155).abs() < 1e-12);
}

// ---------------------------------------------------------------------------
// Scenario B and VaR properties
// ---------------------------------------------------------------------------

#[test]
fn scenario_b_historical_var_uses_floor_percentile() {
    let returns = [-0.05, -0.03, -0.01, 0.02, 0.04];
    let var = historical_var(&returns, 200_000.0);

    // floor(5 * 0.05) = 0, the worst return
    assert!((var.var_95 - 0.05 * 200_000.0).abs() < 1e-6);
}

#[test]
fn var_99_never_below_var_95_for_any_method() {
    let mut rng = StdRng::seed_from_u64(42);

    for n in [2usize, 5, 20, 100, 500] {
        let returns = random_returns(&mut rng, n);

        let historical = historical_var(&returns, 100_000.0);
        assert!(historical.var_95 >= 0.0);
        assert!(historical.var_99 >= historical.var_95, "historical n={}", n);

        let parametric = parametric_var(&returns, 100_000.0);
        assert!(parametric.var_95 >= 0.0);
        assert!(parametric.var_99 >= parametric.var_95, "parametric n={}", n);

        let assets = vec![AssetReturns {
            symbol: "SPY".to_string(),
            weight: 1.0,
            returns: returns.clone(),
        }];
        let mut mc_rng = StdRng::seed_from_u64(n as u64);
        let monte_carlo = monte_carlo_var(&assets, 100_000.0, 2_000, &mut mc_rng);
        assert!(monte_carlo.var_95 >= 0.0);
        assert!(monte_carlo.var_99 >= monte_carlo.var_95, "monte carlo n={}", n);
    }
}

// ---------------------------------------------------------------------------
// Scenario C, Scenario E and liquidity bounds
// ---------------------------------------------------------------------------

#[test]
fn scenario_c_zero_volume_is_illiquid() {
    let mut quote = liquid_quote("PRIV");
    quote.average_daily_volume = 0.0;

    let stock = Position::new(Uuid::nil(), "PRIV", 1_000.0, 10.0, 10.0, AssetType::Stock);
    let analysis = analyze_position(&stock, &quote);
    assert_eq!(analysis.days_to_liquidate, NO_VOLUME_DAYS);
    assert_eq!(analysis.liquidity_class, LiquidityClass::Illiquid);

    // Government bonds and cash keep their override
    let bond = Position::new(Uuid::nil(), "PRIV", 1_000.0, 10.0, 10.0, AssetType::GovernmentBond);
    assert_eq!(analyze_position(&bond, &quote).liquidity_class, LiquidityClass::HighlyLiquid);
    let cash = Position::new(Uuid::nil(), "PRIV", 1_000.0, 1.0, 1.0, AssetType::Cash);
    assert_eq!(analyze_position(&cash, &quote).liquidity_class, LiquidityClass::HighlyLiquid);
}

#[test]
fn scenario_e_liquidity_risk_bands() {
    assert_eq!(assess_liquidity_risk(0.25), LiquidityRiskLevel::HighRisk);
    assert_eq!(assess_liquidity_risk(0.5), LiquidityRiskLevel::MediumRisk);
    assert_eq!(assess_liquidity_risk(0.8), LiquidityRiskLevel::LowRisk);
}

#[test]
fn liquidity_ratio_and_score_stay_in_bounds() {
    let mut rng = StdRng::seed_from_u64(7);
    let asset_types = [
        AssetType::Stock,
        AssetType::Crypto,
        AssetType::CorporateBond,
        AssetType::GovernmentBond,
        AssetType::Private,
    ];

    for round in 0..50 {
        let mut positions = Vec::new();
        let mut quotes = std::collections::HashMap::new();
        for i in 0..rng.random_range(1..8usize) {
            let symbol = format!("SYM{}_{}", round, i);
            let quantity = rng.random_range(0.0..1_000_000.0);
            let price = rng.random_range(0.01..500.0);
            let asset_type = asset_types[rng.random_range(0..asset_types.len())];
            positions.push(Position::new(Uuid::nil(), &symbol, quantity, price, price, asset_type));

            // Some symbols are left without a quote on purpose
            if rng.random_bool(0.7) {
                quotes.insert(
                    symbol.clone(),
                    MarketQuote {
                        symbol,
                        average_daily_volume: rng.random_range(0.0..10_000_000.0),
                        bid_ask_spread: rng.random_range(0.0..0.2),
                        market_cap: rng.random_range(0.0..1e12),
                        depth: None,
                    },
                );
            }
        }
        let total: f64 = positions.iter().map(|p| p.market_value).sum();
        // Sometimes the stored total lags the positions
        let portfolio_value = if round % 5 == 0 { total * 0.5 } else { total };

        let result = analyze_with_quotes(&positions, portfolio_value, &quotes);
        assert!((0.0..=1.0).contains(&result.liquidity_ratio), "ratio {}", result.liquidity_ratio);
        assert!(
            (0.0..=100.0).contains(&result.weighted_liquidity_score),
            "score {}",
            result.weighted_liquidity_score
        );
    }
}

// ---------------------------------------------------------------------------
// Scenario D and pre-trade evaluation
// ---------------------------------------------------------------------------

#[test]
fn scenario_d_position_size_violation() {
    let portfolio = Portfolio::new(
        "Core",
        vec![Position::new(Uuid::nil(), "VTI", 1_000.0, 100.0, 100.0, AssetType::Etf)],
    );
    assert_eq!(portfolio.total_value, 100_000.0);

    let thresholds = RiskThresholds::defaults_for(portfolio.id);
    let tx = Transaction::new(portfolio.id, "AAPL", TradeSide::Buy, 300.0, 100.0);

    let violation = check_position_size(&tx, &portfolio, &thresholds).unwrap();
    assert_eq!(violation.violation_type, ViolationType::PositionSize);
    assert_eq!(violation.severity, ViolationSeverity::Violation);
    assert!((violation.impact - 0.20).abs() < 1e-9);
}

#[tokio::test]
async fn trade_scores_stay_in_range_and_critical_rejects() {
    let store = Arc::new(InMemoryStore::new());
    let market = Arc::new(StaticMarketData::with_quotes(vec![liquid_quote("AAPL")]));
    let publisher = Arc::new(MemoryPublisher::new());
    let engine = EngineState::build(store.clone(), market, publisher, &test_config());

    let portfolio = Portfolio::new(
        "Volatile",
        vec![Position::new(Uuid::nil(), "AAPL", 100.0, 100.0, 100.0, AssetType::Stock)],
    );
    let pid = portfolio.id;
    store.upsert_portfolio(portfolio);

    let mut rng = StdRng::seed_from_u64(11);
    let mut price = 100.0;
    let prices: Vec<f64> = (0..60)
        .map(|_| {
            price *= 1.0 + rng.random_range(-0.12..0.12);
            price
        })
        .collect();
    store.set_price_history("AAPL", prices);

    for quantity in [1.0, 10.0, 50.0, 200.0, 1_000.0] {
        let tx = Transaction::new(pid, "AAPL", TradeSide::Buy, quantity, 100.0);
        let analysis = engine.evaluator.evaluate_transaction(&tx).await.unwrap();

        assert!((0.0..=100.0).contains(&analysis.risk_score));
        if analysis.has_critical() {
            assert!(!analysis.approved);
            assert!(!analysis.requires_review);
        }
        assert!(!(analysis.approved && analysis.requires_review));
    }
}

#[tokio::test]
async fn trade_evaluation_with_deadline_records_verdict() {
    let store = Arc::new(InMemoryStore::new());
    let market = Arc::new(StaticMarketData::with_quotes(vec![liquid_quote("AAPL")]));
    let engine = EngineState::build(
        store.clone(),
        market,
        Arc::new(MemoryPublisher::new()),
        &test_config(),
    );

    let portfolio = Portfolio::new(
        "Core",
        vec![Position::new(Uuid::nil(), "AAPL", 100.0, 100.0, 100.0, AssetType::Stock)],
    );
    let pid = portfolio.id;
    store.upsert_portfolio(portfolio);

    let tx = Transaction::new(pid, "AAPL", TradeSide::Buy, 5.0, 100.0).with_stop_loss(95.0);
    let analysis = engine
        .evaluator
        .evaluate_transaction_within(&tx, std::time::Duration::from_secs(5))
        .await
        .unwrap();

    let recorded = store.trade_risk(tx.id).unwrap();
    assert_eq!(recorded.approved, analysis.approved);
    assert_eq!(recorded.requires_review, analysis.requires_review);
    assert!((recorded.risk_score - analysis.risk_score).abs() < 1e-9);
}

// ---------------------------------------------------------------------------
// AML screening
// ---------------------------------------------------------------------------

#[test]
fn aml_screening_flags_structuring_near_the_threshold() {
    let store = Arc::new(InMemoryStore::new());
    let engine = EngineState::build(
        store,
        Arc::new(StaticMarketData::new()),
        Arc::new(MemoryPublisher::new()),
        &test_config(),
    );
    let pid = Uuid::new_v4();
    let now = Utc::now();
    let threshold = engine.compliance.rules().large_transaction;

    let recent: Vec<Transaction> = [0.95, 0.97, 0.99]
        .iter()
        .enumerate()
        .map(|(i, share)| {
            let mut tx = Transaction::new(pid, "AAPL", TradeSide::Buy, 1.0, threshold * share);
            tx.created_at = now - Duration::hours(i as i64 + 1);
            tx
        })
        .collect();
    let tx = Transaction::new(pid, "AAPL", TradeSide::Buy, 1.0, threshold * 0.98);

    let result = engine.compliance.check_transaction_aml(&tx, &recent, now);
    assert!(result.flags.contains(&AmlFlag::PossibleStructuring));
    assert!(!result.flags.contains(&AmlFlag::LargeTransaction));
    assert!(result.requires_review);
    assert!(!result.passed);

    let quiet = engine.compliance.check_transaction_aml(&tx, &[], now);
    assert!(quiet.passed);
}

// ---------------------------------------------------------------------------
// Alert deduplication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_alert_within_window_is_suppressed_until_it_elapses() {
    let store = Arc::new(InMemoryStore::new());
    let publisher = Arc::new(MemoryPublisher::new());
    let engine = EngineState::build(
        store.clone(),
        Arc::new(StaticMarketData::new()),
        publisher.clone(),
        &test_config(),
    );
    let pid = Uuid::new_v4();
    let start = Utc::now() - Duration::hours(2);

    let first = engine
        .alerts
        .raise_at(risk_breach_alert(pid, MetricType::Var, 1_300.0, 1_000.0), start)
        .await
        .unwrap();
    assert!(matches!(first, RaiseOutcome::Created(_)));

    let within = engine
        .alerts
        .raise_at(
            risk_breach_alert(pid, MetricType::Var, 1_300.0, 1_000.0),
            start + Duration::minutes(9),
        )
        .await
        .unwrap();
    assert_eq!(within, RaiseOutcome::Deduplicated);
    assert_eq!(store.alerts_for(pid).len(), 1);

    let after = engine
        .alerts
        .raise_at(
            risk_breach_alert(pid, MetricType::Var, 1_300.0, 1_000.0),
            start + Duration::minutes(11),
        )
        .await
        .unwrap();
    assert!(matches!(after, RaiseOutcome::Created(_)));

    let alerts = store.alerts_for(pid);
    assert_eq!(alerts.len(), 2);
    assert!(alerts.iter().all(|a| a.status == AlertStatus::Active));
    assert_eq!(publisher.events().len(), 2);
}

// ---------------------------------------------------------------------------
// Monitor pass
// ---------------------------------------------------------------------------

#[tokio::test]
async fn monitor_pass_raises_breach_alerts_and_publishes_updates() {
    let store = Arc::new(InMemoryStore::new());
    let mut illiquid = liquid_quote("PRIV");
    illiquid.average_daily_volume = 0.0;
    let market = Arc::new(StaticMarketData::with_quotes(vec![liquid_quote("AAPL"), illiquid]));
    let publisher = Arc::new(MemoryPublisher::new());
    let engine = EngineState::build(store.clone(), market, publisher.clone(), &test_config());

    // Mostly illiquid and concentrated: liquidity and position-limit alerts
    let risky = Portfolio::new(
        "Risky",
        vec![
            Position::new(Uuid::nil(), "PRIV", 900.0, 100.0, 100.0, AssetType::Private),
            Position::new(Uuid::nil(), "AAPL", 100.0, 100.0, 100.0, AssetType::Stock),
        ],
    );
    let risky_id = risky.id;
    store.upsert_portfolio(risky);

    let calm = Portfolio::new(
        "Calm",
        vec![Position::new(Uuid::nil(), "AAPL", 10.0, 100.0, 100.0, AssetType::Stock)],
    );
    store.upsert_portfolio(calm);

    let result = engine.monitor.run_pass(&CancellationToken::new()).await.unwrap();
    assert_eq!(result.items_processed, 2);
    assert_eq!(result.items_failed, 0);

    let alert_types: Vec<AlertType> = store
        .alerts_for(risky_id)
        .into_iter()
        .map(|a| a.alert_type)
        .collect();
    assert!(alert_types.contains(&AlertType::LiquidityRisk));
    assert!(alert_types.contains(&AlertType::ComplianceViolation));

    let updates = publisher
        .events()
        .into_iter()
        .filter(|e| e.event_type == EventType::RiskUpdate)
        .count();
    assert_eq!(updates, 2);

    let liquidity = engine
        .risk
        .risk_history(risky_id, Some(MetricType::LiquidityRatio), 10)
        .await
        .unwrap();
    assert_eq!(liquidity.len(), 1);
}
