use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::AppError;
use crate::external::market_data::MarketDataProvider;
use crate::models::{
    AssetType, LiquidityBreakdown, LiquidityClass, LiquidityHealth, LiquidityRiskLevel,
    MarketCondition, MarketDepth, MarketQuote, MetricStatus, Position,
};

/// Days reported for a symbol with no trading volume.
pub const NO_VOLUME_DAYS: f64 = 999.0;
/// Impact assumed for a symbol with no trading volume, also the impact cap.
pub const MAX_MARKET_IMPACT: f64 = 0.5;

const DEPTH_LEVELS: usize = 5;
const ILLIQUID_CONCENTRATION_LIMIT: f64 = 0.10;
const EXTENDED_LIQUIDATION_DAYS: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionLiquidity {
    pub symbol: String,
    pub asset_type: AssetType,
    pub quantity: f64,
    pub market_value: f64,
    pub liquidity_score: f64,
    pub liquidity_class: LiquidityClass,
    pub days_to_liquidate: f64,
    pub market_impact: f64,
    pub bid_ask_spread: f64,
    pub spread_cost: f64,
    pub immediate_liquidation_value: f64,
    pub orderly_liquidation_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiquidityAlertKind {
    LowLiquidityRatio,
    ExtendedLiquidationTime,
    ConcentratedIlliquidPosition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityAlert {
    pub kind: LiquidityAlertKind,
    pub severity: MetricStatus,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityResult {
    pub timestamp: DateTime<Utc>,
    pub portfolio_value: f64,
    /// In [0, 1]
    pub liquidity_ratio: f64,
    pub illiquidity_ratio: f64,
    /// In [0, 100]
    pub weighted_liquidity_score: f64,
    pub normal_market_days: f64,
    pub stressed_market_days: f64,
    pub crisis_market_days: f64,
    pub liquidity_adjusted_var: f64,
    pub liquidity_health: LiquidityHealth,
    pub positions: Vec<PositionLiquidity>,
    pub alerts: Vec<LiquidityAlert>,
}

impl LiquidityResult {
    /// Market value per liquidity class.
    pub fn breakdown(&self) -> LiquidityBreakdown {
        let mut breakdown = LiquidityBreakdown::default();
        for p in &self.positions {
            let slot = match p.liquidity_class {
                LiquidityClass::HighlyLiquid => &mut breakdown.highly_liquid,
                LiquidityClass::Liquid => &mut breakdown.liquid,
                LiquidityClass::SemiLiquid => &mut breakdown.semi_liquid,
                LiquidityClass::Illiquid => &mut breakdown.illiquid,
            };
            *slot += p.market_value;
        }
        breakdown
    }
}

/// Coarse verdict on a liquidity ratio: < 0.3 high, < 0.7 medium, else low.
pub fn assess_liquidity_risk(liquidity_ratio: f64) -> LiquidityRiskLevel {
    if liquidity_ratio < 0.3 {
        LiquidityRiskLevel::HighRisk
    } else if liquidity_ratio < 0.7 {
        LiquidityRiskLevel::MediumRisk
    } else {
        LiquidityRiskLevel::LowRisk
    }
}

// ==============================================================================
// Per-position scoring
// ==============================================================================

pub fn days_to_liquidate(quantity: f64, average_daily_volume: f64, condition: MarketCondition) -> f64 {
    if average_daily_volume <= 0.0 {
        return NO_VOLUME_DAYS;
    }
    quantity / (average_daily_volume * condition.participation_rate())
}

/// Square-root impact plus half the spread, capped at 50%.
pub fn market_impact(quantity: f64, average_daily_volume: f64, spread: f64) -> f64 {
    if average_daily_volume <= 0.0 {
        return MAX_MARKET_IMPACT;
    }
    let size_impact = 0.1 * (quantity / average_daily_volume).sqrt();
    (size_impact + spread / 2.0).min(MAX_MARKET_IMPACT)
}

/// How well the top of the book absorbs the position: 0, 0.25, 0.5, 0.75 or 1.
pub fn depth_coverage(depth: &MarketDepth, position_value: f64) -> f64 {
    let bid_value: f64 = depth.bid_levels.iter().take(DEPTH_LEVELS).map(|l| l.notional()).sum();
    let ask_value: f64 = depth.ask_levels.iter().take(DEPTH_LEVELS).map(|l| l.notional()).sum();
    let avg_depth = (bid_value + ask_value) / 2.0;

    if avg_depth > position_value * 2.0 {
        1.0
    } else if avg_depth > position_value {
        0.75
    } else if avg_depth > position_value * 0.5 {
        0.5
    } else if avg_depth > position_value * 0.25 {
        0.25
    } else {
        0.0
    }
}

/// 0-100, starting at 100 with up to 25 points off per factor.
pub fn liquidity_score(quote: &MarketQuote, position_value: f64) -> f64 {
    let mut score = 100.0;

    score -= if quote.average_daily_volume <= 0.0 {
        25.0
    } else {
        let volume_ratio = position_value / quote.average_daily_volume;
        if volume_ratio < 0.01 {
            0.0
        } else if volume_ratio < 0.1 {
            5.0
        } else if volume_ratio < 0.5 {
            15.0
        } else {
            25.0
        }
    };

    score -= if quote.bid_ask_spread < 0.001 {
        0.0
    } else if quote.bid_ask_spread < 0.005 {
        10.0
    } else if quote.bid_ask_spread < 0.01 {
        20.0
    } else {
        25.0
    };

    score -= if quote.market_cap > 10e9 {
        0.0
    } else if quote.market_cap > 2e9 {
        10.0
    } else if quote.market_cap > 200e6 {
        20.0
    } else {
        25.0
    };

    score -= match &quote.depth {
        Some(depth) => 25.0 - depth_coverage(depth, position_value) * 25.0,
        None => 25.0,
    };

    score.max(0.0)
}

pub fn classify(score: f64, days: f64, asset_type: AssetType) -> LiquidityClass {
    match asset_type {
        AssetType::GovernmentBond | AssetType::Cash | AssetType::MoneyMarket => {
            return LiquidityClass::HighlyLiquid
        }
        _ if days >= NO_VOLUME_DAYS => return LiquidityClass::Illiquid,
        AssetType::CorporateBond => {
            return if score > 70.0 {
                LiquidityClass::Liquid
            } else {
                LiquidityClass::SemiLiquid
            }
        }
        AssetType::Crypto => {
            return if score > 80.0 {
                LiquidityClass::Liquid
            } else if score > 50.0 {
                LiquidityClass::SemiLiquid
            } else {
                LiquidityClass::Illiquid
            }
        }
        _ => {}
    }

    if score >= 85.0 && days <= 1.0 {
        LiquidityClass::HighlyLiquid
    } else if score >= 70.0 && days <= 3.0 {
        LiquidityClass::Liquid
    } else if score >= 50.0 && days <= 7.0 {
        LiquidityClass::SemiLiquid
    } else {
        LiquidityClass::Illiquid
    }
}

/// Proceeds from selling into the bid book now. Quantity left after the book
/// is exhausted goes at the last bid less 10%; without a book, 95% of value.
pub fn immediate_liquidation_value(position: &Position, depth: Option<&MarketDepth>) -> f64 {
    let bids = match depth {
        Some(d) if !d.bid_levels.is_empty() => &d.bid_levels,
        _ => return position.market_value * 0.95,
    };

    let mut remaining = position.quantity;
    let mut value = 0.0;
    for level in bids {
        if remaining <= 0.0 {
            break;
        }
        let fill = remaining.min(level.quantity);
        value += fill * level.price;
        remaining -= fill;
    }

    if remaining > 0.0 {
        if let Some(last) = bids.last() {
            value += remaining * last.price * 0.9;
        }
    }

    value
}

pub fn analyze_position(position: &Position, quote: &MarketQuote) -> PositionLiquidity {
    let days = days_to_liquidate(position.quantity, quote.average_daily_volume, MarketCondition::Normal);
    let impact = market_impact(position.quantity, quote.average_daily_volume, quote.bid_ask_spread);
    let score = liquidity_score(quote, position.market_value);

    PositionLiquidity {
        symbol: position.symbol.clone(),
        asset_type: position.asset_type,
        quantity: position.quantity,
        market_value: position.market_value,
        liquidity_score: score,
        liquidity_class: classify(score, days, position.asset_type),
        days_to_liquidate: days,
        market_impact: impact,
        bid_ask_spread: quote.bid_ask_spread,
        spread_cost: position.market_value * quote.bid_ask_spread,
        immediate_liquidation_value: immediate_liquidation_value(position, quote.depth.as_ref()),
        orderly_liquidation_value: position.market_value * (1.0 - impact),
    }
}

// ==============================================================================
// Portfolio aggregation
// ==============================================================================

fn liquidity_adjusted_var(portfolio_value: f64, liquidity_ratio: f64) -> f64 {
    let factor = if liquidity_ratio < 0.3 {
        1.5
    } else if liquidity_ratio < 0.5 {
        1.3
    } else if liquidity_ratio < 0.7 {
        1.15
    } else {
        1.0
    };
    portfolio_value * 0.05 * factor
}

fn assess_health(liquidity_ratio: f64, normal_days: f64) -> LiquidityHealth {
    if liquidity_ratio >= 0.7 && normal_days <= 3.0 {
        LiquidityHealth::Healthy
    } else if liquidity_ratio >= 0.5 && normal_days <= 7.0 {
        LiquidityHealth::Adequate
    } else if liquidity_ratio >= 0.3 && normal_days <= 14.0 {
        LiquidityHealth::Concerning
    } else {
        LiquidityHealth::Critical
    }
}

fn liquidity_alerts(result: &LiquidityResult) -> Vec<LiquidityAlert> {
    let mut alerts = Vec::new();

    if result.liquidity_ratio < 0.3 {
        alerts.push(LiquidityAlert {
            kind: LiquidityAlertKind::LowLiquidityRatio,
            severity: MetricStatus::Critical,
            message: "Portfolio liquidity ratio below 30%".to_string(),
            value: result.liquidity_ratio,
            threshold: 0.3,
        });
    } else if result.liquidity_ratio < 0.5 {
        alerts.push(LiquidityAlert {
            kind: LiquidityAlertKind::LowLiquidityRatio,
            severity: MetricStatus::Warning,
            message: "Portfolio liquidity ratio below 50%".to_string(),
            value: result.liquidity_ratio,
            threshold: 0.5,
        });
    }

    if result.normal_market_days > EXTENDED_LIQUIDATION_DAYS {
        alerts.push(LiquidityAlert {
            kind: LiquidityAlertKind::ExtendedLiquidationTime,
            severity: MetricStatus::Warning,
            message: "Portfolio liquidation would take more than 10 days".to_string(),
            value: result.normal_market_days,
            threshold: EXTENDED_LIQUIDATION_DAYS,
        });
    }

    if result.portfolio_value > 0.0 {
        for p in &result.positions {
            let share = p.market_value / result.portfolio_value;
            if p.liquidity_class == LiquidityClass::Illiquid && share > ILLIQUID_CONCENTRATION_LIMIT {
                alerts.push(LiquidityAlert {
                    kind: LiquidityAlertKind::ConcentratedIlliquidPosition,
                    severity: MetricStatus::Warning,
                    message: format!("Large illiquid position: {}", p.symbol),
                    value: share,
                    threshold: ILLIQUID_CONCENTRATION_LIMIT,
                });
            }
        }
    }

    alerts
}

/// Full liquidity analysis from already-fetched quotes. Symbols missing from
/// `quotes` are scored with the degenerate unknown quote.
pub fn analyze_with_quotes(
    positions: &[Position],
    portfolio_value: f64,
    quotes: &HashMap<String, MarketQuote>,
) -> LiquidityResult {
    let mut liquid_value = 0.0;
    let mut illiquid_value = 0.0;
    let mut weighted_score = 0.0;
    let mut normal_days: f64 = 0.0;
    let mut stressed_days: f64 = 0.0;
    let mut crisis_days: f64 = 0.0;
    let mut analyzed = Vec::with_capacity(positions.len());

    for position in positions {
        let fallback;
        let quote = match quotes.get(&position.symbol) {
            Some(q) => q,
            None => {
                fallback = MarketQuote::unknown(&position.symbol);
                &fallback
            }
        };

        let pl = analyze_position(position, quote);

        let (liquid_share, illiquid_share) = pl.liquidity_class.liquid_split();
        liquid_value += pl.market_value * liquid_share;
        illiquid_value += pl.market_value * illiquid_share;
        if portfolio_value > 0.0 {
            weighted_score += pl.liquidity_score * (pl.market_value / portfolio_value);
        }

        let adv = quote.average_daily_volume;
        normal_days = normal_days.max(days_to_liquidate(position.quantity, adv, MarketCondition::Normal));
        stressed_days = stressed_days.max(days_to_liquidate(position.quantity, adv, MarketCondition::Stressed));
        crisis_days = crisis_days.max(days_to_liquidate(position.quantity, adv, MarketCondition::Crisis));

        analyzed.push(pl);
    }

    let (liquidity_ratio, illiquidity_ratio) = if portfolio_value > 0.0 {
        (
            (liquid_value / portfolio_value).clamp(0.0, 1.0),
            (illiquid_value / portfolio_value).clamp(0.0, 1.0),
        )
    } else {
        (0.0, 0.0)
    };

    let value = portfolio_value.max(0.0);
    let mut result = LiquidityResult {
        timestamp: Utc::now(),
        portfolio_value: value,
        liquidity_ratio,
        illiquidity_ratio,
        weighted_liquidity_score: weighted_score.clamp(0.0, 100.0),
        normal_market_days: normal_days,
        stressed_market_days: stressed_days,
        crisis_market_days: crisis_days,
        liquidity_adjusted_var: liquidity_adjusted_var(value, liquidity_ratio),
        liquidity_health: assess_health(liquidity_ratio, normal_days),
        positions: analyzed,
        alerts: Vec::new(),
    };
    result.alerts = liquidity_alerts(&result);
    result
}

/// Liquidity analysis backed by a market data provider.
#[derive(Clone)]
pub struct LiquidityCalculator {
    market_data: Arc<dyn MarketDataProvider>,
}

impl LiquidityCalculator {
    pub fn new(market_data: Arc<dyn MarketDataProvider>) -> Self {
        Self { market_data }
    }

    pub async fn analyze(
        &self,
        positions: &[Position],
        portfolio_value: f64,
    ) -> Result<LiquidityResult, AppError> {
        let mut quotes = HashMap::with_capacity(positions.len());
        for position in positions {
            if quotes.contains_key(&position.symbol) {
                continue;
            }
            let quote = match self.market_data.quote(&position.symbol).await {
                Ok(q) => q,
                Err(e) if e.is_transient() => return Err(e),
                Err(e) => {
                    warn!("No market data for {}: {}", position.symbol, e);
                    MarketQuote::unknown(&position.symbol)
                }
            };
            quotes.insert(position.symbol.clone(), quote);
        }

        let result = analyze_with_quotes(positions, portfolio_value, &quotes);
        debug!(
            positions = positions.len(),
            liquidity_ratio = result.liquidity_ratio,
            normal_days = result.normal_market_days,
            "Liquidity analyzed"
        );
        Ok(result)
    }
}
