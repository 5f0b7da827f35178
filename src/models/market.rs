use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One level of an order book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub quantity: f64,
    #[serde(default)]
    pub orders: u32,
}

impl PriceLevel {
    pub fn notional(&self) -> f64 {
        self.price * self.quantity
    }
}

/// Order book depth, best levels first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDepth {
    pub bid_levels: Vec<PriceLevel>,
    pub ask_levels: Vec<PriceLevel>,
    pub timestamp: DateTime<Utc>,
}

/// Market data needed to judge how readily a symbol can be sold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketQuote {
    pub symbol: String,
    pub average_daily_volume: f64,
    /// Relative spread, 0.001 for 0.1%
    pub bid_ask_spread: f64,
    pub market_cap: f64,
    pub depth: Option<MarketDepth>,
}

impl MarketQuote {
    /// Degenerate quote used when a provider knows nothing about a symbol.
    pub fn unknown(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            average_daily_volume: 0.0,
            bid_ask_spread: 1.0,
            market_cap: 0.0,
            depth: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiquidityClass {
    HighlyLiquid,
    Liquid,
    SemiLiquid,
    Illiquid,
}

impl LiquidityClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiquidityClass::HighlyLiquid => "HIGHLY_LIQUID",
            LiquidityClass::Liquid => "LIQUID",
            LiquidityClass::SemiLiquid => "SEMI_LIQUID",
            LiquidityClass::Illiquid => "ILLIQUID",
        }
    }

    /// Fraction of market value counted as liquid, and as illiquid.
    pub fn liquid_split(&self) -> (f64, f64) {
        match self {
            LiquidityClass::HighlyLiquid => (1.0, 0.0),
            LiquidityClass::Liquid => (0.75, 0.0),
            LiquidityClass::SemiLiquid => (0.25, 0.75),
            LiquidityClass::Illiquid => (0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketCondition {
    Normal,
    Stressed,
    Crisis,
}

impl MarketCondition {
    /// Share of average daily volume a liquidation may absorb per day.
    pub fn participation_rate(&self) -> f64 {
        match self {
            MarketCondition::Normal => 0.10,
            MarketCondition::Stressed => 0.05,
            MarketCondition::Crisis => 0.02,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiquidityHealth {
    Healthy,
    Adequate,
    Concerning,
    Critical,
}

/// Coarse liquidity risk verdict derived from the liquidity ratio alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiquidityRiskLevel {
    LowRisk,
    MediumRisk,
    HighRisk,
}

impl LiquidityRiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiquidityRiskLevel::LowRisk => "LOW_RISK",
            LiquidityRiskLevel::MediumRisk => "MEDIUM_RISK",
            LiquidityRiskLevel::HighRisk => "HIGH_RISK",
        }
    }
}
