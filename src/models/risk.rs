use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

use super::market::{LiquidityHealth, LiquidityRiskLevel};

/// Per-portfolio risk limits.
///
/// Ratio limits are fractions (0.25 for 25%). The VaR limits accept either a
/// fraction of portfolio value (values up to 1.0) or an absolute currency amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RiskThresholds {
    pub id: Uuid,
    pub portfolio_id: Uuid,

    pub max_var_95: f64,
    pub max_var_99: f64,

    pub max_position_size: f64,
    pub max_single_asset_exposure: f64,
    pub max_sector_exposure: f64,

    pub min_liquidity_ratio: f64,
    pub max_leverage: f64,
    /// Herfindahl index ceiling
    pub max_concentration: f64,

    pub max_daily_loss: f64,
    pub max_weekly_loss: f64,
    pub max_drawdown: f64,

    pub require_stop_loss: bool,
    /// Max distance of a stop from entry, as a fraction of entry price
    pub max_stop_loss_distance: f64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RiskThresholds {
    /// Limits applied the first time a portfolio is evaluated.
    pub fn defaults_for(portfolio_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            portfolio_id,
            max_var_95: 0.05,
            max_var_99: 0.10,
            max_position_size: 0.25,
            max_single_asset_exposure: 0.30,
            max_sector_exposure: 0.40,
            min_liquidity_ratio: 0.30,
            max_leverage: 2.0,
            max_concentration: 0.35,
            max_daily_loss: 0.03,
            max_weekly_loss: 0.07,
            max_drawdown: 0.15,
            require_stop_loss: true,
            max_stop_loss_distance: 0.05,
            created_at: now,
            updated_at: now,
        }
    }

    /// VaR95 ceiling in currency for a portfolio of the given value.
    pub fn var95_limit(&self, total_value: f64) -> f64 {
        limit_in_currency(self.max_var_95, total_value)
    }

    pub fn var99_limit(&self, total_value: f64) -> f64 {
        limit_in_currency(self.max_var_99, total_value)
    }
}

fn limit_in_currency(limit: f64, total_value: f64) -> f64 {
    if limit <= 1.0 {
        limit * total_value.max(0.0)
    } else {
        limit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricType {
    Var,
    LiquidityRatio,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Var => "VAR",
            MetricType::LiquidityRatio => "LIQUIDITY_RATIO",
        }
    }
}

impl FromStr for MetricType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VAR" => Ok(MetricType::Var),
            "LIQUIDITY_RATIO" => Ok(MetricType::LiquidityRatio),
            other => Err(format!("unknown metric type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricStatus {
    Safe,
    Warning,
    Critical,
}

impl MetricStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricStatus::Safe => "SAFE",
            MetricStatus::Warning => "WARNING",
            MetricStatus::Critical => "CRITICAL",
        }
    }

    pub fn is_breach(&self) -> bool {
        !matches!(self, MetricStatus::Safe)
    }
}

impl FromStr for MetricStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SAFE" => Ok(MetricStatus::Safe),
            "WARNING" => Ok(MetricStatus::Warning),
            "CRITICAL" => Ok(MetricStatus::Critical),
            other => Err(format!("unknown metric status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDetails {
    pub method: String,
    pub position_count: usize,
    pub portfolio_value: f64,
    pub historical_var_95: f64,
    pub parametric_var_95: f64,
    pub monte_carlo_var_95: f64,
    pub var_99: f64,
    pub expected_shortfall_95: f64,
    pub max_drawdown: f64,
    pub observations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LiquidityBreakdown {
    pub highly_liquid: f64,
    pub liquid: f64,
    pub semi_liquid: f64,
    pub illiquid: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityDetails {
    pub health: LiquidityHealth,
    pub risk_assessment: LiquidityRiskLevel,
    pub normal_market_days: f64,
    pub stressed_market_days: f64,
    pub crisis_market_days: f64,
    pub position_count: usize,
    pub portfolio_value: f64,
    pub breakdown: LiquidityBreakdown,
}

/// Method-specific diagnostics attached to a metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricDetails {
    Var(VarDetails),
    Liquidity(LiquidityDetails),
}

/// One evaluation of a portfolio metric. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetric {
    pub id: Uuid,
    pub portfolio_id: Uuid,
    pub metric_type: MetricType,
    pub value: f64,
    pub threshold: f64,
    pub status: MetricStatus,
    pub confidence_level: Option<f64>,
    pub time_horizon_days: Option<u32>,
    pub calculated_at: DateTime<Utc>,
    pub details: MetricDetails,
}

impl RiskMetric {
    /// Value relative to its threshold; 0 when no threshold applies.
    pub fn breach_ratio(&self) -> f64 {
        if self.threshold > 0.0 {
            self.value / self.threshold
        } else {
            0.0
        }
    }
}

/// Compact time-series point backing history queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskHistory {
    pub id: Uuid,
    pub portfolio_id: Uuid,
    pub metric_type: MetricType,
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
}

impl From<&RiskMetric> for RiskHistory {
    fn from(metric: &RiskMetric) -> Self {
        Self {
            id: Uuid::new_v4(),
            portfolio_id: metric.portfolio_id,
            metric_type: metric.metric_type,
            value: metric.value,
            recorded_at: metric.calculated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let t = RiskThresholds::defaults_for(Uuid::nil());
        assert_eq!(t.max_position_size, 0.25);
        assert_eq!(t.max_concentration, 0.35);
        assert!(t.require_stop_loss);
    }

    #[test]
    fn test_var_limit_fraction_or_absolute() {
        let mut t = RiskThresholds::defaults_for(Uuid::nil());
        assert!((t.var95_limit(100_000.0) - 5_000.0).abs() < 1e-9);
        t.max_var_95 = 7_500.0;
        assert_eq!(t.var95_limit(100_000.0), 7_500.0);
        t.max_var_95 = 0.05;
        assert_eq!(t.var95_limit(0.0), 0.0);
    }

    #[test]
    fn test_details_are_tagged() {
        let details = MetricDetails::Liquidity(LiquidityDetails {
            health: LiquidityHealth::Adequate,
            risk_assessment: LiquidityRiskLevel::MediumRisk,
            normal_market_days: 2.0,
            stressed_market_days: 4.0,
            crisis_market_days: 10.0,
            position_count: 3,
            portfolio_value: 10_000.0,
            breakdown: LiquidityBreakdown::default(),
        });
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["kind"], "liquidity");
        assert_eq!(json["risk_assessment"], "MEDIUM_RISK");
    }
}
