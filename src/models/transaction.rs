use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

impl FromStr for TradeSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BUY" => Ok(TradeSide::Buy),
            "SELL" => Ok(TradeSide::Sell),
            other => Err(format!("unknown trade side: {}", other)),
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// A buy or sell against one portfolio, either proposed (pre-trade check) or
// already booked (AML checks).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub portfolio_id: Uuid,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: f64,
    pub price: f64,
    /// Cash amount of the transaction, quantity * price unless booked otherwise
    pub amount: f64,
    pub stop_loss: Option<f64>,
    pub aml_checked: bool,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        portfolio_id: Uuid,
        symbol: impl Into<String>,
        side: TradeSide,
        quantity: f64,
        price: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            portfolio_id,
            symbol: symbol.into(),
            side,
            quantity,
            price,
            amount: quantity * price,
            stop_loss: None,
            aml_checked: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_stop_loss(mut self, stop_loss: f64) -> Self {
        self.stop_loss = Some(stop_loss);
        self
    }

    pub fn trade_value(&self) -> f64 {
        self.quantity * self.price
    }

    /// A zero stop is treated the same as no stop.
    pub fn has_stop_loss(&self) -> bool {
        matches!(self.stop_loss, Some(s) if s != 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationType {
    PositionSize,
    VarLimit,
    ConcentrationLimit,
    LiquidityRatio,
    StopLossRequired,
}

impl ViolationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationType::PositionSize => "POSITION_SIZE",
            ViolationType::VarLimit => "VAR_LIMIT",
            ViolationType::ConcentrationLimit => "CONCENTRATION_LIMIT",
            ViolationType::LiquidityRatio => "LIQUIDITY_RATIO",
            ViolationType::StopLossRequired => "STOP_LOSS_REQUIRED",
        }
    }
}

/// Ordered: `Warning < Violation < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationSeverity {
    Warning,
    Violation,
    Critical,
}

impl ViolationSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationSeverity::Warning => "WARNING",
            ViolationSeverity::Violation => "VIOLATION",
            ViolationSeverity::Critical => "CRITICAL",
        }
    }

    /// Contribution to a trade's risk score.
    pub fn score_points(&self) -> f64 {
        match self {
            ViolationSeverity::Warning => 10.0,
            ViolationSeverity::Violation => 20.0,
            ViolationSeverity::Critical => 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskViolation {
    pub violation_type: ViolationType,
    pub severity: ViolationSeverity,
    pub description: String,
    pub current_value: f64,
    pub limit: f64,
    /// Relative overshoot of the limit
    pub impact: f64,
}

/// Outcome of a pre-trade check. Not persisted on its own; the verdict is
/// attached to the transaction record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRiskAnalysis {
    pub trade_id: Uuid,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: f64,
    pub price: f64,

    pub position_risk: f64,
    pub portfolio_impact: f64,
    pub concentration_impact: f64,
    pub liquidity_impact: f64,

    pub violations: Vec<RiskViolation>,
    pub risk_score: f64,
    pub approved: bool,
    pub requires_review: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_stop_loss: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hedge_recommendation: Option<String>,
}

impl TradeRiskAnalysis {
    pub fn for_transaction(tx: &Transaction) -> Self {
        Self {
            trade_id: tx.id,
            symbol: tx.symbol.clone(),
            side: tx.side,
            quantity: tx.quantity,
            price: tx.price,
            position_risk: 0.0,
            portfolio_impact: 0.0,
            concentration_impact: 0.0,
            liquidity_impact: 0.0,
            violations: Vec::new(),
            risk_score: 0.0,
            approved: false,
            requires_review: false,
            suggested_stop_loss: None,
            suggested_size: None,
            hedge_recommendation: None,
        }
    }

    pub fn has_critical(&self) -> bool {
        self.violations
            .iter()
            .any(|v| v.severity == ViolationSeverity::Critical)
    }

    pub fn is_rejected(&self) -> bool {
        !self.approved && !self.requires_review
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(ViolationSeverity::Warning < ViolationSeverity::Violation);
        assert!(ViolationSeverity::Violation < ViolationSeverity::Critical);
    }

    #[test]
    fn test_zero_stop_is_no_stop() {
        let tx = Transaction::new(Uuid::nil(), "AAPL", TradeSide::Buy, 10.0, 100.0);
        assert!(!tx.has_stop_loss());
        assert!(!tx.clone().with_stop_loss(0.0).has_stop_loss());
        assert!(tx.with_stop_loss(95.0).has_stop_loss());
    }

    #[test]
    fn test_violation_serializes_with_wire_names() {
        let v = RiskViolation {
            violation_type: ViolationType::StopLossRequired,
            severity: ViolationSeverity::Warning,
            description: "Stop loss is required but not set".to_string(),
            current_value: 0.0,
            limit: 0.0,
            impact: 0.0,
        };
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["violation_type"], "STOP_LOSS_REQUIRED");
        assert_eq!(json["severity"], "WARNING");
    }
}
