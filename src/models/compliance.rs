use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionViolationSeverity {
    Major,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionViolation {
    pub symbol: String,
    /// Percentages are in percent units (30.0 for 30%)
    pub current_percent: f64,
    pub max_percent: f64,
    pub excess_percent: f64,
    pub market_value: f64,
    pub severity: PositionViolationSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Compliant,
    Violation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionLimitResult {
    pub portfolio_id: Uuid,
    pub max_limit: f64,
    pub violations: Vec<PositionViolation>,
    pub compliance_score: f64,
    pub status: ComplianceStatus,
    pub total_positions: usize,
    pub calculated_at: DateTime<Utc>,
}

impl PositionLimitResult {
    pub fn has_critical(&self) -> bool {
        self.violations
            .iter()
            .any(|v| v.severity == PositionViolationSeverity::Critical)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AmlFlag {
    LargeTransaction,
    HighVelocity,
    PossibleStructuring,
    RoundAmount,
}

impl AmlFlag {
    pub fn score(&self) -> u32 {
        match self {
            AmlFlag::LargeTransaction => 30,
            AmlFlag::HighVelocity => 40,
            AmlFlag::PossibleStructuring => 50,
            AmlFlag::RoundAmount => 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmlCheckResult {
    pub transaction_id: Uuid,
    pub passed: bool,
    pub requires_review: bool,
    pub risk_score: u32,
    pub flags: Vec<AmlFlag>,
}
