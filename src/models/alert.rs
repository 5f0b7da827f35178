use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::compliance::PositionViolation;
use super::market::LiquidityRiskLevel;
use super::risk::LiquidityBreakdown;
use super::transaction::{RiskViolation, TradeSide};
use crate::errors::AppError;

// ==============================================================================
// Alert Enums
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    RiskBreach,
    LiquidityRisk,
    ComplianceViolation,
    SuspiciousActivity,
    RiskViolation,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::RiskBreach => "RISK_BREACH",
            AlertType::LiquidityRisk => "LIQUIDITY_RISK",
            AlertType::ComplianceViolation => "COMPLIANCE_VIOLATION",
            AlertType::SuspiciousActivity => "SUSPICIOUS_ACTIVITY",
            AlertType::RiskViolation => "RISK_VIOLATION",
        }
    }
}

impl FromStr for AlertType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RISK_BREACH" => Ok(AlertType::RiskBreach),
            "LIQUIDITY_RISK" => Ok(AlertType::LiquidityRisk),
            "COMPLIANCE_VIOLATION" => Ok(AlertType::ComplianceViolation),
            "SUSPICIOUS_ACTIVITY" => Ok(AlertType::SuspiciousActivity),
            "RISK_VIOLATION" => Ok(AlertType::RiskViolation),
            other => Err(format!("unknown alert type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "LOW",
            AlertSeverity::Medium => "MEDIUM",
            AlertSeverity::High => "HIGH",
            AlertSeverity::Critical => "CRITICAL",
        }
    }
}

impl FromStr for AlertSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(AlertSeverity::Low),
            "MEDIUM" => Ok(AlertSeverity::Medium),
            "HIGH" => Ok(AlertSeverity::High),
            "CRITICAL" => Ok(AlertSeverity::Critical),
            other => Err(format!("unknown alert severity: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
    Dismissed,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "ACTIVE",
            AlertStatus::Acknowledged => "ACKNOWLEDGED",
            AlertStatus::Resolved => "RESOLVED",
            AlertStatus::Dismissed => "DISMISSED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AlertStatus::Resolved | AlertStatus::Dismissed)
    }
}

impl FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(AlertStatus::Active),
            "ACKNOWLEDGED" => Ok(AlertStatus::Acknowledged),
            "RESOLVED" => Ok(AlertStatus::Resolved),
            "DISMISSED" => Ok(AlertStatus::Dismissed),
            other => Err(format!("unknown alert status: {}", other)),
        }
    }
}

// ==============================================================================
// Trigger Context
// ==============================================================================

/// What caused an alert, one variant per checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertContext {
    MetricBreach {
        metric_type: String,
        current_value: f64,
        threshold: f64,
        breach_ratio: f64,
    },
    VarStatus {
        var_value: f64,
        var_percentage: f64,
        threshold: f64,
        confidence_level: f64,
        method: String,
    },
    Liquidity {
        liquidity_ratio: f64,
        liquidity_score: f64,
        days_to_liquidate: f64,
        risk_assessment: LiquidityRiskLevel,
        breakdown: LiquidityBreakdown,
    },
    PositionLimit {
        max_limit: f64,
        violations_count: usize,
        compliance_score: f64,
        violations: Vec<PositionViolation>,
    },
    LargeTransaction {
        transaction_id: Uuid,
        amount: f64,
        symbol: String,
        side: TradeSide,
        threshold: f64,
    },
    Velocity {
        time_window_hours: i64,
        threshold: usize,
        transaction_count: usize,
    },
    TradeViolation {
        trade_id: Uuid,
        symbol: String,
        violation: RiskViolation,
    },
}

// ==============================================================================
// Alert Records
// ==============================================================================

/// A candidate alert before deduplication and persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    pub portfolio_id: Uuid,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    pub source: String,
    pub triggered_by: AlertContext,
}

impl NewAlert {
    pub fn into_alert(self, now: DateTime<Utc>) -> Alert {
        Alert {
            id: Uuid::new_v4(),
            portfolio_id: self.portfolio_id,
            alert_type: self.alert_type,
            severity: self.severity,
            title: self.title,
            description: self.description,
            source: self.source,
            status: AlertStatus::Active,
            triggered_by: self.triggered_by,
            resolution: None,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_by: None,
            resolved_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub portfolio_id: Uuid,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    pub source: String,
    pub status: AlertStatus,
    pub triggered_by: AlertContext,
    pub resolution: Option<String>,
    pub acknowledged_by: Option<Uuid>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    /// Also set when an alert is dismissed
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Alert {
    /// ACTIVE -> ACKNOWLEDGED
    pub fn acknowledge(&mut self, user_id: Uuid, now: DateTime<Utc>) -> Result<(), AppError> {
        if self.status != AlertStatus::Active {
            return Err(self.transition_error(AlertStatus::Acknowledged));
        }
        self.status = AlertStatus::Acknowledged;
        self.acknowledged_by = Some(user_id);
        self.acknowledged_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// ACTIVE | ACKNOWLEDGED -> RESOLVED
    pub fn resolve(
        &mut self,
        user_id: Uuid,
        resolution: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.close(AlertStatus::Resolved, user_id, now)?;
        self.resolution = Some(resolution.into());
        Ok(())
    }

    /// ACTIVE | ACKNOWLEDGED -> DISMISSED
    pub fn dismiss(&mut self, user_id: Uuid, now: DateTime<Utc>) -> Result<(), AppError> {
        self.close(AlertStatus::Dismissed, user_id, now)
    }

    fn close(&mut self, to: AlertStatus, user_id: Uuid, now: DateTime<Utc>) -> Result<(), AppError> {
        if self.status.is_terminal() {
            return Err(self.transition_error(to));
        }
        self.status = to;
        self.resolved_by = Some(user_id);
        self.resolved_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    fn transition_error(&self, to: AlertStatus) -> AppError {
        AppError::InvalidTransition(format!(
            "alert {} cannot move from {} to {}",
            self.id,
            self.status.as_str(),
            to.as_str()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Alert {
        NewAlert {
            portfolio_id: Uuid::new_v4(),
            alert_type: AlertType::RiskBreach,
            severity: AlertSeverity::High,
            title: "VaR Limit CRITICAL".to_string(),
            description: "test".to_string(),
            source: "VAR_CALCULATOR".to_string(),
            triggered_by: AlertContext::MetricBreach {
                metric_type: "VAR".to_string(),
                current_value: 2.0,
                threshold: 1.0,
                breach_ratio: 2.0,
            },
        }
        .into_alert(Utc::now())
    }

    #[test]
    fn test_acknowledge_then_resolve() {
        let mut alert = sample();
        let user = Uuid::new_v4();
        alert.acknowledge(user, Utc::now()).unwrap();
        assert_eq!(alert.status, AlertStatus::Acknowledged);
        assert_eq!(alert.acknowledged_by, Some(user));

        alert.resolve(user, "hedged", Utc::now()).unwrap();
        assert_eq!(alert.status, AlertStatus::Resolved);
        assert_eq!(alert.resolution.as_deref(), Some("hedged"));
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let mut alert = sample();
        let user = Uuid::new_v4();
        alert.dismiss(user, Utc::now()).unwrap();

        assert!(matches!(
            alert.acknowledge(user, Utc::now()),
            Err(AppError::InvalidTransition(_))
        ));
        assert!(matches!(
            alert.resolve(user, "late", Utc::now()),
            Err(AppError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_cannot_acknowledge_twice() {
        let mut alert = sample();
        alert.acknowledge(Uuid::new_v4(), Utc::now()).unwrap();
        assert!(alert.acknowledge(Uuid::new_v4(), Utc::now()).is_err());
    }

    #[test]
    fn test_context_is_tagged() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["triggered_by"]["kind"], "metric_breach");
        assert_eq!(json["alert_type"], "RISK_BREACH");
        assert_eq!(json["status"], "ACTIVE");
    }
}
