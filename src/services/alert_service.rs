// Alert creation with time-windowed deduplication, plus the analyst-driven
// lifecycle (acknowledge / resolve / dismiss).

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::external::publisher::PublishSink;
use crate::models::{
    Alert, AlertContext, AlertSeverity, AlertType, LiquidityRiskLevel, MetricStatus, MetricType,
    NewAlert, PositionLimitResult, PositionViolationSeverity, PublishEvent, RiskViolation,
    Transaction, ViolationSeverity,
};
use crate::services::liquidity_service::LiquidityResult;
use crate::services::var_service::{VarResult, CONFIDENCE_95};
use crate::store::AlertStore;

pub const SOURCE_VAR: &str = "VAR_CALCULATOR";
pub const SOURCE_LIQUIDITY: &str = "LIQUIDITY_CALCULATOR";
pub const SOURCE_POSITION_LIMIT: &str = "POSITION_LIMIT_CHECKER";
pub const SOURCE_AML: &str = "AML_CHECKER";
pub const SOURCE_VELOCITY: &str = "VELOCITY_CHECKER";
pub const SOURCE_RISK_ENGINE: &str = "RISK_ENGINE";

/// How long an ACTIVE alert of the same type suppresses a new one.
/// `None` means the alert is never deduplicated.
pub fn dedup_window(alert_type: AlertType, source: &str) -> Option<Duration> {
    match alert_type {
        AlertType::RiskBreach => Some(Duration::minutes(10)),
        AlertType::LiquidityRisk => Some(Duration::minutes(15)),
        AlertType::ComplianceViolation => Some(Duration::minutes(5)),
        AlertType::SuspiciousActivity if source == SOURCE_VELOCITY => Some(Duration::minutes(30)),
        AlertType::SuspiciousActivity => Some(Duration::hours(1)),
        AlertType::RiskViolation => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RaiseOutcome {
    Created(Alert),
    /// A recent ACTIVE alert of the same type already exists
    Deduplicated,
}

impl RaiseOutcome {
    pub fn created(&self) -> Option<&Alert> {
        match self {
            RaiseOutcome::Created(alert) => Some(alert),
            RaiseOutcome::Deduplicated => None,
        }
    }
}

#[derive(Clone)]
pub struct AlertEngine {
    store: Arc<dyn AlertStore>,
    publisher: Arc<dyn PublishSink>,
}

impl AlertEngine {
    pub fn new(store: Arc<dyn AlertStore>, publisher: Arc<dyn PublishSink>) -> Self {
        Self { store, publisher }
    }

    pub async fn raise(&self, candidate: NewAlert) -> Result<RaiseOutcome, AppError> {
        self.raise_at(candidate, Utc::now()).await
    }

    /// Dedup check, persist, publish. The check and the insert are separate
    /// statements, so concurrent raisers may both get through.
    pub async fn raise_at(
        &self,
        candidate: NewAlert,
        now: DateTime<Utc>,
    ) -> Result<RaiseOutcome, AppError> {
        if let Some(window) = dedup_window(candidate.alert_type, &candidate.source) {
            let exists = self
                .store
                .has_recent_active(candidate.portfolio_id, candidate.alert_type, now - window)
                .await?;
            if exists {
                debug!(
                    portfolio_id = %candidate.portfolio_id,
                    alert_type = candidate.alert_type.as_str(),
                    "Alert suppressed, recent active alert exists"
                );
                return Ok(RaiseOutcome::Deduplicated);
            }
        }

        let alert = candidate.into_alert(now);
        self.store.insert_alert(&alert).await?;

        info!(
            "🚨 Alert raised: {} [{}] {} (portfolio {})",
            alert.alert_type.as_str(),
            alert.severity.as_str(),
            alert.title,
            alert.portfolio_id
        );

        self.publish(&alert).await;
        Ok(RaiseOutcome::Created(alert))
    }

    async fn publish(&self, alert: &Alert) {
        let event = match PublishEvent::for_alert(alert) {
            Ok(event) => event,
            Err(e) => {
                warn!("Failed to encode alert {}: {}", alert.id, e);
                return;
            }
        };
        if let Err(e) = self.publisher.publish(&event).await {
            warn!("Failed to publish alert {}: {}", alert.id, e);
        }
    }

    pub async fn acknowledge(&self, alert_id: Uuid, user_id: Uuid) -> Result<Alert, AppError> {
        let mut alert = self.store.get_alert(alert_id).await?;
        alert.acknowledge(user_id, Utc::now())?;
        self.store.update_alert(&alert).await?;
        Ok(alert)
    }

    pub async fn resolve(
        &self,
        alert_id: Uuid,
        user_id: Uuid,
        resolution: &str,
    ) -> Result<Alert, AppError> {
        let mut alert = self.store.get_alert(alert_id).await?;
        alert.resolve(user_id, resolution, Utc::now())?;
        self.store.update_alert(&alert).await?;
        Ok(alert)
    }

    pub async fn dismiss(&self, alert_id: Uuid, user_id: Uuid) -> Result<Alert, AppError> {
        let mut alert = self.store.get_alert(alert_id).await?;
        alert.dismiss(user_id, Utc::now())?;
        self.store.update_alert(&alert).await?;
        Ok(alert)
    }

    /// Raises a breach reported by an analyst or an external checker.
    pub async fn create_risk_breach_alert(
        &self,
        portfolio_id: Uuid,
        metric_type: MetricType,
        current_value: f64,
        threshold: f64,
    ) -> Result<RaiseOutcome, AppError> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(AppError::InvalidInput(format!(
                "breach threshold must be positive, got {}",
                threshold
            )));
        }
        self.raise(risk_breach_alert(portfolio_id, metric_type, current_value, threshold))
            .await
    }

    pub async fn active_alerts(&self, portfolio_id: Uuid) -> Result<Vec<Alert>, AppError> {
        self.store.active_alerts(portfolio_id).await
    }

    /// Deletes RESOLVED and DISMISSED alerts older than `days`.
    pub async fn cleanup_old_alerts(&self, days: i64) -> Result<u64, AppError> {
        if days < 1 {
            return Err(AppError::InvalidInput(format!(
                "retention must be at least one day, got {}",
                days
            )));
        }
        let cutoff = Utc::now() - Duration::days(days);
        let deleted = self.store.delete_closed_before(cutoff).await?;
        info!("🧹 Deleted {} closed alerts older than {} days", deleted, days);
        Ok(deleted)
    }
}

// ==============================================================================
// Alert Builders
// ==============================================================================

/// Manual threshold breach. Severity follows the breach ratio.
pub fn risk_breach_alert(
    portfolio_id: Uuid,
    metric_type: MetricType,
    current_value: f64,
    threshold: f64,
) -> NewAlert {
    let breach_ratio = if threshold > 0.0 {
        current_value / threshold
    } else {
        0.0
    };
    let severity = if breach_ratio >= 2.0 {
        AlertSeverity::Critical
    } else if breach_ratio >= 1.2 {
        AlertSeverity::High
    } else {
        AlertSeverity::Medium
    };
    let metric = metric_type.as_str();

    NewAlert {
        portfolio_id,
        alert_type: AlertType::RiskBreach,
        severity,
        title: format!("{} Threshold Breached", metric),
        description: format!(
            "{} of {:.2} exceeds threshold of {:.2} ({:.1}% breach)",
            metric,
            current_value,
            threshold,
            (breach_ratio - 1.0) * 100.0
        ),
        source: format!("{}_CALCULATOR", metric),
        triggered_by: AlertContext::MetricBreach {
            metric_type: metric.to_string(),
            current_value,
            threshold,
            breach_ratio,
        },
    }
}

/// Monitor VaR alert. Nothing to raise when the status is SAFE.
pub fn var_status_alert(
    portfolio_id: Uuid,
    var: &VarResult,
    threshold: f64,
    status: MetricStatus,
) -> Option<NewAlert> {
    let (severity, verb) = match status {
        MetricStatus::Safe => return None,
        MetricStatus::Warning => (AlertSeverity::Medium, "approaching"),
        MetricStatus::Critical => (AlertSeverity::High, "exceeds"),
    };
    let var_percentage = var.var_95_percent();

    Some(NewAlert {
        portfolio_id,
        alert_type: AlertType::RiskBreach,
        severity,
        title: format!("VaR Limit {}", status.as_str()),
        description: format!(
            "Portfolio VaR of ${:.2} ({:.2}%) {} threshold of ${:.2}",
            var.var_95, var_percentage, verb, threshold
        ),
        source: SOURCE_VAR.to_string(),
        triggered_by: AlertContext::VarStatus {
            var_value: var.var_95,
            var_percentage,
            threshold,
            confidence_level: CONFIDENCE_95,
            method: "blended".to_string(),
        },
    })
}

/// Raised for MEDIUM and HIGH liquidity risk.
pub fn liquidity_alert(
    portfolio_id: Uuid,
    liquidity: &LiquidityResult,
    assessment: LiquidityRiskLevel,
) -> Option<NewAlert> {
    let (severity, wording) = match assessment {
        LiquidityRiskLevel::LowRisk => return None,
        LiquidityRiskLevel::MediumRisk => (AlertSeverity::Medium, "moderate liquidity risk"),
        LiquidityRiskLevel::HighRisk => (AlertSeverity::High, "high liquidity risk"),
    };

    Some(NewAlert {
        portfolio_id,
        alert_type: AlertType::LiquidityRisk,
        severity,
        title: "Liquidity Risk Detected".to_string(),
        description: format!(
            "Portfolio liquidity ratio of {:.2}% indicates {}. Estimated {:.1} days to liquidate.",
            liquidity.liquidity_ratio * 100.0,
            wording,
            liquidity.normal_market_days
        ),
        source: SOURCE_LIQUIDITY.to_string(),
        triggered_by: AlertContext::Liquidity {
            liquidity_ratio: liquidity.liquidity_ratio,
            liquidity_score: liquidity.weighted_liquidity_score,
            days_to_liquidate: liquidity.normal_market_days,
            risk_assessment: assessment,
            breakdown: liquidity.breakdown(),
        },
    })
}

/// Concentration breach from the position-limit check. `None` when compliant.
pub fn position_limit_alert(result: &PositionLimitResult) -> Option<NewAlert> {
    if result.violations.is_empty() {
        return None;
    }

    let severity = if result.has_critical() {
        AlertSeverity::High
    } else {
        AlertSeverity::Medium
    };

    let mut description = format!(
        "{} position(s) exceed the {:.1}% concentration limit",
        result.violations.len(),
        result.max_limit
    );
    if let Some(worst) = result
        .violations
        .iter()
        .find(|v| v.severity == PositionViolationSeverity::Critical)
    {
        description.push_str(&format!(
            ". {}: {:.2}% (excess: {:.2}%)",
            worst.symbol, worst.current_percent, worst.excess_percent
        ));
    }

    Some(NewAlert {
        portfolio_id: result.portfolio_id,
        alert_type: AlertType::ComplianceViolation,
        severity,
        title: "Position Limit Breach".to_string(),
        description,
        source: SOURCE_POSITION_LIMIT.to_string(),
        triggered_by: AlertContext::PositionLimit {
            max_limit: result.max_limit,
            violations_count: result.violations.len(),
            compliance_score: result.compliance_score,
            violations: result.violations.clone(),
        },
    })
}

pub fn large_transaction_alert(tx: &Transaction, threshold: f64) -> NewAlert {
    NewAlert {
        portfolio_id: tx.portfolio_id,
        alert_type: AlertType::SuspiciousActivity,
        severity: AlertSeverity::High,
        title: "Large Transaction Detected".to_string(),
        description: format!(
            "Transaction of ${:.2} exceeds AML monitoring threshold (${:.0}). Symbol: {}, Type: {}",
            tx.amount, threshold, tx.symbol, tx.side
        ),
        source: SOURCE_AML.to_string(),
        triggered_by: AlertContext::LargeTransaction {
            transaction_id: tx.id,
            amount: tx.amount,
            symbol: tx.symbol.clone(),
            side: tx.side,
            threshold,
        },
    }
}

pub fn velocity_alert(portfolio_id: Uuid, transaction_count: usize, threshold: usize) -> NewAlert {
    NewAlert {
        portfolio_id,
        alert_type: AlertType::SuspiciousActivity,
        severity: AlertSeverity::Medium,
        title: "High Transaction Velocity".to_string(),
        description: "Unusually high number of transactions detected in the last 24 hours. \
                      This may indicate suspicious trading patterns."
            .to_string(),
        source: SOURCE_VELOCITY.to_string(),
        triggered_by: AlertContext::Velocity {
            time_window_hours: 24,
            threshold,
            transaction_count,
        },
    }
}

/// Alert for one violation of a rejected trade. Warnings do not alert.
pub fn trade_violation_alert(tx: &Transaction, violation: &RiskViolation) -> Option<NewAlert> {
    let severity = match violation.severity {
        ViolationSeverity::Critical => AlertSeverity::Critical,
        ViolationSeverity::Violation => AlertSeverity::High,
        ViolationSeverity::Warning => return None,
    };

    Some(NewAlert {
        portfolio_id: tx.portfolio_id,
        alert_type: AlertType::RiskViolation,
        severity,
        title: format!("Risk Violation: {}", violation.violation_type.as_str()),
        description: violation.description.clone(),
        source: SOURCE_RISK_ENGINE.to_string(),
        triggered_by: AlertContext::TradeViolation {
            trade_id: tx.id,
            symbol: tx.symbol.clone(),
            violation: violation.clone(),
        },
    })
}
