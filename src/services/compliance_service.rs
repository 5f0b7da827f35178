use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::models::{
    AmlCheckResult, AmlFlag, ComplianceStatus, Portfolio, PositionLimitResult, PositionViolation,
    PositionViolationSeverity, Transaction,
};

const STRUCTURING_FLOOR: f64 = 0.9;
const STRUCTURING_COUNT: usize = 3;
const REVIEW_SCORE: u32 = 50;

/// Thresholds for the transaction monitoring rules.
#[derive(Debug, Clone)]
pub struct AmlRules {
    pub large_transaction: f64,
    pub velocity_count: usize,
    pub velocity_window: Duration,
}

impl Default for AmlRules {
    fn default() -> Self {
        Self {
            large_transaction: 10_000.0,
            velocity_count: 10,
            velocity_window: Duration::hours(24),
        }
    }
}

/// Position concentration limits and AML screening.
#[derive(Debug, Clone)]
pub struct ComplianceService {
    rules: AmlRules,
    position_limit_percent: f64,
}

impl ComplianceService {
    pub fn new(rules: AmlRules, position_limit_percent: f64) -> Self {
        Self {
            rules,
            position_limit_percent,
        }
    }

    pub fn rules(&self) -> &AmlRules {
        &self.rules
    }

    pub fn position_limit_percent(&self) -> f64 {
        self.position_limit_percent
    }

    /// Every position whose weight exceeds `max_percent` (percent units).
    /// A position above twice the limit is CRITICAL.
    pub fn check_position_limits(&self, portfolio: &Portfolio, max_percent: f64) -> PositionLimitResult {
        let mut violations = Vec::new();

        if portfolio.total_value > 0.0 {
            for position in &portfolio.positions {
                let current_percent = position.weight(portfolio.total_value) * 100.0;
                if current_percent <= max_percent {
                    continue;
                }
                let severity = if current_percent > max_percent * 2.0 {
                    PositionViolationSeverity::Critical
                } else {
                    PositionViolationSeverity::Major
                };
                violations.push(PositionViolation {
                    symbol: position.symbol.clone(),
                    current_percent,
                    max_percent,
                    excess_percent: current_percent - max_percent,
                    market_value: position.market_value,
                    severity,
                });
            }
        }

        let status = if violations.is_empty() {
            ComplianceStatus::Compliant
        } else {
            ComplianceStatus::Violation
        };

        PositionLimitResult {
            portfolio_id: portfolio.id,
            max_limit: max_percent,
            compliance_score: (100.0 - 10.0 * violations.len() as f64).max(0.0),
            status,
            total_positions: portfolio.positions.len(),
            calculated_at: Utc::now(),
            violations,
        }
    }

    /// Screens one transaction against the portfolio's recent activity.
    pub fn check_transaction_aml(
        &self,
        tx: &Transaction,
        recent: &[Transaction],
        now: DateTime<Utc>,
    ) -> AmlCheckResult {
        let since = now - self.rules.velocity_window;
        let mut flags = Vec::new();

        if tx.amount > self.rules.large_transaction {
            flags.push(AmlFlag::LargeTransaction);
        }
        if self.detect_high_velocity(recent, since) {
            flags.push(AmlFlag::HighVelocity);
        }
        if self.detect_structuring(recent, since) {
            flags.push(AmlFlag::PossibleStructuring);
        }
        if is_round_amount(tx.amount) {
            flags.push(AmlFlag::RoundAmount);
        }

        let risk_score: u32 = flags.iter().map(AmlFlag::score).sum();
        let flagged = risk_score >= REVIEW_SCORE;
        if flagged {
            debug!(
                "AML flags on transaction {}: {:?} (score {})",
                tx.id, flags, risk_score
            );
        }

        AmlCheckResult {
            transaction_id: tx.id,
            passed: !flagged,
            requires_review: flagged,
            risk_score,
            flags,
        }
    }

    /// More transactions after `since` than the velocity limit allows.
    pub fn detect_high_velocity(&self, recent: &[Transaction], since: DateTime<Utc>) -> bool {
        count_since(recent, since) > self.rules.velocity_count
    }

    /// Several transactions just under the reporting threshold.
    pub fn detect_structuring(&self, recent: &[Transaction], since: DateTime<Utc>) -> bool {
        let ceiling = self.rules.large_transaction;
        let floor = ceiling * STRUCTURING_FLOOR;
        recent
            .iter()
            .filter(|t| t.created_at > since && t.amount > floor && t.amount < ceiling)
            .count()
            >= STRUCTURING_COUNT
    }
}

pub fn count_since(transactions: &[Transaction], since: DateTime<Utc>) -> usize {
    transactions.iter().filter(|t| t.created_at > since).count()
}

/// Positive whole amounts that are a multiple of 1,000.
pub fn is_round_amount(amount: f64) -> bool {
    amount > 0.0
        && amount.fract() == 0.0
        && amount < i64::MAX as f64
        && (amount as i64) % 1_000 == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetType, Position, TradeSide};
    use uuid::Uuid;

    fn service() -> ComplianceService {
        ComplianceService::new(AmlRules::default(), 25.0)
    }

    fn tx_at(amount: f64, minutes_ago: i64) -> Transaction {
        let mut tx = Transaction::new(Uuid::nil(), "AAPL", TradeSide::Buy, 1.0, amount);
        tx.created_at = Utc::now() - Duration::minutes(minutes_ago);
        tx
    }

    #[test]
    fn test_position_limit_severity() {
        let portfolio = Portfolio::new(
            "Concentrated",
            vec![
                Position::new(Uuid::nil(), "AAPL", 60.0, 100.0, 100.0, AssetType::Stock),
                Position::new(Uuid::nil(), "MSFT", 30.0, 100.0, 100.0, AssetType::Stock),
                Position::new(Uuid::nil(), "TLT", 10.0, 100.0, 100.0, AssetType::GovernmentBond),
            ],
        );
        let result = service().check_position_limits(&portfolio, 25.0);

        assert_eq!(result.status, ComplianceStatus::Violation);
        assert_eq!(result.violations.len(), 2);
        assert_eq!(result.compliance_score, 80.0);
        assert!(result.has_critical());

        let aapl = &result.violations[0];
        assert_eq!(aapl.symbol, "AAPL");
        assert_eq!(aapl.severity, PositionViolationSeverity::Critical);
        assert!((aapl.excess_percent - 35.0).abs() < 1e-9);
        assert_eq!(result.violations[1].severity, PositionViolationSeverity::Major);
    }

    #[test]
    fn test_zero_value_portfolio_is_compliant() {
        let portfolio = Portfolio::new(
            "Flat",
            vec![Position::new(Uuid::nil(), "AAPL", 0.0, 100.0, 100.0, AssetType::Stock)],
        );
        let result = service().check_position_limits(&portfolio, 25.0);
        assert!(result.violations.is_empty());
        assert_eq!(result.status, ComplianceStatus::Compliant);
    }

    #[test]
    fn test_large_round_transaction() {
        let tx = tx_at(20_000.0, 0);
        let result = service().check_transaction_aml(&tx, &[], Utc::now());
        assert_eq!(result.flags, vec![AmlFlag::LargeTransaction, AmlFlag::RoundAmount]);
        assert_eq!(result.risk_score, 40);
        assert!(result.passed);
    }

    #[test]
    fn test_zero_amount_is_not_flagged() {
        let tx = tx_at(0.0, 0);
        let result = service().check_transaction_aml(&tx, &[], Utc::now());
        assert!(result.flags.is_empty());
        assert_eq!(result.risk_score, 0);
        assert!(result.passed);
    }

    #[test]
    fn test_structuring_requires_review() {
        let recent = vec![tx_at(9_500.0, 10), tx_at(9_800.0, 20), tx_at(9_100.5, 30)];
        let tx = tx_at(9_900.25, 0);
        let result = service().check_transaction_aml(&tx, &recent, Utc::now());
        assert!(result.flags.contains(&AmlFlag::PossibleStructuring));
        assert!(!result.passed);
        assert!(result.requires_review);
    }

    #[test]
    fn test_velocity_counts_only_window() {
        let svc = service();
        let mut recent: Vec<Transaction> = (0..11).map(|i| tx_at(100.0, i)).collect();
        let since = Utc::now() - Duration::hours(24);
        assert!(svc.detect_high_velocity(&recent, since));

        recent.truncate(10);
        recent.push(tx_at(100.0, 60 * 25));
        assert!(!svc.detect_high_velocity(&recent, since));
    }

    #[test]
    fn test_round_amounts() {
        assert!(is_round_amount(5_000.0));
        assert!(!is_round_amount(5_000.5));
        assert!(!is_round_amount(2_500.0));
        assert!(!is_round_amount(0.0));
        assert!(!is_round_amount(-3_000.0));
    }
}
