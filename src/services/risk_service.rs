use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{
    LiquidityDetails, LiquidityRiskLevel, MetricDetails, MetricStatus, MetricType, Portfolio,
    RiskHistory, RiskMetric, VarDetails,
};
use crate::services::liquidity_service::{assess_liquidity_risk, LiquidityCalculator, LiquidityResult};
use crate::services::var_service::{VarCalculator, VarResult, CONFIDENCE_95};
use crate::store::{get_or_create_thresholds, MetricStore, PortfolioStore, PriceHistoryStore, ThresholdStore};

/// VaR above this share of its limit is reported as WARNING.
const VAR_WARNING_SHARE: f64 = 0.75;
const MAX_HISTORY_POINTS: i64 = 1_000;

#[derive(Debug, Clone)]
pub struct VarAssessment {
    pub metric: RiskMetric,
    pub result: VarResult,
}

#[derive(Debug, Clone)]
pub struct LiquidityAssessment {
    pub metric: RiskMetric,
    pub result: LiquidityResult,
    pub risk: LiquidityRiskLevel,
}

/// Stores the risk service reads from and writes to.
#[derive(Clone)]
pub struct RiskStores {
    pub portfolios: Arc<dyn PortfolioStore>,
    pub thresholds: Arc<dyn ThresholdStore>,
    pub metrics: Arc<dyn MetricStore>,
    pub prices: Arc<dyn PriceHistoryStore>,
}

/// Portfolio-level VaR and liquidity metrics, persisted as they are computed.
#[derive(Clone)]
pub struct RiskService {
    stores: RiskStores,
    var: VarCalculator,
    liquidity: LiquidityCalculator,
    time_horizon_days: u32,
    history_days: i64,
}

pub fn var_status(var_95: f64, threshold: f64) -> MetricStatus {
    if var_95 > threshold {
        MetricStatus::Critical
    } else if var_95 > threshold * VAR_WARNING_SHARE {
        MetricStatus::Warning
    } else {
        MetricStatus::Safe
    }
}

pub fn liquidity_status(risk: LiquidityRiskLevel) -> MetricStatus {
    match risk {
        LiquidityRiskLevel::HighRisk => MetricStatus::Critical,
        LiquidityRiskLevel::MediumRisk => MetricStatus::Warning,
        LiquidityRiskLevel::LowRisk => MetricStatus::Safe,
    }
}

impl RiskService {
    pub fn new(
        stores: RiskStores,
        var: VarCalculator,
        liquidity: LiquidityCalculator,
        time_horizon_days: u32,
        history_days: i64,
    ) -> Self {
        Self {
            stores,
            var,
            liquidity,
            time_horizon_days: time_horizon_days.max(1),
            history_days,
        }
    }

    async fn load(&self, portfolio_id: Uuid) -> Result<Portfolio, AppError> {
        let portfolio = self.stores.portfolios.get_portfolio(portfolio_id).await?;
        if portfolio.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "portfolio {} has no positions",
                portfolio_id
            )));
        }
        Ok(portfolio)
    }

    pub async fn calculate_portfolio_var(&self, portfolio_id: Uuid) -> Result<VarAssessment, AppError> {
        let portfolio = self.load(portfolio_id).await?;
        let thresholds = get_or_create_thresholds(self.stores.thresholds.as_ref(), portfolio_id).await?;

        let symbols: Vec<String> = portfolio.positions.iter().map(|p| p.symbol.clone()).collect();
        // An unreachable price feed leaves VaR uncomputable, same as a short history
        let history = self
            .stores
            .prices
            .price_history(&symbols, self.history_days)
            .await
            .map_err(|e| {
                warn!("Price history unavailable for portfolio {}: {}", portfolio_id, e);
                AppError::InsufficientData(format!("price history unavailable: {}", e))
            })?;
        let result = self
            .var
            .calculate(&portfolio.positions, &history, self.time_horizon_days)?;

        let threshold = thresholds.var95_limit(result.portfolio_value);
        let metric = RiskMetric {
            id: Uuid::new_v4(),
            portfolio_id,
            metric_type: MetricType::Var,
            value: result.var_95,
            threshold,
            status: var_status(result.var_95, threshold),
            confidence_level: Some(CONFIDENCE_95),
            time_horizon_days: Some(result.time_horizon_days),
            calculated_at: Utc::now(),
            details: MetricDetails::Var(VarDetails {
                method: "blended".to_string(),
                position_count: portfolio.positions.len(),
                portfolio_value: result.portfolio_value,
                historical_var_95: result.historical.var_95,
                parametric_var_95: result.parametric.var_95,
                monte_carlo_var_95: result.monte_carlo.var_95,
                var_99: result.var_99,
                expected_shortfall_95: result.expected_shortfall_95,
                max_drawdown: result.max_drawdown,
                observations: result.observations,
            }),
        };

        self.persist(&metric).await?;
        info!(
            "📊 VaR for portfolio {}: {:.2} ({}) against {:.2}",
            portfolio_id,
            metric.value,
            metric.status.as_str(),
            threshold
        );

        Ok(VarAssessment { metric, result })
    }

    pub async fn calculate_portfolio_liquidity(
        &self,
        portfolio_id: Uuid,
    ) -> Result<LiquidityAssessment, AppError> {
        let portfolio = self.load(portfolio_id).await?;
        let thresholds = get_or_create_thresholds(self.stores.thresholds.as_ref(), portfolio_id).await?;

        let result = self
            .liquidity
            .analyze(&portfolio.positions, portfolio.total_value)
            .await?;
        let risk = assess_liquidity_risk(result.liquidity_ratio);

        let metric = RiskMetric {
            id: Uuid::new_v4(),
            portfolio_id,
            metric_type: MetricType::LiquidityRatio,
            value: result.liquidity_ratio,
            threshold: thresholds.min_liquidity_ratio,
            status: liquidity_status(risk),
            confidence_level: None,
            time_horizon_days: None,
            calculated_at: result.timestamp,
            details: MetricDetails::Liquidity(LiquidityDetails {
                health: result.liquidity_health,
                risk_assessment: risk,
                normal_market_days: result.normal_market_days,
                stressed_market_days: result.stressed_market_days,
                crisis_market_days: result.crisis_market_days,
                position_count: portfolio.positions.len(),
                portfolio_value: result.portfolio_value,
                breakdown: result.breakdown(),
            }),
        };

        self.persist(&metric).await?;
        info!(
            "💧 Liquidity for portfolio {}: ratio {:.3} ({})",
            portfolio_id,
            metric.value,
            risk.as_str()
        );

        Ok(LiquidityAssessment {
            metric,
            result,
            risk,
        })
    }

    /// The metric row must land; the history point is best effort.
    async fn persist(&self, metric: &RiskMetric) -> Result<(), AppError> {
        self.stores.metrics.insert_metric(metric).await?;
        if let Err(e) = self
            .stores
            .metrics
            .insert_history(&RiskHistory::from(metric))
            .await
        {
            warn!(
                "Failed to record {} history for portfolio {}: {}",
                metric.metric_type.as_str(),
                metric.portfolio_id,
                e
            );
        }
        Ok(())
    }

    /// Newest first, at most `limit` points.
    pub async fn risk_history(
        &self,
        portfolio_id: Uuid,
        metric_type: Option<MetricType>,
        limit: i64,
    ) -> Result<Vec<RiskHistory>, AppError> {
        if limit < 1 {
            return Err(AppError::InvalidInput(format!("limit must be positive, got {}", limit)));
        }
        self.stores
            .metrics
            .risk_history(portfolio_id, metric_type, limit.min(MAX_HISTORY_POINTS))
            .await
    }

    pub async fn latest_metrics(&self, portfolio_id: Uuid) -> Result<Vec<RiskMetric>, AppError> {
        self.stores.metrics.latest_metrics(portfolio_id).await
    }
}
