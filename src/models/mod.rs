mod alert;
mod compliance;
mod event;
mod market;
mod portfolio;
mod position;
mod risk;
mod transaction;

pub use alert::{Alert, AlertContext, AlertSeverity, AlertStatus, AlertType, NewAlert};
pub use compliance::{
    AmlCheckResult, AmlFlag, ComplianceStatus, PositionLimitResult, PositionViolation,
    PositionViolationSeverity,
};
pub use event::{EventType, PublishEvent, RiskUpdate};
pub use market::{
    LiquidityClass, LiquidityHealth, LiquidityRiskLevel, MarketCondition, MarketDepth,
    MarketQuote, PriceLevel,
};
pub use portfolio::Portfolio;
pub use position::{AssetType, LiquidityTag, Position};
pub use risk::{
    LiquidityBreakdown, LiquidityDetails, MetricDetails, MetricStatus, MetricType, RiskHistory,
    RiskMetric, RiskThresholds, VarDetails,
};
pub use transaction::{
    RiskViolation, TradeRiskAnalysis, TradeSide, Transaction, ViolationSeverity, ViolationType,
};
