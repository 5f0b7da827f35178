pub mod alert_service;
pub mod compliance_service;
pub mod job_scheduler_service;
pub mod liquidity_service;
pub mod risk_service;
pub mod statistics;
pub mod trade_risk_service;
pub mod var_service;
