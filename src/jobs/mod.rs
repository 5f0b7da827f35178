//! Background Jobs Module
//!
//! Jobs registered with the job scheduler service.
//!
//! # Available Jobs
//!
//! - `risk_monitor_job` - Periodic VaR, liquidity, position-limit and AML pass over every portfolio
//! - `alert_cleanup_job` - Deletes closed alerts past their retention
//!
//! Every job returns a `JobResult` with processed/failed counts and is safe to
//! re-run. A failure on one item is logged and counted, never fatal to the run.

pub mod alert_cleanup_job;
pub mod risk_monitor_job;
