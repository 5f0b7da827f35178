use std::str::FromStr;

/// Runtime configuration for the risk monitor daemon, read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub monitor: MonitorConfig,
    pub risk: RiskConfig,
    pub alert: AlertConfig,
    pub publish: PublishConfig,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Cron expression with a seconds field (tokio-cron-scheduler format)
    pub schedule: String,
    pub concurrency: usize,
    pub portfolio_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub var_time_horizon_days: u32,
    pub var_history_days: i64,
    pub monte_carlo_simulations: usize,
    pub position_limit_percent: f64,
}

#[derive(Debug, Clone)]
pub struct AlertConfig {
    pub cleanup_days: i64,
    pub cleanup_schedule: String,
    pub aml_large_transaction: f64,
    pub aml_velocity_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishSinkKind {
    PgNotify,
    Broadcast,
}

#[derive(Debug, Clone)]
pub struct PublishConfig {
    pub sink: PublishSinkKind,
    pub channel: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            schedule: "*/30 * * * * *".to_string(),
            concurrency: 4,
            portfolio_timeout_secs: 20,
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            var_time_horizon_days: 1,
            var_history_days: 252,
            monte_carlo_simulations: 10_000,
            position_limit_percent: 25.0,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cleanup_days: 30,
            cleanup_schedule: "0 0 3 * * *".to_string(),
            aml_large_transaction: 10_000.0,
            aml_velocity_count: 10,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL must be set".to_string())?;

        let monitor_defaults = MonitorConfig::default();
        let risk_defaults = RiskConfig::default();
        let alert_defaults = AlertConfig::default();

        let sink = match env_or("PUBLISH_SINK", "pg_notify".to_string()).to_lowercase().as_str() {
            "pg_notify" => PublishSinkKind::PgNotify,
            "broadcast" => PublishSinkKind::Broadcast,
            other => {
                return Err(format!(
                    "Invalid PUBLISH_SINK: {}. Must be 'pg_notify' or 'broadcast'",
                    other
                ))
            }
        };

        let config = Self {
            database_url,
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10),
            monitor: MonitorConfig {
                schedule: env_or("MONITOR_SCHEDULE", monitor_defaults.schedule),
                concurrency: env_or("MONITOR_CONCURRENCY", monitor_defaults.concurrency),
                portfolio_timeout_secs: env_or(
                    "MONITOR_PORTFOLIO_TIMEOUT_SECS",
                    monitor_defaults.portfolio_timeout_secs,
                ),
            },
            risk: RiskConfig {
                var_time_horizon_days: env_or("VAR_TIME_HORIZON", risk_defaults.var_time_horizon_days),
                var_history_days: env_or("VAR_HISTORY_DAYS", risk_defaults.var_history_days),
                monte_carlo_simulations: env_or(
                    "MONTE_CARLO_SIMULATIONS",
                    risk_defaults.monte_carlo_simulations,
                ),
                position_limit_percent: env_or(
                    "POSITION_LIMIT_PERCENT",
                    risk_defaults.position_limit_percent,
                ),
            },
            alert: AlertConfig {
                cleanup_days: env_or("ALERT_CLEANUP_DAYS", alert_defaults.cleanup_days),
                cleanup_schedule: env_or("ALERT_CLEANUP_SCHEDULE", alert_defaults.cleanup_schedule),
                aml_large_transaction: env_or("AML_LARGE_TRANSACTION", alert_defaults.aml_large_transaction),
                aml_velocity_count: env_or("AML_VELOCITY_COUNT", alert_defaults.aml_velocity_count),
            },
            publish: PublishConfig {
                sink,
                channel: env_or("PUBLISH_CHANNEL", "risk_events".to_string()),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.monitor.concurrency == 0 {
            return Err("MONITOR_CONCURRENCY must be at least 1".to_string());
        }
        if self.monitor.portfolio_timeout_secs == 0 {
            return Err("MONITOR_PORTFOLIO_TIMEOUT_SECS must be positive".to_string());
        }
        if self.risk.var_time_horizon_days == 0 {
            return Err("VAR_TIME_HORIZON must be at least 1 day".to_string());
        }
        if self.risk.var_history_days < 2 {
            return Err("VAR_HISTORY_DAYS must be at least 2".to_string());
        }
        if self.risk.monte_carlo_simulations == 0 {
            return Err("MONTE_CARLO_SIMULATIONS must be positive".to_string());
        }
        if !(0.0..=100.0).contains(&self.risk.position_limit_percent) || self.risk.position_limit_percent == 0.0 {
            return Err("POSITION_LIMIT_PERCENT must be in (0, 100]".to_string());
        }
        if self.alert.cleanup_days < 1 {
            return Err("ALERT_CLEANUP_DAYS must be at least 1".to_string());
        }
        if self.publish.channel.trim().is_empty() {
            return Err("PUBLISH_CHANNEL must not be empty".to_string());
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
