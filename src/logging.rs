use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Where and how the daemon logs, read from the environment.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub loki_enabled: bool,
    pub loki_url: Option<String>,
    pub service_name: String,
    pub environment: String,
    pub log_level: String,
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("LOKI_ENABLED is true but LOKI_URL is not set")]
    MissingLokiUrl,
    #[error("Invalid log filter '{0}'")]
    Filter(String),
    #[cfg(feature = "loki")]
    #[error("Invalid Loki URL: {0}")]
    LokiUrl(#[from] url::ParseError),
    #[cfg(feature = "loki")]
    #[error("Loki layer: {0}")]
    Loki(#[from] tracing_loki::Error),
    #[error("Logging already initialized: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self {
            loki_enabled: std::env::var("LOKI_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            loki_url: std::env::var("LOKI_URL").ok().filter(|u| !u.trim().is_empty()),
            service_name: std::env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "riskmonitor".to_string()),
            environment: std::env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
            log_level: std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,sqlx=warn".to_string()),
        }
    }

    pub fn validate(&self) -> Result<(), LoggingError> {
        if self.loki_enabled && self.loki_url.is_none() {
            return Err(LoggingError::MissingLokiUrl);
        }
        EnvFilter::try_new(&self.log_level)
            .map(|_| ())
            .map_err(|_| LoggingError::Filter(self.log_level.clone()))
    }
}

/// Console output always; Loki as well when enabled and compiled in.
/// Must be called from inside the tokio runtime.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    config.validate()?;
    let filter = EnvFilter::try_new(&config.log_level)
        .map_err(|_| LoggingError::Filter(config.log_level.clone()))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(loki_layer(config)?)
        .try_init()?;

    tracing::info!(
        service = %config.service_name,
        environment = %config.environment,
        loki = config.loki_enabled,
        "📊 Logging initialized"
    );
    Ok(())
}

#[cfg(feature = "loki")]
fn loki_layer(config: &LoggingConfig) -> Result<Option<tracing_loki::Layer>, LoggingError> {
    let Some(loki_url) = config.loki_url.as_deref().filter(|_| config.loki_enabled) else {
        return Ok(None);
    };

    let (layer, task) = tracing_loki::builder()
        .label("service", &config.service_name)?
        .label("environment", &config.environment)?
        .build_url(url::Url::parse(loki_url)?)?;

    // Ships buffered log lines to Loki in the background
    tokio::spawn(task);
    Ok(Some(layer))
}

#[cfg(not(feature = "loki"))]
fn loki_layer(
    config: &LoggingConfig,
) -> Result<Option<tracing_subscriber::layer::Identity>, LoggingError> {
    if config.loki_enabled {
        eprintln!("LOKI_ENABLED is set but the binary was built without the `loki` feature");
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LoggingConfig {
        LoggingConfig {
            loki_enabled: false,
            loki_url: None,
            service_name: "riskmonitor".to_string(),
            environment: "test".to_string(),
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn test_loki_requires_url() {
        let enabled = LoggingConfig { loki_enabled: true, ..config() };
        assert!(matches!(enabled.validate(), Err(LoggingError::MissingLokiUrl)));

        let with_url = LoggingConfig {
            loki_url: Some("http://localhost:3100".to_string()),
            ..enabled
        };
        assert!(with_url.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_filter() {
        let bad = LoggingConfig { log_level: "riskmonitor=loud".to_string(), ..config() };
        assert!(matches!(bad.validate(), Err(LoggingError::Filter(_))));
    }
}
