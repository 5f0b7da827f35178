use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::alert::{Alert, AlertType};
use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RiskUpdate,
    NewAlert,
    AmlAlert,
}

/// Compact per-portfolio result of a monitor pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskUpdate {
    pub portfolio_id: Uuid,
    /// None when there was not enough price history
    pub var: Option<f64>,
    pub liquidity: Option<f64>,
    pub timestamp: i64,
}

/// Envelope handed to a publish sink: `{type, data, timestamp}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub data: serde_json::Value,
    pub timestamp: i64,
}

impl PublishEvent {
    fn build<T: Serialize>(event_type: EventType, data: &T, at: DateTime<Utc>) -> Result<Self, AppError> {
        Ok(Self {
            event_type,
            data: serde_json::to_value(data)?,
            timestamp: at.timestamp(),
        })
    }

    pub fn risk_update(update: &RiskUpdate) -> Result<Self, AppError> {
        Self::build(EventType::RiskUpdate, update, Utc::now())
    }

    /// Suspicious-activity alerts go out as `aml_alert`, everything else as `new_alert`.
    pub fn for_alert(alert: &Alert) -> Result<Self, AppError> {
        let event_type = match alert.alert_type {
            AlertType::SuspiciousActivity => EventType::AmlAlert,
            _ => EventType::NewAlert,
        };
        Self::build(event_type, alert, Utc::now())
    }

    pub fn to_json(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string(self)?)
    }
}
