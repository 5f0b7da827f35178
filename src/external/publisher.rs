use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::PgPool;
use tokio::sync::broadcast;
use tracing::debug;

use crate::errors::AppError;
use crate::models::PublishEvent;

/// Somewhere to push risk events for live consumers.
#[async_trait]
pub trait PublishSink: Send + Sync {
    async fn publish(&self, event: &PublishEvent) -> Result<(), AppError>;
}

/// Fans events out to in-process subscribers (for example a WebSocket layer).
#[derive(Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<PublishEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl PublishSink for BroadcastPublisher {
    async fn publish(&self, event: &PublishEvent) -> Result<(), AppError> {
        // No subscribers is not a failure
        if let Err(e) = self.sender.send(event.clone()) {
            debug!("Event dropped, no subscribers: {:?}", e.0.event_type);
        }
        Ok(())
    }
}

/// Publishes the JSON envelope with `pg_notify` on a fixed channel.
#[derive(Clone)]
pub struct PgNotifyPublisher {
    pool: PgPool,
    channel: String,
}

impl PgNotifyPublisher {
    pub fn new(pool: PgPool, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl PublishSink for PgNotifyPublisher {
    async fn publish(&self, event: &PublishEvent) -> Result<(), AppError> {
        let payload = event.to_json()?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(&self.channel)
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Publish(e.to_string()))?;
        Ok(())
    }
}

/// Keeps every published event in memory.
#[derive(Clone, Default)]
pub struct MemoryPublisher {
    events: Arc<Mutex<Vec<PublishEvent>>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PublishEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl PublishSink for MemoryPublisher {
    async fn publish(&self, event: &PublishEvent) -> Result<(), AppError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventType, RiskUpdate};
    use uuid::Uuid;

    fn event() -> PublishEvent {
        PublishEvent::risk_update(&RiskUpdate {
            portfolio_id: Uuid::nil(),
            var: Some(1.0),
            liquidity: Some(0.5),
            timestamp: 0,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let publisher = BroadcastPublisher::new(8);
        let mut rx = publisher.subscribe();
        publisher.publish(&event()).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type, EventType::RiskUpdate);
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_ok() {
        let publisher = BroadcastPublisher::new(8);
        assert!(publisher.publish(&event()).await.is_ok());
    }
}
