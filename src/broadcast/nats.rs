//! NATS mirror of lifecycle events.
//!
//! A downstream notification feed: each event is published on
//! `orderease.shop.{shop_id}.{event}` from its own task, so a slow or broken
//! NATS connection never holds up the write path.

use crate::domain::events::OrderEvent;

#[derive(Clone)]
pub struct NatsMirror {
    client: async_nats::Client,
}

impl NatsMirror {
    pub async fn connect(url: &str) -> Result<Self, async_nats::ConnectError> {
        let client = async_nats::connect(url).await?;
        tracing::info!(url, "NATS event mirror connected");
        Ok(Self { client })
    }

    pub fn subject(event: &OrderEvent) -> String {
        format!("orderease.shop.{}.{}", event.shop_id(), event.name())
    }

    pub fn forward(&self, event: &OrderEvent) {
        let payload = match event.payload() {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, order_id = event.order_id(), "failed to encode event for NATS");
                return;
            }
        };
        let subject = Self::subject(event);
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = client.publish(subject.clone(), payload.into_bytes().into()).await {
                tracing::warn!(error = %e, subject, "NATS publish failed");
            }
        });
    }
}
