use anyhow::Result;
use redis::{AsyncCommands, Client};
use serde::Serialize;

use kolab_core::DomainEventKind;

/// Pub/sub fan-out for deal lifecycle notifications. Downstream collaborators
/// (mail, push) subscribe to the per-kind channels; this service only
/// publishes, always after the owning transaction has committed.
#[derive(Clone)]
pub struct RedisBus {
    client: Client,
}

impl RedisBus {
    pub fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn deal_channel(kind: DomainEventKind) -> String {
        format!("deals.{kind}")
    }

    pub async fn publish_json<T: Serialize>(&self, channel: &str, payload: &T) -> Result<()> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let serialized = serde_json::to_string(payload)?;
        let _: i64 = connection.publish(channel, serialized).await?;
        Ok(())
    }

    pub async fn publish_deal_event<T: Serialize>(
        &self,
        kind: DomainEventKind,
        payload: &T,
    ) -> Result<()> {
        self.publish_json(&Self::deal_channel(kind), payload).await
    }
}
