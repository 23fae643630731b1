use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use kolab_core::{
    DomainEvent,
    storage::{EventEnvelope, EventStore},
};

#[derive(Default)]
struct EventLog {
    sequence: i64,
    streams: HashMap<Uuid, Vec<EventEnvelope>>,
}

#[derive(Default)]
pub struct InMemoryEvents {
    log: RwLock<EventLog>,
}

#[async_trait]
impl EventStore for InMemoryEvents {
    async fn append(&self, stream_id: Uuid, event: DomainEvent) -> anyhow::Result<EventEnvelope> {
        let mut log = self.log.write().await;
        log.sequence += 1;

        let envelope = EventEnvelope {
            sequence: log.sequence,
            stream_id,
            event,
            stored_at: Utc::now(),
        };
        log.streams.entry(stream_id).or_default().push(envelope.clone());
        Ok(envelope)
    }

    async fn stream(&self, stream_id: Uuid) -> anyhow::Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;
        Ok(log.streams.get(&stream_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kolab_core::DomainEventKind;

    #[tokio::test]
    async fn appends_are_sequenced_across_streams() {
        let store = InMemoryEvents::default();
        let first_deal = Uuid::new_v4();
        let second_deal = Uuid::new_v4();

        let a = store
            .append(
                first_deal,
                DomainEvent::new(first_deal, DomainEventKind::DealCreated, None),
            )
            .await
            .unwrap();
        let b = store
            .append(
                second_deal,
                DomainEvent::new(second_deal, DomainEventKind::DealCreated, None),
            )
            .await
            .unwrap();

        assert_eq!(a.sequence, 1);
        assert_eq!(b.sequence, 2);
        assert_eq!(store.stream(first_deal).await.unwrap().len(), 1);
        assert!(store.stream(Uuid::new_v4()).await.unwrap().is_empty());
    }
}
