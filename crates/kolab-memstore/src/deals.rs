use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use kolab_core::{
    Deal,
    storage::{DealFilter, DealPatch, DealStore, DealUpdate},
};

#[derive(Default)]
struct DealTable {
    rows: HashMap<Uuid, Deal>,
    next_number: i64,
}

#[derive(Default)]
pub struct InMemoryDeals {
    table: RwLock<DealTable>,
}

#[async_trait]
impl DealStore for InMemoryDeals {
    async fn insert(&self, mut deal: Deal) -> anyhow::Result<Deal> {
        let mut table = self.table.write().await;
        table.next_number += 1;
        deal.deal_number = table.next_number;
        table.rows.insert(deal.id, deal.clone());
        Ok(deal)
    }

    async fn fetch(&self, deal_id: Uuid) -> anyhow::Result<Option<Deal>> {
        let table = self.table.read().await;
        Ok(table.rows.get(&deal_id).cloned())
    }

    async fn list(&self, filter: DealFilter) -> anyhow::Result<Vec<Deal>> {
        let table = self.table.read().await;
        let mut deals: Vec<Deal> = table
            .rows
            .values()
            .filter(|deal| filter.creator_id.is_none_or(|id| deal.creator_id == id))
            .filter(|deal| filter.brand_id.is_none_or(|id| deal.brand_id == id))
            .filter(|deal| filter.status.is_none_or(|status| deal.status == status))
            .cloned()
            .collect();
        deals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(deals)
    }

    // The whole check-and-write runs under one write lock, which is this
    // adapter's equivalent of `UPDATE .. WHERE status = expected`.
    async fn apply(&self, update: DealUpdate) -> anyhow::Result<Option<Deal>> {
        let mut table = self.table.write().await;
        let Some(deal) = table.rows.get_mut(&update.deal_id) else {
            return Ok(None);
        };
        if deal.status != update.expected_status {
            return Ok(None);
        }

        deal.status = update.next_status;
        deal.status_updated_at = update.at;
        deal.updated_at = update.at;
        // lifecycle stamps are set once and never cleared; the first write wins
        deal.accepted_at = deal.accepted_at.or(update.accepted_at);
        deal.delivered_at = deal.delivered_at.or(update.delivered_at);
        deal.approved_at = deal.approved_at.or(update.approved_at);
        deal.completed_at = deal.completed_at.or(update.completed_at);
        deal.cancelled_at = deal.cancelled_at.or(update.cancelled_at);
        if update.increment_revision {
            deal.revision_count += 1;
        }
        if deal.stripe_transfer_id.is_none() {
            deal.stripe_transfer_id = update.transfer_ref.clone();
        }

        Ok(Some(deal.clone()))
    }

    async fn patch(&self, deal_id: Uuid, patch: DealPatch) -> anyhow::Result<Option<Deal>> {
        let mut table = self.table.write().await;
        let Some(deal) = table.rows.get_mut(&deal_id) else {
            return Ok(None);
        };

        if let Some(title) = patch.title {
            deal.title = title;
        }
        if let Some(description) = patch.description {
            deal.description = description;
        }
        if let Some(deliverables) = patch.deliverables {
            deal.deliverables = deliverables;
        }
        if let Some(deadline) = patch.deadline {
            deal.deadline = deadline;
        }
        deal.updated_at = Utc::now();

        Ok(Some(deal.clone()))
    }
}
