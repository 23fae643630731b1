use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use kolab_core::{BrandStats, CreatorStats, storage::ProfileStore};

#[derive(Default)]
struct ProfileTable {
    creators: HashMap<Uuid, CreatorStats>,
    brands: HashMap<Uuid, BrandStats>,
}

#[derive(Default)]
pub struct InMemoryProfiles {
    table: RwLock<ProfileTable>,
}

fn blank_creator(creator_id: Uuid) -> CreatorStats {
    CreatorStats {
        creator_id,
        avg_rating: Decimal::ZERO,
        total_reviews: 0,
        total_deals_completed: 0,
        total_earnings_cents: 0,
        payout_account_ref: None,
        payouts_enabled: false,
    }
}

fn blank_brand(brand_id: Uuid) -> BrandStats {
    BrandStats {
        brand_id,
        total_deals: 0,
        total_spent_cents: 0,
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfiles {
    async fn record_completion(
        &self,
        creator_id: Uuid,
        brand_id: Uuid,
        amount_cents: i64,
        payout_cents: i64,
    ) -> anyhow::Result<()> {
        let mut table = self.table.write().await;

        let creator = table
            .creators
            .entry(creator_id)
            .or_insert_with(|| blank_creator(creator_id));
        creator.total_deals_completed += 1;
        creator.total_earnings_cents += payout_cents;

        let brand = table
            .brands
            .entry(brand_id)
            .or_insert_with(|| blank_brand(brand_id));
        brand.total_deals += 1;
        brand.total_spent_cents += amount_cents;

        Ok(())
    }

    async fn write_rating(
        &self,
        reviewee_id: Uuid,
        avg_rating: Decimal,
        total_reviews: i64,
    ) -> anyhow::Result<()> {
        let mut table = self.table.write().await;
        let creator = table
            .creators
            .entry(reviewee_id)
            .or_insert_with(|| blank_creator(reviewee_id));
        creator.avg_rating = avg_rating;
        creator.total_reviews = total_reviews;
        Ok(())
    }

    async fn creator_stats(&self, creator_id: Uuid) -> anyhow::Result<Option<CreatorStats>> {
        let table = self.table.read().await;
        Ok(table.creators.get(&creator_id).cloned())
    }

    async fn brand_stats(&self, brand_id: Uuid) -> anyhow::Result<Option<BrandStats>> {
        let table = self.table.read().await;
        Ok(table.brands.get(&brand_id).cloned())
    }
}
