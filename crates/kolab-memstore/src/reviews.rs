use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use kolab_core::{Review, storage::ReviewStore};

#[derive(Default)]
struct ReviewTable {
    rows: Vec<Review>,
    // stands in for the (deal_id, reviewer_id) uniqueness constraint
    by_key: HashSet<(Uuid, Uuid)>,
}

#[derive(Default)]
pub struct InMemoryReviews {
    table: RwLock<ReviewTable>,
}

#[async_trait]
impl ReviewStore for InMemoryReviews {
    async fn insert_once(&self, review: Review) -> anyhow::Result<Option<Review>> {
        let mut table = self.table.write().await;
        if !table.by_key.insert((review.deal_id, review.reviewer_id)) {
            return Ok(None);
        }
        table.rows.push(review.clone());
        Ok(Some(review))
    }

    async fn for_deal(&self, deal_id: Uuid) -> anyhow::Result<Vec<Review>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .iter()
            .filter(|review| review.deal_id == deal_id)
            .cloned()
            .collect())
    }

    async fn public_ratings(&self, reviewee_id: Uuid) -> anyhow::Result<Vec<i32>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .iter()
            .filter(|review| review.reviewee_id == reviewee_id && review.is_public)
            .map(|review| review.rating)
            .collect())
    }

    async fn list_for(
        &self,
        reviewee_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<(Vec<Review>, i64)> {
        let table = self.table.read().await;
        let mut matching: Vec<Review> = table
            .rows
            .iter()
            .filter(|review| review.reviewee_id == reviewee_id && review.is_public)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }
}
