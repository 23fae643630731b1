use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::PayoutError;
use crate::events::DomainEvent;
use crate::models::{
    Attachment, BrandStats, Conversation, CreatorStats, Deal, DealStatus, Deliverable, Message,
    Party, Review,
};

#[derive(Debug, Clone, Default)]
pub struct DealFilter {
    pub creator_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    pub status: Option<DealStatus>,
}

/// Content fields either party may edit outside the lifecycle;
/// `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct DealPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub deliverables: Option<Vec<Deliverable>>,
    pub deadline: Option<Option<DateTime<Utc>>>,
}

/// A status transition write. `expected_status` is the compare-and-swap
/// guard: stores must only apply the update when the persisted status still
/// matches it, and report a miss instead of overwriting.
#[derive(Debug, Clone)]
pub struct DealUpdate {
    pub deal_id: Uuid,
    pub expected_status: DealStatus,
    pub next_status: DealStatus,
    pub at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub increment_revision: bool,
    pub transfer_ref: Option<String>,
}

#[async_trait]
pub trait DealStore: Send + Sync {
    /// Persist a new deal, assigning the monotonic `deal_number`.
    async fn insert(&self, deal: Deal) -> anyhow::Result<Deal>;
    async fn fetch(&self, deal_id: Uuid) -> anyhow::Result<Option<Deal>>;
    async fn list(&self, filter: DealFilter) -> anyhow::Result<Vec<Deal>>;
    /// Apply a transition write under the CAS guard. Returns the updated deal,
    /// or `None` when the guard missed (row gone or status moved on).
    async fn apply(&self, update: DealUpdate) -> anyhow::Result<Option<Deal>>;
    async fn patch(&self, deal_id: Uuid, patch: DealPatch) -> anyhow::Result<Option<Deal>>;
}

#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_type: Party,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub is_system_message: bool,
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create-or-get the unique conversation for a creator/brand pair.
    /// The bool is true when a new conversation row was created.
    async fn ensure(&self, creator_id: Uuid, brand_id: Uuid)
    -> anyhow::Result<(Conversation, bool)>;
    async fn fetch(&self, conversation_id: Uuid) -> anyhow::Result<Option<Conversation>>;
    async fn list(
        &self,
        creator_id: Option<Uuid>,
        brand_id: Option<Uuid>,
    ) -> anyhow::Result<Vec<Conversation>>;
    /// Append a message and update the ledger in one atomic step: last-message
    /// preview/timestamp, plus an atomic `+1` on the recipient's unread count.
    async fn append_message(&self, draft: MessageDraft) -> anyhow::Result<Message>;
    async fn messages(&self, conversation_id: Uuid) -> anyhow::Result<Vec<Message>>;
    /// Mark everything addressed to `reader` as read and zero that party's
    /// unread counter. Safe to call when there is nothing to mark.
    async fn mark_read(&self, conversation_id: Uuid, reader: Party) -> anyhow::Result<u64>;
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Insert guarded by the (deal_id, reviewer_id) uniqueness constraint.
    /// Returns `None` when a review from this reviewer already exists.
    async fn insert_once(&self, review: Review) -> anyhow::Result<Option<Review>>;
    async fn for_deal(&self, deal_id: Uuid) -> anyhow::Result<Vec<Review>>;
    async fn public_ratings(&self, reviewee_id: Uuid) -> anyhow::Result<Vec<i32>>;
    async fn list_for(
        &self,
        reviewee_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<(Vec<Review>, i64)>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Lifetime stat bumps run when a deal completes: creator gains a
    /// completed deal and the payout, brand gains a deal and the gross spend.
    async fn record_completion(
        &self,
        creator_id: Uuid,
        brand_id: Uuid,
        amount_cents: i64,
        payout_cents: i64,
    ) -> anyhow::Result<()>;
    async fn write_rating(
        &self,
        reviewee_id: Uuid,
        avg_rating: Decimal,
        total_reviews: i64,
    ) -> anyhow::Result<()>;
    async fn creator_stats(&self, creator_id: Uuid) -> anyhow::Result<Option<CreatorStats>>;
    async fn brand_stats(&self, brand_id: Uuid) -> anyhow::Result<Option<BrandStats>>;
}

#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub sequence: i64,
    pub stream_id: Uuid,
    pub event: DomainEvent,
    pub stored_at: DateTime<Utc>,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, stream_id: Uuid, event: DomainEvent) -> anyhow::Result<EventEnvelope>;
    async fn stream(&self, stream_id: Uuid) -> anyhow::Result<Vec<EventEnvelope>>;
}

/// The escrow/transfer collaborator. Implementations must be idempotent per
/// deal: retrying a release for the same deal id returns the original
/// transfer reference instead of paying twice.
#[async_trait]
pub trait PayoutGateway: Send + Sync {
    async fn release(
        &self,
        deal_id: Uuid,
        account_ref: &str,
        amount_cents: i64,
        currency: &str,
    ) -> Result<String, PayoutError>;
}
