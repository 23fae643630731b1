use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kolab_core::{
    Attachment, Conversation, Deal, Deliverable, DomainEvent, DomainEventKind, Message, Party,
    Review, ServiceItem,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDealRequest {
    pub creator_id: Uuid,
    pub brand_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub deliverables: Vec<Deliverable>,
    #[serde(default)]
    pub services: Vec<ServiceItem>,
    pub amount_cents: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default = "default_max_revisions")]
    pub max_revisions: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDealRequest {
    pub title: Option<String>,
    #[serde(default, with = "double_option")]
    pub description: Option<Option<String>>,
    pub deliverables: Option<Vec<Deliverable>>,
    #[serde(default, with = "double_option")]
    pub deadline: Option<Option<DateTime<Utc>>>,
}

// Distinguishes an omitted field from an explicit null so callers can clear
// the description or deadline.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListDealsQuery {
    pub creator_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealResponse {
    pub message: String,
    pub deal: Deal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealListResponse {
    pub deals: Vec<Deal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealDetailResponse {
    pub deal: Deal,
    pub reviews: Vec<Review>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealEventsResponse {
    pub events: Vec<DomainEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverRequest {
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequest {
    pub actor: Party,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisputeRequest {
    pub actor: Party,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConversationRequest {
    pub creator_id: Uuid,
    pub brand_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListConversationsQuery {
    pub creator_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub conversation: Conversation,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<Conversation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationDetailResponse {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub sender_id: Uuid,
    pub sender_type: Party,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
    pub data: Message,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListMessagesQuery {
    pub mark_as_read: Option<bool>,
    pub reader: Option<Party>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageListResponse {
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkReadRequest {
    pub reader: Party,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub message: String,
    pub marked: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReviewRequest {
    pub deal_id: Uuid,
    pub reviewer_id: Uuid,
    pub reviewee_id: Uuid,
    pub rating: i32,
    pub comment: String,
    pub communication_rating: Option<i32>,
    pub quality_rating: Option<i32>,
    pub was_on_time: Option<bool>,
    pub would_work_again: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub message: String,
    pub review: Review,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListReviewsQuery {
    pub creator_id: Uuid,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewListResponse {
    pub reviews: Vec<Review>,
    pub pagination: Pagination,
}

/// Published on the Redis bus after a lifecycle transition commits; the
/// notification collaborator subscribes per kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealLifecycleNotice {
    pub deal_id: Uuid,
    pub deal_number: i64,
    pub kind: DomainEventKind,
    pub actor: Party,
    pub from: String,
    pub to: String,
    pub occurred_at: DateTime<Utc>,
    pub transfer_ref: Option<String>,
    pub payout_cents: Option<i64>,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_max_revisions() -> i32 {
    1
}
