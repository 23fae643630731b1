use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    Creator,
    Brand,
}

impl Party {
    pub fn other(self) -> Party {
        match self {
            Party::Creator => Party::Brand,
            Party::Brand => Party::Creator,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Party::Creator => "creator",
            Party::Brand => "brand",
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug)]
#[error("unknown party: {0}")]
pub struct ParsePartyError(String);

impl FromStr for Party {
    type Err = ParsePartyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "creator" => Ok(Party::Creator),
            "brand" => Ok(Party::Brand),
            other => Err(ParsePartyError(other.to_string())),
        }
    }
}

/// Closed deal lifecycle status. The legacy strings `accepted` and `approved`
/// parse as aliases of `in_progress` and `completed`; serialization always
/// emits the canonical form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    Pending,
    #[serde(alias = "accepted")]
    InProgress,
    Declined,
    Delivered,
    Revision,
    #[serde(alias = "approved")]
    Completed,
    Cancelled,
    Disputed,
    Refunded,
}

impl DealStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DealStatus::Pending => "pending",
            DealStatus::InProgress => "in_progress",
            DealStatus::Declined => "declined",
            DealStatus::Delivered => "delivered",
            DealStatus::Revision => "revision",
            DealStatus::Completed => "completed",
            DealStatus::Cancelled => "cancelled",
            DealStatus::Disputed => "disputed",
            DealStatus::Refunded => "refunded",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DealStatus::Declined
                | DealStatus::Completed
                | DealStatus::Cancelled
                | DealStatus::Refunded
        )
    }
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug)]
#[error("unknown deal status: {0}")]
pub struct ParseStatusError(String);

impl FromStr for DealStatus {
    type Err = ParseStatusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(DealStatus::Pending),
            "in_progress" | "accepted" => Ok(DealStatus::InProgress),
            "declined" => Ok(DealStatus::Declined),
            "delivered" => Ok(DealStatus::Delivered),
            "revision" => Ok(DealStatus::Revision),
            "completed" | "approved" => Ok(DealStatus::Completed),
            "cancelled" => Ok(DealStatus::Cancelled),
            "disputed" => Ok(DealStatus::Disputed),
            "refunded" => Ok(DealStatus::Refunded),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deliverable {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceItem {
    pub id: String,
    pub platform: Option<String>,
    pub name: String,
    pub rate_cents: i64,
    pub currency: String,
    pub turnaround_days: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub id: Uuid,
    pub deal_number: i64,
    pub conversation_id: Option<Uuid>,
    pub creator_id: Uuid,
    pub brand_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub deliverables: Vec<Deliverable>,
    pub services: Vec<ServiceItem>,
    pub amount_cents: i64,
    pub platform_fee_cents: i64,
    pub creator_payout_cents: i64,
    pub currency: String,
    pub stripe_payment_intent_id: Option<String>,
    pub stripe_transfer_id: Option<String>,
    pub status: DealStatus,
    pub deadline: Option<DateTime<Utc>>,
    pub status_updated_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub revision_count: i32,
    pub max_revisions: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deal {
    pub fn party_id(&self, party: Party) -> Uuid {
        match party {
            Party::Creator => self.creator_id,
            Party::Brand => self.brand_id,
        }
    }

    pub fn party_of(&self, user_id: Uuid) -> Option<Party> {
        if user_id == self.creator_id {
            Some(Party::Creator)
        } else if user_id == self.brand_id {
            Some(Party::Brand)
        } else {
            None
        }
    }

    pub fn incomplete_deliverable_ids(&self) -> Vec<String> {
        self.deliverables
            .iter()
            .filter(|item| !item.is_completed)
            .map(|item| item.id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub brand_id: Uuid,
    pub creator_unread: i32,
    pub brand_unread: i32,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_message_preview: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn unread_for(&self, party: Party) -> i32 {
        match party {
            Party::Creator => self.creator_unread,
            Party::Brand => self.brand_unread,
        }
    }

    pub fn unread_mut(&mut self, party: Party) -> &mut i32 {
        match party {
            Party::Creator => &mut self.creator_unread,
            Party::Brand => &mut self.brand_unread,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Video,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub kind: AttachmentKind,
    pub url: String,
    pub name: String,
    pub size_bytes: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_type: Party,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub is_system_message: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub deal_id: Uuid,
    pub reviewer_id: Uuid,
    pub reviewee_id: Uuid,
    pub rating: i32,
    pub comment: String,
    pub communication_rating: Option<i32>,
    pub quality_rating: Option<i32>,
    pub was_on_time: Option<bool>,
    pub would_work_again: Option<bool>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatorStats {
    pub creator_id: Uuid,
    pub avg_rating: Decimal,
    pub total_reviews: i64,
    pub total_deals_completed: i64,
    pub total_earnings_cents: i64,
    pub payout_account_ref: Option<String>,
    pub payouts_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandStats {
    pub brand_id: Uuid,
    pub total_deals: i64,
    pub total_spent_cents: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_status_strings_parse_to_canonical_variants() {
        assert_eq!("accepted".parse::<DealStatus>().unwrap(), DealStatus::InProgress);
        assert_eq!("approved".parse::<DealStatus>().unwrap(), DealStatus::Completed);
        assert_eq!(DealStatus::InProgress.as_str(), "in_progress");
        assert_eq!(DealStatus::Completed.as_str(), "completed");
    }

    #[test]
    fn every_status_round_trips_through_its_canonical_string() {
        let all = [
            DealStatus::Pending,
            DealStatus::InProgress,
            DealStatus::Declined,
            DealStatus::Delivered,
            DealStatus::Revision,
            DealStatus::Completed,
            DealStatus::Cancelled,
            DealStatus::Disputed,
            DealStatus::Refunded,
        ];
        for status in all {
            assert_eq!(status.as_str().parse::<DealStatus>().unwrap(), status);
        }
    }

    #[test]
    fn terminal_statuses_are_exactly_the_four_end_states() {
        assert!(DealStatus::Declined.is_terminal());
        assert!(DealStatus::Completed.is_terminal());
        assert!(DealStatus::Cancelled.is_terminal());
        assert!(DealStatus::Refunded.is_terminal());
        assert!(!DealStatus::Pending.is_terminal());
        assert!(!DealStatus::Delivered.is_terminal());
        assert!(!DealStatus::Disputed.is_terminal());
        assert!(!DealStatus::Revision.is_terminal());
    }

    #[test]
    fn party_other_flips_sides() {
        assert_eq!(Party::Creator.other(), Party::Brand);
        assert_eq!(Party::Brand.other(), Party::Creator);
    }
}
