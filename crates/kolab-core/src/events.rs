use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Party;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainEventKind {
    DealCreated,
    DealAccepted,
    DealDeclined,
    DealCancelled,
    DeliverySubmitted,
    RevisionRequested,
    DealApproved,
    DealDisputed,
    ReviewSubmitted,
}

impl DomainEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DomainEventKind::DealCreated => "deal_created",
            DomainEventKind::DealAccepted => "deal_accepted",
            DomainEventKind::DealDeclined => "deal_declined",
            DomainEventKind::DealCancelled => "deal_cancelled",
            DomainEventKind::DeliverySubmitted => "delivery_submitted",
            DomainEventKind::RevisionRequested => "revision_requested",
            DomainEventKind::DealApproved => "deal_approved",
            DomainEventKind::DealDisputed => "deal_disputed",
            DomainEventKind::ReviewSubmitted => "review_submitted",
        }
    }
}

impl fmt::Display for DomainEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug)]
#[error("unknown event kind: {0}")]
pub struct ParseEventKindError(String);

impl FromStr for DomainEventKind {
    type Err = ParseEventKindError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "deal_created" => Ok(DomainEventKind::DealCreated),
            "deal_accepted" => Ok(DomainEventKind::DealAccepted),
            "deal_declined" => Ok(DomainEventKind::DealDeclined),
            "deal_cancelled" => Ok(DomainEventKind::DealCancelled),
            "delivery_submitted" => Ok(DomainEventKind::DeliverySubmitted),
            "revision_requested" => Ok(DomainEventKind::RevisionRequested),
            "deal_approved" => Ok(DomainEventKind::DealApproved),
            "deal_disputed" => Ok(DomainEventKind::DealDisputed),
            "review_submitted" => Ok(DomainEventKind::ReviewSubmitted),
            other => Err(ParseEventKindError(other.to_string())),
        }
    }
}

/// One entry in a deal's append-only history. The stream of these per deal is
/// the audit trail behind the discrete timestamp columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub kind: DomainEventKind,
    pub actor: Option<Party>,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl DomainEvent {
    pub fn new(aggregate_id: Uuid, kind: DomainEventKind, actor: Option<Party>) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_id,
            kind,
            actor,
            occurred_at: Utc::now(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}
