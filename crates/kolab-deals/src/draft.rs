use chrono::{DateTime, Utc};
use uuid::Uuid;

use kolab_core::{Deal, DealError, DealStatus, Deliverable, ServiceItem};
use kolab_settlement::compute_settlement;

/// Everything a brand supplies when proposing a deal. `into_deal` is the only
/// constructor for a `Deal`, so the settlement split and the pending state
/// are established at birth and nowhere else.
#[derive(Debug, Clone)]
pub struct DealDraft {
    pub creator_id: Uuid,
    pub brand_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub deliverables: Vec<Deliverable>,
    pub services: Vec<ServiceItem>,
    pub amount_cents: i64,
    pub currency: String,
    pub deadline: Option<DateTime<Utc>>,
    pub max_revisions: i32,
    pub conversation_id: Option<Uuid>,
}

impl DealDraft {
    pub fn into_deal(self, now: DateTime<Utc>) -> Result<Deal, DealError> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(DealError::validation("title is required"));
        }
        if self.creator_id == self.brand_id {
            return Err(DealError::validation(
                "creator_id and brand_id must be different parties",
            ));
        }
        if self.max_revisions < 0 {
            return Err(DealError::validation("max_revisions must be non-negative"));
        }

        let currency = self.currency.trim().to_ascii_uppercase();
        if currency.len() != 3 {
            return Err(DealError::validation("currency must be a 3-letter code"));
        }

        let settlement = compute_settlement(self.amount_cents)
            .map_err(|err| DealError::validation(err.to_string()))?;

        Ok(Deal {
            id: Uuid::new_v4(),
            // assigned by the store on insert
            deal_number: 0,
            conversation_id: self.conversation_id,
            creator_id: self.creator_id,
            brand_id: self.brand_id,
            title,
            description: self.description,
            deliverables: self.deliverables,
            services: self.services,
            amount_cents: self.amount_cents,
            platform_fee_cents: settlement.platform_fee_cents,
            creator_payout_cents: settlement.creator_payout_cents,
            currency,
            stripe_payment_intent_id: None,
            stripe_transfer_id: None,
            status: DealStatus::Pending,
            deadline: self.deadline,
            status_updated_at: now,
            accepted_at: None,
            delivered_at: None,
            approved_at: None,
            completed_at: None,
            cancelled_at: None,
            revision_count: 0,
            max_revisions: self.max_revisions,
            created_at: now,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> DealDraft {
        DealDraft {
            creator_id: Uuid::new_v4(),
            brand_id: Uuid::new_v4(),
            title: "Product launch video".to_string(),
            description: Some("One launch video for the spring drop".to_string()),
            deliverables: Vec::new(),
            services: Vec::new(),
            amount_cents: 25_000,
            currency: "usd".to_string(),
            deadline: None,
            max_revisions: 1,
            conversation_id: None,
        }
    }

    #[test]
    fn a_valid_draft_becomes_a_pending_deal_with_derived_fees() {
        let deal = draft().into_deal(Utc::now()).unwrap();
        assert_eq!(deal.status, DealStatus::Pending);
        assert_eq!(deal.amount_cents, 25_000);
        assert_eq!(deal.platform_fee_cents, 2_500);
        assert_eq!(deal.creator_payout_cents, 22_500);
        assert_eq!(deal.currency, "USD");
        assert_eq!(deal.revision_count, 0);
        assert_eq!(
            deal.amount_cents,
            deal.platform_fee_cents + deal.creator_payout_cents
        );
    }

    #[test]
    fn blank_titles_are_rejected() {
        let mut bad = draft();
        bad.title = "   ".to_string();
        assert!(matches!(
            bad.into_deal(Utc::now()),
            Err(DealError::Validation(_))
        ));
    }

    #[test]
    fn a_party_cannot_deal_with_itself() {
        let mut bad = draft();
        bad.brand_id = bad.creator_id;
        assert!(matches!(
            bad.into_deal(Utc::now()),
            Err(DealError::Validation(_))
        ));
    }

    #[test]
    fn zero_amounts_are_rejected_at_creation() {
        let mut bad = draft();
        bad.amount_cents = 0;
        assert!(matches!(
            bad.into_deal(Utc::now()),
            Err(DealError::Validation(_))
        ));
    }
}
