use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use kolab_core::{
    Deal, DealError, DealStatus, DomainEvent, DomainEventKind, Party, storage::DealUpdate,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCommand {
    Accept,
    Decline,
    Cancel,
    SubmitDelivery,
    Approve,
    RequestRevision,
    Dispute,
}

impl TransitionCommand {
    pub fn action(self) -> &'static str {
        match self {
            TransitionCommand::Accept => "accept",
            TransitionCommand::Decline => "decline",
            TransitionCommand::Cancel => "cancel",
            TransitionCommand::SubmitDelivery => "deliver",
            TransitionCommand::Approve => "approve",
            TransitionCommand::RequestRevision => "request revision on",
            TransitionCommand::Dispute => "dispute",
        }
    }

    // Cancel and Dispute are open to both sides; everything else belongs to
    // exactly one party.
    fn required_actor(self) -> Option<Party> {
        match self {
            TransitionCommand::Accept
            | TransitionCommand::Decline
            | TransitionCommand::SubmitDelivery => Some(Party::Creator),
            TransitionCommand::Approve | TransitionCommand::RequestRevision => Some(Party::Brand),
            TransitionCommand::Cancel | TransitionCommand::Dispute => None,
        }
    }

    fn event_kind(self) -> DomainEventKind {
        match self {
            TransitionCommand::Accept => DomainEventKind::DealAccepted,
            TransitionCommand::Decline => DomainEventKind::DealDeclined,
            TransitionCommand::Cancel => DomainEventKind::DealCancelled,
            TransitionCommand::SubmitDelivery => DomainEventKind::DeliverySubmitted,
            TransitionCommand::Approve => DomainEventKind::DealApproved,
            TransitionCommand::RequestRevision => DomainEventKind::RevisionRequested,
            TransitionCommand::Dispute => DomainEventKind::DealDisputed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PayoutInstruction {
    pub deal_id: Uuid,
    pub creator_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct StatsDelta {
    pub creator_id: Uuid,
    pub brand_id: Uuid,
    pub amount_cents: i64,
    pub payout_cents: i64,
}

/// Everything a legal transition will write, derived before anything is
/// mutated. The stores apply a plan atomically under its CAS guard
/// (`from` is the expected pre-state), or not at all.
#[derive(Debug, Clone)]
pub struct TransitionPlan {
    pub deal_id: Uuid,
    pub command: TransitionCommand,
    pub actor: Party,
    pub from: DealStatus,
    pub to: DealStatus,
    pub at: DateTime<Utc>,
    pub payout: Option<PayoutInstruction>,
    pub stats: Option<StatsDelta>,
    pub system_message: Option<String>,
}

impl TransitionPlan {
    pub fn event_kind(&self) -> DomainEventKind {
        self.command.event_kind()
    }

    pub fn to_update(&self) -> DealUpdate {
        DealUpdate {
            deal_id: self.deal_id,
            expected_status: self.from,
            next_status: self.to,
            at: self.at,
            accepted_at: (self.command == TransitionCommand::Accept).then_some(self.at),
            delivered_at: (self.command == TransitionCommand::SubmitDelivery).then_some(self.at),
            approved_at: (self.command == TransitionCommand::Approve).then_some(self.at),
            completed_at: (self.command == TransitionCommand::Approve).then_some(self.at),
            cancelled_at: (self.command == TransitionCommand::Cancel).then_some(self.at),
            increment_revision: self.command == TransitionCommand::RequestRevision,
            transfer_ref: None,
        }
    }

    pub fn event(&self) -> DomainEvent {
        DomainEvent::new(self.deal_id, self.event_kind(), Some(self.actor)).with_payload(json!({
            "from": self.from.as_str(),
            "to": self.to.as_str(),
        }))
    }
}

/// Validate a requested transition against the deal's current state and
/// derive the full write set. Fails fast with a typed error before anything
/// is mutated; a plan is the only way a status change reaches a store.
pub fn plan(
    deal: &Deal,
    command: TransitionCommand,
    actor: Party,
    now: DateTime<Utc>,
) -> Result<TransitionPlan, DealError> {
    if let Some(required) = command.required_actor() {
        if actor != required {
            return Err(DealError::validation(format!(
                "only the {required} can {} a deal",
                command.action()
            )));
        }
    }

    let reject = || DealError::InvalidStatusTransition {
        action: command.action(),
        status: deal.status,
    };

    let to = match command {
        TransitionCommand::Accept => match deal.status {
            DealStatus::Pending => DealStatus::InProgress,
            _ => return Err(reject()),
        },
        TransitionCommand::Decline => match deal.status {
            DealStatus::Pending => DealStatus::Declined,
            _ => return Err(reject()),
        },
        TransitionCommand::Cancel => match deal.status {
            DealStatus::Pending | DealStatus::InProgress => DealStatus::Cancelled,
            _ => return Err(reject()),
        },
        TransitionCommand::SubmitDelivery => match deal.status {
            DealStatus::InProgress | DealStatus::Revision => {
                let incomplete = deal.incomplete_deliverable_ids();
                if !incomplete.is_empty() {
                    return Err(DealError::IncompleteDeliverables(incomplete));
                }
                DealStatus::Delivered
            }
            _ => return Err(reject()),
        },
        TransitionCommand::Approve => match deal.status {
            DealStatus::Delivered => DealStatus::Completed,
            _ => return Err(reject()),
        },
        TransitionCommand::RequestRevision => match deal.status {
            DealStatus::Delivered => {
                if deal.revision_count >= deal.max_revisions {
                    return Err(DealError::RevisionLimitExceeded {
                        max: deal.max_revisions,
                    });
                }
                DealStatus::Revision
            }
            _ => return Err(reject()),
        },
        TransitionCommand::Dispute => {
            if deal.status.is_terminal() || deal.status == DealStatus::Disputed {
                return Err(reject());
            }
            DealStatus::Disputed
        }
    };

    let payout = (command == TransitionCommand::Approve).then(|| PayoutInstruction {
        deal_id: deal.id,
        creator_id: deal.creator_id,
        amount_cents: deal.creator_payout_cents,
        currency: deal.currency.clone(),
    });

    let stats = (command == TransitionCommand::Approve).then(|| StatsDelta {
        creator_id: deal.creator_id,
        brand_id: deal.brand_id,
        amount_cents: deal.amount_cents,
        payout_cents: deal.creator_payout_cents,
    });

    let system_message = match command {
        TransitionCommand::Accept => Some(format!(
            "Deal accepted. Work has begun on: {}",
            deal.title
        )),
        TransitionCommand::SubmitDelivery => Some(format!(
            "Delivery submitted for \"{}\". Please review and approve.",
            deal.title
        )),
        TransitionCommand::Approve => Some(format!(
            "Deal completed. Payment of {} has been released.",
            format_cents(deal.creator_payout_cents, &deal.currency)
        )),
        TransitionCommand::RequestRevision => Some(format!(
            "Revision requested for \"{}\" ({} of {}).",
            deal.title,
            deal.revision_count + 1,
            deal.max_revisions
        )),
        _ => None,
    };

    Ok(TransitionPlan {
        deal_id: deal.id,
        command,
        actor,
        from: deal.status,
        to,
        at: now,
        payout,
        stats,
        system_message,
    })
}

fn format_cents(cents: i64, currency: &str) -> String {
    format!("{}.{:02} {currency}", cents / 100, cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kolab_core::models::Deliverable;

    fn deal_in(status: DealStatus) -> Deal {
        let now = Utc::now();
        Deal {
            id: Uuid::new_v4(),
            deal_number: 42,
            conversation_id: Some(Uuid::new_v4()),
            creator_id: Uuid::new_v4(),
            brand_id: Uuid::new_v4(),
            title: "Sponsored reel".to_string(),
            description: None,
            deliverables: vec![
                Deliverable {
                    id: "reel".to_string(),
                    description: "60s reel".to_string(),
                    is_completed: true,
                    completed_at: Some(now),
                },
                Deliverable {
                    id: "story".to_string(),
                    description: "3 stories".to_string(),
                    is_completed: true,
                    completed_at: Some(now),
                },
            ],
            services: Vec::new(),
            amount_cents: 10_000,
            platform_fee_cents: 1_000,
            creator_payout_cents: 9_000,
            currency: "USD".to_string(),
            stripe_payment_intent_id: None,
            stripe_transfer_id: None,
            status,
            deadline: None,
            status_updated_at: now,
            accepted_at: None,
            delivered_at: None,
            approved_at: None,
            completed_at: None,
            cancelled_at: None,
            revision_count: 0,
            max_revisions: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn creator_accepts_a_pending_deal() {
        let deal = deal_in(DealStatus::Pending);
        let plan = plan(&deal, TransitionCommand::Accept, Party::Creator, Utc::now()).unwrap();
        assert_eq!(plan.from, DealStatus::Pending);
        assert_eq!(plan.to, DealStatus::InProgress);
        let update = plan.to_update();
        assert!(update.accepted_at.is_some());
        assert!(update.delivered_at.is_none());
    }

    #[test]
    fn brand_cannot_accept_on_the_creators_behalf() {
        let deal = deal_in(DealStatus::Pending);
        let err = plan(&deal, TransitionCommand::Accept, Party::Brand, Utc::now()).unwrap_err();
        assert!(matches!(err, DealError::Validation(_)));
    }

    #[test]
    fn accept_is_rejected_once_work_has_started() {
        let deal = deal_in(DealStatus::InProgress);
        let err = plan(&deal, TransitionCommand::Accept, Party::Creator, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            DealError::InvalidStatusTransition {
                status: DealStatus::InProgress,
                ..
            }
        ));
    }

    #[test]
    fn delivery_is_blocked_by_incomplete_deliverables() {
        let mut deal = deal_in(DealStatus::InProgress);
        deal.deliverables[1].is_completed = false;
        deal.deliverables[1].completed_at = None;

        let err = plan(
            &deal,
            TransitionCommand::SubmitDelivery,
            Party::Creator,
            Utc::now(),
        )
        .unwrap_err();

        match err {
            DealError::IncompleteDeliverables(ids) => assert_eq!(ids, vec!["story".to_string()]),
            other => panic!("expected IncompleteDeliverables, got {other:?}"),
        }
    }

    #[test]
    fn delivery_succeeds_once_everything_is_complete() {
        let deal = deal_in(DealStatus::InProgress);
        let plan = plan(
            &deal,
            TransitionCommand::SubmitDelivery,
            Party::Creator,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(plan.to, DealStatus::Delivered);
        assert!(plan.system_message.is_some());
    }

    #[test]
    fn redelivery_is_allowed_from_revision() {
        let deal = deal_in(DealStatus::Revision);
        let plan = plan(
            &deal,
            TransitionCommand::SubmitDelivery,
            Party::Creator,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(plan.to, DealStatus::Delivered);
    }

    #[test]
    fn approve_carries_payout_and_stat_instructions() {
        let deal = deal_in(DealStatus::Delivered);
        let plan = plan(&deal, TransitionCommand::Approve, Party::Brand, Utc::now()).unwrap();
        assert_eq!(plan.to, DealStatus::Completed);

        let payout = plan.payout.as_ref().unwrap();
        assert_eq!(payout.amount_cents, 9_000);
        assert_eq!(payout.creator_id, deal.creator_id);

        let stats = plan.stats.as_ref().unwrap();
        assert_eq!(stats.amount_cents, 10_000);
        assert_eq!(stats.payout_cents, 9_000);

        let update = plan.to_update();
        assert!(update.approved_at.is_some());
        assert!(update.completed_at.is_some());
    }

    #[test]
    fn a_completed_deal_cannot_be_approved_again() {
        let deal = deal_in(DealStatus::Completed);
        let err = plan(&deal, TransitionCommand::Approve, Party::Brand, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            DealError::InvalidStatusTransition {
                status: DealStatus::Completed,
                ..
            }
        ));
    }

    #[test]
    fn revision_request_increments_until_the_limit() {
        let deal = deal_in(DealStatus::Delivered);
        let plan_ok = plan(
            &deal,
            TransitionCommand::RequestRevision,
            Party::Brand,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(plan_ok.to, DealStatus::Revision);
        assert!(plan_ok.to_update().increment_revision);

        let mut exhausted = deal_in(DealStatus::Delivered);
        exhausted.revision_count = exhausted.max_revisions;
        let err = plan(
            &exhausted,
            TransitionCommand::RequestRevision,
            Party::Brand,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DealError::RevisionLimitExceeded { max: 1 }));
    }

    #[test]
    fn cancel_is_limited_to_pending_and_in_progress() {
        for status in [DealStatus::Pending, DealStatus::InProgress] {
            let deal = deal_in(status);
            let plan_ok = plan(&deal, TransitionCommand::Cancel, Party::Brand, Utc::now()).unwrap();
            assert_eq!(plan_ok.to, DealStatus::Cancelled);
        }

        let delivered = deal_in(DealStatus::Delivered);
        let err = plan(
            &delivered,
            TransitionCommand::Cancel,
            Party::Creator,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DealError::InvalidStatusTransition { .. }));
    }

    #[test]
    fn dispute_is_open_from_any_live_state_for_either_party() {
        for status in [
            DealStatus::Pending,
            DealStatus::InProgress,
            DealStatus::Delivered,
            DealStatus::Revision,
        ] {
            let deal = deal_in(status);
            let creator_side =
                plan(&deal, TransitionCommand::Dispute, Party::Creator, Utc::now()).unwrap();
            assert_eq!(creator_side.to, DealStatus::Disputed);
            let brand_side =
                plan(&deal, TransitionCommand::Dispute, Party::Brand, Utc::now()).unwrap();
            assert_eq!(brand_side.to, DealStatus::Disputed);
        }

        for status in [
            DealStatus::Completed,
            DealStatus::Cancelled,
            DealStatus::Declined,
            DealStatus::Refunded,
            DealStatus::Disputed,
        ] {
            let deal = deal_in(status);
            let err =
                plan(&deal, TransitionCommand::Dispute, Party::Brand, Utc::now()).unwrap_err();
            assert!(matches!(err, DealError::InvalidStatusTransition { .. }));
        }
    }

    #[test]
    fn decline_is_terminal_and_pending_only() {
        let deal = deal_in(DealStatus::Pending);
        let plan_ok = plan(&deal, TransitionCommand::Decline, Party::Creator, Utc::now()).unwrap();
        assert_eq!(plan_ok.to, DealStatus::Declined);
        assert!(plan_ok.to.is_terminal());

        let started = deal_in(DealStatus::InProgress);
        let err = plan(
            &started,
            TransitionCommand::Decline,
            Party::Creator,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DealError::InvalidStatusTransition { .. }));
    }

    #[test]
    fn approval_message_formats_the_released_amount() {
        let deal = deal_in(DealStatus::Delivered);
        let plan = plan(&deal, TransitionCommand::Approve, Party::Brand, Utc::now()).unwrap();
        assert_eq!(
            plan.system_message.as_deref(),
            Some("Deal completed. Payment of 90.00 USD has been released.")
        );
    }
}
