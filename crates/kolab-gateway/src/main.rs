use std::{net::SocketAddr, sync::Arc};

use anyhow::Result as AnyResult;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::{error, info};
use uuid::Uuid;

use kolab_core::{
    Conversation, Deal, DealError, DealStatus, Deliverable, DomainEvent, DomainEventKind, Message,
    Party, PayoutError, Review, ServiceItem,
    storage::{MessageDraft, PayoutGateway},
};
use kolab_deals::{DealDraft, ReviewDraft, TransitionCommand, TransitionPlan, aggregate_ratings, plan};
use kolab_messaging::{ContactPolicy, compose_user_message, preview};
use kolab_platform::{
    CancelRequest, ConversationDetailResponse, ConversationListResponse, ConversationResponse,
    CreateConversationRequest, CreateDealRequest, CreateReviewRequest, DealDetailResponse,
    DealEventsResponse,
    DealLifecycleNotice, DealListResponse, DealResponse, DeliverRequest, DisputeRequest,
    ListConversationsQuery, ListDealsQuery, ListMessagesQuery, ListReviewsQuery, MarkReadRequest,
    MarkReadResponse, MessageListResponse, MessageResponse, Pagination, RedisBus,
    ReviewListResponse, ReviewResponse, SendMessageRequest, ServiceConfig, UpdateDealRequest,
    connect_database,
};

mod payouts;

use payouts::EscrowTransferLedger;

const DEAL_COLUMNS: &str = "id, deal_number, conversation_id, creator_id, brand_id, title, \
    description, deliverables, services, amount_cents, platform_fee_cents, creator_payout_cents, \
    currency, stripe_payment_intent_id, stripe_transfer_id, status, deadline, status_updated_at, \
    accepted_at, delivered_at, approved_at, completed_at, cancelled_at, revision_count, \
    max_revisions, created_at, updated_at";

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, sender_type, content, attachments, \
    is_read, read_at, is_system_message, created_at";

const CONVERSATION_COLUMNS: &str = "id, creator_id, brand_id, creator_unread, brand_unread, \
    last_message_at, last_message_preview, created_at, updated_at";

const REVIEW_COLUMNS: &str = "id, deal_id, reviewer_id, reviewee_id, rating, comment, \
    communication_rating, quality_rating, was_on_time, would_work_again, is_public, created_at";

const MAX_REVIEW_PAGE_SIZE: i64 = 50;

#[derive(Clone)]
struct AppState {
    pool: PgPool,
    redis: RedisBus,
    payouts: Arc<dyn PayoutGateway>,
    contact_policy: Arc<ContactPolicy>,
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "kolab_gateway=info".to_string()),
        )
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8080")?;
    let pool = connect_database(&config.database_url).await?;
    let redis = RedisBus::connect(&config.redis_url)?;
    let payouts: Arc<dyn PayoutGateway> = Arc::new(EscrowTransferLedger::new(pool.clone()));

    let state = AppState {
        pool,
        redis,
        payouts,
        contact_policy: Arc::new(ContactPolicy::new()),
    };

    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/deals", get(list_deals).post(create_deal))
        .route("/deals/{deal_id}", get(get_deal).put(update_deal))
        .route("/deals/{deal_id}/events", get(list_deal_events))
        .route("/deals/{deal_id}/accept", post(accept_deal))
        .route("/deals/{deal_id}/decline", post(decline_deal))
        .route("/deals/{deal_id}/cancel", post(cancel_deal))
        .route("/deals/{deal_id}/deliver", post(deliver_deal))
        .route("/deals/{deal_id}/approve", post(approve_deal))
        .route("/deals/{deal_id}/revision", post(request_revision))
        .route("/deals/{deal_id}/dispute", post(dispute_deal))
        .route(
            "/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route("/conversations/{conversation_id}", get(get_conversation))
        .route(
            "/conversations/{conversation_id}/messages",
            get(list_messages).post(send_message),
        )
        .route(
            "/conversations/{conversation_id}/read",
            post(mark_conversation_read),
        )
        .route("/reviews", get(list_reviews).post(create_review))
        .with_state(state);

    let addr: SocketAddr = config.http_addr.parse()?;
    info!("gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

// --- deals ---

async fn create_deal(
    State(state): State<AppState>,
    Json(payload): Json<CreateDealRequest>,
) -> Result<(StatusCode, Json<DealResponse>), (StatusCode, String)> {
    let now = Utc::now();
    let mut tx = state.pool.begin().await.map_err(internal_error)?;

    // the pair's conversation is created lazily and linked for system messages
    sqlx::query(
        r#"
        INSERT INTO conversations (
            id, creator_id, brand_id, creator_unread, brand_unread, created_at, updated_at
        )
        VALUES ($1, $2, $3, 0, 0, $4, $4)
        ON CONFLICT (creator_id, brand_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(payload.creator_id)
    .bind(payload.brand_id)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(internal_error)?;

    let conversation_id: Uuid =
        sqlx::query_scalar("SELECT id FROM conversations WHERE creator_id = $1 AND brand_id = $2")
            .bind(payload.creator_id)
            .bind(payload.brand_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(internal_error)?;

    let draft = DealDraft {
        creator_id: payload.creator_id,
        brand_id: payload.brand_id,
        title: payload.title,
        description: payload.description,
        deliverables: payload.deliverables,
        services: payload.services,
        amount_cents: payload.amount_cents,
        currency: payload.currency,
        deadline: payload.deadline,
        max_revisions: payload.max_revisions,
        conversation_id: Some(conversation_id),
    };
    let mut deal = draft.into_deal(now).map_err(deal_error_response)?;

    let deliverables_json = serde_json::to_value(&deal.deliverables).map_err(internal_error)?;
    let services_json = serde_json::to_value(&deal.services).map_err(internal_error)?;

    let deal_number: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO deals (
            id, conversation_id, creator_id, brand_id, title, description, deliverables,
            services, amount_cents, platform_fee_cents, creator_payout_cents, currency,
            status, deadline, status_updated_at, revision_count, max_revisions,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $18)
        RETURNING deal_number
        "#,
    )
    .bind(deal.id)
    .bind(deal.conversation_id)
    .bind(deal.creator_id)
    .bind(deal.brand_id)
    .bind(&deal.title)
    .bind(&deal.description)
    .bind(deliverables_json)
    .bind(services_json)
    .bind(deal.amount_cents)
    .bind(deal.platform_fee_cents)
    .bind(deal.creator_payout_cents)
    .bind(&deal.currency)
    .bind(deal.status.as_str())
    .bind(deal.deadline)
    .bind(deal.status_updated_at)
    .bind(deal.revision_count)
    .bind(deal.max_revisions)
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .map_err(internal_error)?;
    deal.deal_number = deal_number;

    let event = DomainEvent::new(deal.id, DomainEventKind::DealCreated, Some(Party::Brand))
        .with_payload(json!({ "amount_cents": deal.amount_cents, "currency": deal.currency }));
    append_deal_event(&mut tx, &event).await.map_err(internal_error)?;

    tx.commit().await.map_err(internal_error)?;
    info!("deal {} created as #{}", deal.id, deal.deal_number);

    let notice = DealLifecycleNotice {
        deal_id: deal.id,
        deal_number: deal.deal_number,
        kind: DomainEventKind::DealCreated,
        actor: Party::Brand,
        from: deal.status.as_str().to_string(),
        to: deal.status.as_str().to_string(),
        occurred_at: now,
        transfer_ref: None,
        payout_cents: None,
    };
    if let Err(err) = state
        .redis
        .publish_deal_event(DomainEventKind::DealCreated, &notice)
        .await
    {
        error!("failed to publish deal_created notice for {}: {err}", deal.id);
    }

    Ok((
        StatusCode::CREATED,
        Json(DealResponse {
            message: "Deal created successfully".to_string(),
            deal,
        }),
    ))
}

async fn list_deals(
    State(state): State<AppState>,
    Query(query): Query<ListDealsQuery>,
) -> Result<Json<DealListResponse>, (StatusCode, String)> {
    let status_filter = query
        .status
        .as_deref()
        .map(str::parse::<DealStatus>)
        .transpose()
        .map_err(|err| (StatusCode::BAD_REQUEST, err.to_string()))?;

    let rows = sqlx::query(&format!(
        r#"
        SELECT {DEAL_COLUMNS}
        FROM deals
        WHERE ($1::uuid IS NULL OR creator_id = $1)
          AND ($2::uuid IS NULL OR brand_id = $2)
          AND ($3::text IS NULL OR status = $3)
        ORDER BY created_at DESC
        "#
    ))
    .bind(query.creator_id)
    .bind(query.brand_id)
    .bind(status_filter.map(|status| status.as_str().to_string()))
    .fetch_all(&state.pool)
    .await
    .map_err(internal_error)?;

    let deals = rows
        .iter()
        .map(deal_from_row)
        .collect::<AnyResult<Vec<Deal>>>()
        .map_err(internal_error)?;

    Ok(Json(DealListResponse { deals }))
}

async fn get_deal(
    State(state): State<AppState>,
    Path(deal_id): Path<Uuid>,
) -> Result<Json<DealDetailResponse>, (StatusCode, String)> {
    let row = sqlx::query(&format!("SELECT {DEAL_COLUMNS} FROM deals WHERE id = $1"))
        .bind(deal_id)
        .fetch_optional(&state.pool)
        .await
        .map_err(internal_error)?;

    let Some(row) = row else {
        return Err(deal_error_response(DealError::NotFound(deal_id)));
    };
    let deal = deal_from_row(&row).map_err(internal_error)?;

    let review_rows = sqlx::query(&format!(
        "SELECT {REVIEW_COLUMNS} FROM reviews WHERE deal_id = $1 ORDER BY created_at"
    ))
    .bind(deal_id)
    .fetch_all(&state.pool)
    .await
    .map_err(internal_error)?;
    let reviews = review_rows
        .iter()
        .map(review_from_row)
        .collect::<AnyResult<Vec<Review>>>()
        .map_err(internal_error)?;

    Ok(Json(DealDetailResponse { deal, reviews }))
}

async fn update_deal(
    State(state): State<AppState>,
    Path(deal_id): Path<Uuid>,
    Json(payload): Json<UpdateDealRequest>,
) -> Result<Json<DealResponse>, (StatusCode, String)> {
    let now = Utc::now();
    let mut tx = state.pool.begin().await.map_err(internal_error)?;

    let mut deal = fetch_deal(&mut tx, deal_id, true)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| deal_error_response(DealError::NotFound(deal_id)))?;

    if deal.status.is_terminal() {
        return Err(deal_error_response(DealError::InvalidStatusTransition {
            action: "update",
            status: deal.status,
        }));
    }

    if let Some(title) = payload.title {
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err((StatusCode::BAD_REQUEST, "title is required".to_string()));
        }
        deal.title = title;
    }
    if let Some(description) = payload.description {
        deal.description = description;
    }
    if let Some(deliverables) = payload.deliverables {
        deal.deliverables = deliverables;
    }
    if let Some(deadline) = payload.deadline {
        deal.deadline = deadline;
    }
    deal.updated_at = now;

    let deliverables_json = serde_json::to_value(&deal.deliverables).map_err(internal_error)?;
    sqlx::query(
        r#"
        UPDATE deals
        SET title = $2, description = $3, deliverables = $4, deadline = $5, updated_at = $6
        WHERE id = $1
        "#,
    )
    .bind(deal_id)
    .bind(&deal.title)
    .bind(&deal.description)
    .bind(deliverables_json)
    .bind(deal.deadline)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(internal_error)?;

    tx.commit().await.map_err(internal_error)?;

    Ok(Json(DealResponse {
        message: "Deal updated successfully".to_string(),
        deal,
    }))
}

async fn list_deal_events(
    State(state): State<AppState>,
    Path(deal_id): Path<Uuid>,
) -> Result<Json<DealEventsResponse>, (StatusCode, String)> {
    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM deals WHERE id = $1)")
        .bind(deal_id)
        .fetch_one(&state.pool)
        .await
        .map_err(internal_error)?;
    if !exists {
        return Err(deal_error_response(DealError::NotFound(deal_id)));
    }

    let rows = sqlx::query(
        "SELECT id, deal_id, kind, actor, occurred_at, payload FROM deal_events \
         WHERE deal_id = $1 ORDER BY occurred_at, id",
    )
    .bind(deal_id)
    .fetch_all(&state.pool)
    .await
    .map_err(internal_error)?;

    let events = rows
        .iter()
        .map(event_from_row)
        .collect::<AnyResult<Vec<DomainEvent>>>()
        .map_err(internal_error)?;

    Ok(Json(DealEventsResponse { events }))
}

// --- deal transitions ---

async fn accept_deal(
    State(state): State<AppState>,
    Path(deal_id): Path<Uuid>,
) -> Result<Json<DealResponse>, (StatusCode, String)> {
    let deal = run_transition(
        &state,
        deal_id,
        TransitionCommand::Accept,
        Party::Creator,
        None,
    )
    .await?;
    Ok(Json(DealResponse {
        message: "Deal accepted successfully".to_string(),
        deal,
    }))
}

async fn decline_deal(
    State(state): State<AppState>,
    Path(deal_id): Path<Uuid>,
) -> Result<Json<DealResponse>, (StatusCode, String)> {
    let deal = run_transition(
        &state,
        deal_id,
        TransitionCommand::Decline,
        Party::Creator,
        None,
    )
    .await?;
    Ok(Json(DealResponse {
        message: "Deal declined".to_string(),
        deal,
    }))
}

async fn cancel_deal(
    State(state): State<AppState>,
    Path(deal_id): Path<Uuid>,
    Json(payload): Json<CancelRequest>,
) -> Result<Json<DealResponse>, (StatusCode, String)> {
    let deal = run_transition(
        &state,
        deal_id,
        TransitionCommand::Cancel,
        payload.actor,
        None,
    )
    .await?;
    Ok(Json(DealResponse {
        message: "Deal cancelled".to_string(),
        deal,
    }))
}

async fn deliver_deal(
    State(state): State<AppState>,
    Path(deal_id): Path<Uuid>,
    payload: Option<Json<DeliverRequest>>,
) -> Result<Json<DealResponse>, (StatusCode, String)> {
    let note = payload.and_then(|Json(body)| body.message);
    let deal = run_transition(
        &state,
        deal_id,
        TransitionCommand::SubmitDelivery,
        Party::Creator,
        note,
    )
    .await?;
    Ok(Json(DealResponse {
        message: "Delivery submitted successfully".to_string(),
        deal,
    }))
}

async fn approve_deal(
    State(state): State<AppState>,
    Path(deal_id): Path<Uuid>,
) -> Result<Json<DealResponse>, (StatusCode, String)> {
    let deal = run_transition(
        &state,
        deal_id,
        TransitionCommand::Approve,
        Party::Brand,
        None,
    )
    .await?;
    Ok(Json(DealResponse {
        message: "Deal approved and payment released".to_string(),
        deal,
    }))
}

async fn request_revision(
    State(state): State<AppState>,
    Path(deal_id): Path<Uuid>,
) -> Result<Json<DealResponse>, (StatusCode, String)> {
    let deal = run_transition(
        &state,
        deal_id,
        TransitionCommand::RequestRevision,
        Party::Brand,
        None,
    )
    .await?;
    Ok(Json(DealResponse {
        message: "Revision requested".to_string(),
        deal,
    }))
}

async fn dispute_deal(
    State(state): State<AppState>,
    Path(deal_id): Path<Uuid>,
    Json(payload): Json<DisputeRequest>,
) -> Result<Json<DealResponse>, (StatusCode, String)> {
    let deal = run_transition(
        &state,
        deal_id,
        TransitionCommand::Dispute,
        payload.actor,
        payload.reason,
    )
    .await?;
    Ok(Json(DealResponse {
        message: "Deal disputed; progression is halted pending resolution".to_string(),
        deal,
    }))
}

/// Shared transition path: lock the row, derive the plan, apply it under the
/// status CAS guard, run the approve-only money steps, post the system
/// message, append the history event, commit, then notify. The payout call
/// sits inside the transaction, so a failed release rolls the status flip
/// back and the deal stays delivered.
async fn run_transition(
    state: &AppState,
    deal_id: Uuid,
    command: TransitionCommand,
    actor: Party,
    note: Option<String>,
) -> Result<Deal, (StatusCode, String)> {
    let now = Utc::now();
    let mut tx = state.pool.begin().await.map_err(internal_error)?;

    let deal = fetch_deal(&mut tx, deal_id, true)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| deal_error_response(DealError::NotFound(deal_id)))?;

    let plan = plan(&deal, command, actor, now).map_err(deal_error_response)?;
    let update = plan.to_update();

    let applied = sqlx::query(
        r#"
        UPDATE deals SET
            status = $3,
            status_updated_at = $4,
            updated_at = $4,
            accepted_at = CASE WHEN $5 THEN COALESCE(accepted_at, $4) ELSE accepted_at END,
            delivered_at = CASE WHEN $6 THEN COALESCE(delivered_at, $4) ELSE delivered_at END,
            approved_at = CASE WHEN $7 THEN COALESCE(approved_at, $4) ELSE approved_at END,
            completed_at = CASE WHEN $8 THEN COALESCE(completed_at, $4) ELSE completed_at END,
            cancelled_at = CASE WHEN $9 THEN COALESCE(cancelled_at, $4) ELSE cancelled_at END,
            revision_count = revision_count + CASE WHEN $10 THEN 1 ELSE 0 END
        WHERE id = $1 AND status = $2
        "#,
    )
    .bind(deal_id)
    .bind(update.expected_status.as_str())
    .bind(update.next_status.as_str())
    .bind(update.at)
    .bind(update.accepted_at.is_some())
    .bind(update.delivered_at.is_some())
    .bind(update.approved_at.is_some())
    .bind(update.completed_at.is_some())
    .bind(update.cancelled_at.is_some())
    .bind(update.increment_revision)
    .execute(&mut *tx)
    .await
    .map_err(internal_error)?;

    // write-time guard: zero rows means the status moved underneath us
    if applied.rows_affected() != 1 {
        return Err(deal_error_response(DealError::InvalidStatusTransition {
            action: plan.command.action(),
            status: deal.status,
        }));
    }

    let mut transfer_ref = None;
    if let Some(payout) = plan.payout.as_ref() {
        let account_row = sqlx::query(
            "SELECT payout_account_ref, payouts_enabled FROM creator_profiles WHERE id = $1",
        )
        .bind(payout.creator_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(internal_error)?;

        let account_ref = account_row.and_then(|row| {
            let enabled: bool = row.try_get("payouts_enabled").ok()?;
            let reference: Option<String> = row.try_get("payout_account_ref").ok()?;
            enabled.then_some(reference).flatten()
        });
        let Some(account_ref) = account_ref else {
            return Err(deal_error_response(DealError::PayoutFailed(
                PayoutError::AccountNotPayable,
            )));
        };

        match state
            .payouts
            .release(deal_id, &account_ref, payout.amount_cents, &payout.currency)
            .await
        {
            Ok(reference) => {
                sqlx::query(
                    "UPDATE deals SET stripe_transfer_id = COALESCE(stripe_transfer_id, $2) \
                     WHERE id = $1",
                )
                .bind(deal_id)
                .bind(&reference)
                .execute(&mut *tx)
                .await
                .map_err(internal_error)?;
                transfer_ref = Some(reference);
            }
            Err(err) => {
                // dropping the transaction leaves the deal delivered
                error!("payout for deal {deal_id} failed: {err}");
                return Err(deal_error_response(DealError::PayoutFailed(err)));
            }
        }
    }

    if let Some(stats) = plan.stats.as_ref() {
        sqlx::query(
            "UPDATE creator_profiles SET total_deals_completed = total_deals_completed + 1, \
             total_earnings_cents = total_earnings_cents + $2 WHERE id = $1",
        )
        .bind(stats.creator_id)
        .bind(stats.payout_cents)
        .execute(&mut *tx)
        .await
        .map_err(internal_error)?;

        sqlx::query(
            "UPDATE brand_profiles SET total_deals = total_deals + 1, \
             total_spent_cents = total_spent_cents + $2 WHERE id = $1",
        )
        .bind(stats.brand_id)
        .bind(stats.amount_cents)
        .execute(&mut *tx)
        .await
        .map_err(internal_error)?;
    }

    if let (Some(base), Some(conversation_id)) =
        (plan.system_message.as_ref(), deal.conversation_id)
    {
        let content = match note.as_deref() {
            Some(extra) if command == TransitionCommand::SubmitDelivery => {
                format!("{base}\n\nMessage: {extra}")
            }
            _ => base.clone(),
        };
        let draft = MessageDraft {
            conversation_id,
            sender_id: deal.party_id(plan.actor),
            sender_type: plan.actor,
            content,
            attachments: Vec::new(),
            is_system_message: true,
        };
        insert_message(&mut tx, &draft, now)
            .await
            .map_err(internal_error)?;
        touch_conversation(&mut tx, conversation_id, plan.actor, &draft.content, now)
            .await
            .map_err(internal_error)?;
    }

    let mut event = plan.event();
    if command == TransitionCommand::Dispute {
        if let (serde_json::Value::Object(map), Some(reason)) = (&mut event.payload, note.as_ref())
        {
            map.insert("reason".to_string(), json!(reason));
        }
    }
    append_deal_event(&mut tx, &event)
        .await
        .map_err(internal_error)?;

    let updated = fetch_deal(&mut tx, deal_id, false)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| internal_error("deal disappeared mid-transition"))?;
    tx.commit().await.map_err(internal_error)?;

    info!(
        "deal {} moved {} -> {} by {}",
        deal_id, plan.from, plan.to, plan.actor
    );
    publish_notice(state, &updated, &plan, transfer_ref).await;

    Ok(updated)
}

// --- conversations & messages ---

async fn create_conversation(
    State(state): State<AppState>,
    Json(payload): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<ConversationResponse>), (StatusCode, String)> {
    if payload.creator_id == payload.brand_id {
        return Err((
            StatusCode::BAD_REQUEST,
            "creator_id and brand_id must be different parties".to_string(),
        ));
    }

    let now = Utc::now();
    let inserted = sqlx::query(
        r#"
        INSERT INTO conversations (
            id, creator_id, brand_id, creator_unread, brand_unread, created_at, updated_at
        )
        VALUES ($1, $2, $3, 0, 0, $4, $4)
        ON CONFLICT (creator_id, brand_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(payload.creator_id)
    .bind(payload.brand_id)
    .bind(now)
    .execute(&state.pool)
    .await
    .map_err(internal_error)?;
    let created = inserted.rows_affected() == 1;

    let row = sqlx::query(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE creator_id = $1 AND brand_id = $2"
    ))
    .bind(payload.creator_id)
    .bind(payload.brand_id)
    .fetch_one(&state.pool)
    .await
    .map_err(internal_error)?;
    let conversation = conversation_from_row(&row).map_err(internal_error)?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(ConversationResponse {
            conversation,
            created,
        }),
    ))
}

async fn list_conversations(
    State(state): State<AppState>,
    Query(query): Query<ListConversationsQuery>,
) -> Result<Json<ConversationListResponse>, (StatusCode, String)> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {CONVERSATION_COLUMNS}
        FROM conversations
        WHERE ($1::uuid IS NULL OR creator_id = $1)
          AND ($2::uuid IS NULL OR brand_id = $2)
        ORDER BY last_message_at DESC NULLS LAST, created_at DESC
        "#
    ))
    .bind(query.creator_id)
    .bind(query.brand_id)
    .fetch_all(&state.pool)
    .await
    .map_err(internal_error)?;

    let conversations = rows
        .iter()
        .map(conversation_from_row)
        .collect::<AnyResult<Vec<Conversation>>>()
        .map_err(internal_error)?;

    Ok(Json(ConversationListResponse { conversations }))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<ConversationDetailResponse>, (StatusCode, String)> {
    let row = sqlx::query(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"
    ))
    .bind(conversation_id)
    .fetch_optional(&state.pool)
    .await
    .map_err(internal_error)?;

    let Some(row) = row else {
        return Err((
            StatusCode::NOT_FOUND,
            format!("conversation {conversation_id} not found"),
        ));
    };
    let conversation = conversation_from_row(&row).map_err(internal_error)?;

    let messages = fetch_messages(&state.pool, conversation_id)
        .await
        .map_err(internal_error)?;

    Ok(Json(ConversationDetailResponse {
        conversation,
        messages,
    }))
}

async fn list_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<MessageListResponse>, (StatusCode, String)> {
    if query.mark_as_read.unwrap_or(false) {
        let Some(reader) = query.reader else {
            return Err((
                StatusCode::BAD_REQUEST,
                "reader is required when mark_as_read is set".to_string(),
            ));
        };
        let mut tx = state.pool.begin().await.map_err(internal_error)?;
        mark_read(&mut tx, conversation_id, reader)
            .await
            .map_err(internal_error)?;
        tx.commit().await.map_err(internal_error)?;
    }

    let messages = fetch_messages(&state.pool, conversation_id)
        .await
        .map_err(internal_error)?;
    Ok(Json(MessageListResponse { messages }))
}

async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), (StatusCode, String)> {
    let now = Utc::now();
    let mut tx = state.pool.begin().await.map_err(internal_error)?;

    let row = sqlx::query(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1 FOR UPDATE"
    ))
    .bind(conversation_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(internal_error)?;
    let Some(row) = row else {
        return Err((
            StatusCode::NOT_FOUND,
            format!("conversation {conversation_id} not found"),
        ));
    };
    let conversation = conversation_from_row(&row).map_err(internal_error)?;

    let (draft, warning) = compose_user_message(
        &state.contact_policy,
        &conversation,
        payload.sender_id,
        payload.sender_type,
        payload.content,
        payload.attachments,
    )
    .map_err(deal_error_response)?;

    let message = insert_message(&mut tx, &draft, now)
        .await
        .map_err(internal_error)?;
    touch_conversation(&mut tx, conversation_id, draft.sender_type, &draft.content, now)
        .await
        .map_err(internal_error)?;

    tx.commit().await.map_err(internal_error)?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "Message sent successfully".to_string(),
            data: message,
            warning,
        }),
    ))
}

async fn mark_conversation_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Json(payload): Json<MarkReadRequest>,
) -> Result<Json<MarkReadResponse>, (StatusCode, String)> {
    let mut tx = state.pool.begin().await.map_err(internal_error)?;
    let marked = mark_read(&mut tx, conversation_id, payload.reader)
        .await
        .map_err(internal_error)?;
    tx.commit().await.map_err(internal_error)?;

    Ok(Json(MarkReadResponse {
        message: "Conversation marked as read".to_string(),
        marked,
    }))
}

// --- reviews ---

async fn create_review(
    State(state): State<AppState>,
    Json(payload): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<ReviewResponse>), (StatusCode, String)> {
    let now = Utc::now();
    let mut tx = state.pool.begin().await.map_err(internal_error)?;

    let deal = fetch_deal(&mut tx, payload.deal_id, false)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| deal_error_response(DealError::NotFound(payload.deal_id)))?;

    let review = ReviewDraft {
        deal_id: payload.deal_id,
        reviewer_id: payload.reviewer_id,
        reviewee_id: payload.reviewee_id,
        rating: payload.rating,
        comment: payload.comment,
        communication_rating: payload.communication_rating,
        quality_rating: payload.quality_rating,
        was_on_time: payload.was_on_time,
        would_work_again: payload.would_work_again,
    }
    .into_review(&deal, now)
    .map_err(deal_error_response)?;

    // the (deal_id, reviewer_id) constraint closes the check-then-insert race
    let inserted = sqlx::query(
        r#"
        INSERT INTO reviews (
            id, deal_id, reviewer_id, reviewee_id, rating, comment, communication_rating,
            quality_rating, was_on_time, would_work_again, is_public, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (deal_id, reviewer_id) DO NOTHING
        "#,
    )
    .bind(review.id)
    .bind(review.deal_id)
    .bind(review.reviewer_id)
    .bind(review.reviewee_id)
    .bind(review.rating)
    .bind(&review.comment)
    .bind(review.communication_rating)
    .bind(review.quality_rating)
    .bind(review.was_on_time)
    .bind(review.would_work_again)
    .bind(review.is_public)
    .bind(review.created_at)
    .execute(&mut *tx)
    .await
    .map_err(internal_error)?;

    if inserted.rows_affected() == 0 {
        return Err(deal_error_response(DealError::DuplicateReview));
    }

    // full rescan of the reviewee's public ratings keeps the aggregate honest
    let ratings: Vec<i32> =
        sqlx::query_scalar("SELECT rating FROM reviews WHERE reviewee_id = $1 AND is_public = TRUE")
            .bind(review.reviewee_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(internal_error)?;
    let (avg_rating, total_reviews) = aggregate_ratings(&ratings);

    sqlx::query("UPDATE creator_profiles SET avg_rating = $2, total_reviews = $3 WHERE id = $1")
        .bind(review.reviewee_id)
        .bind(avg_rating)
        .bind(total_reviews)
        .execute(&mut *tx)
        .await
        .map_err(internal_error)?;

    let event = DomainEvent::new(
        deal.id,
        DomainEventKind::ReviewSubmitted,
        deal.party_of(review.reviewer_id),
    )
    .with_payload(json!({ "rating": review.rating, "reviewee_id": review.reviewee_id }));
    append_deal_event(&mut tx, &event)
        .await
        .map_err(internal_error)?;

    tx.commit().await.map_err(internal_error)?;

    Ok((
        StatusCode::CREATED,
        Json(ReviewResponse {
            message: "Review created successfully".to_string(),
            review,
        }),
    ))
}

async fn list_reviews(
    State(state): State<AppState>,
    Query(query): Query<ListReviewsQuery>,
) -> Result<Json<ReviewListResponse>, (StatusCode, String)> {
    let limit = query.limit.unwrap_or(10).clamp(1, MAX_REVIEW_PAGE_SIZE);
    let page = query.page.unwrap_or(1).max(1);
    let offset = (page - 1) * limit;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM reviews WHERE reviewee_id = $1 AND is_public = TRUE",
    )
    .bind(query.creator_id)
    .fetch_one(&state.pool)
    .await
    .map_err(internal_error)?;

    let rows = sqlx::query(&format!(
        r#"
        SELECT {REVIEW_COLUMNS}
        FROM reviews
        WHERE reviewee_id = $1 AND is_public = TRUE
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(query.creator_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await
    .map_err(internal_error)?;

    let reviews = rows
        .iter()
        .map(review_from_row)
        .collect::<AnyResult<Vec<Review>>>()
        .map_err(internal_error)?;

    Ok(Json(ReviewListResponse {
        reviews,
        pagination: Pagination {
            page,
            limit,
            total,
            total_pages: (total + limit - 1) / limit,
        },
    }))
}

// --- shared persistence helpers ---

async fn fetch_deal(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    deal_id: Uuid,
    lock: bool,
) -> AnyResult<Option<Deal>> {
    let query = if lock {
        format!("SELECT {DEAL_COLUMNS} FROM deals WHERE id = $1 FOR UPDATE")
    } else {
        format!("SELECT {DEAL_COLUMNS} FROM deals WHERE id = $1")
    };
    let row = sqlx::query(&query)
        .bind(deal_id)
        .fetch_optional(&mut **tx)
        .await?;
    row.as_ref().map(deal_from_row).transpose()
}

async fn fetch_messages(pool: &PgPool, conversation_id: Uuid) -> AnyResult<Vec<Message>> {
    let rows = sqlx::query(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = $1 ORDER BY created_at, id"
    ))
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(message_from_row).collect()
}

async fn insert_message(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    draft: &MessageDraft,
    now: DateTime<Utc>,
) -> AnyResult<Message> {
    let message = Message {
        id: Uuid::new_v4(),
        conversation_id: draft.conversation_id,
        sender_id: draft.sender_id,
        sender_type: draft.sender_type,
        content: draft.content.clone(),
        attachments: draft.attachments.clone(),
        is_read: false,
        read_at: None,
        is_system_message: draft.is_system_message,
        created_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO messages (
            id, conversation_id, sender_id, sender_type, content, attachments,
            is_read, is_system_message, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7, $8)
        "#,
    )
    .bind(message.id)
    .bind(message.conversation_id)
    .bind(message.sender_id)
    .bind(message.sender_type.as_str())
    .bind(&message.content)
    .bind(serde_json::to_value(&message.attachments)?)
    .bind(message.is_system_message)
    .bind(message.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(message)
}

async fn touch_conversation(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    conversation_id: Uuid,
    sender: Party,
    content: &str,
    now: DateTime<Utc>,
) -> AnyResult<()> {
    // the recipient's counter is bumped in the same statement; never a
    // read-modify-write from here
    sqlx::query(
        r#"
        UPDATE conversations SET
            last_message_at = $2,
            last_message_preview = $3,
            updated_at = $2,
            creator_unread = creator_unread + CASE WHEN $4 = 'creator' THEN 1 ELSE 0 END,
            brand_unread = brand_unread + CASE WHEN $4 = 'brand' THEN 1 ELSE 0 END
        WHERE id = $1
        "#,
    )
    .bind(conversation_id)
    .bind(now)
    .bind(preview(content))
    .bind(sender.other().as_str())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn mark_read(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    conversation_id: Uuid,
    reader: Party,
) -> AnyResult<u64> {
    let marked = sqlx::query(
        "UPDATE messages SET is_read = TRUE, read_at = $3 \
         WHERE conversation_id = $1 AND sender_type <> $2 AND is_read = FALSE",
    )
    .bind(conversation_id)
    .bind(reader.as_str())
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        r#"
        UPDATE conversations SET
            creator_unread = CASE WHEN $2 = 'creator' THEN 0 ELSE creator_unread END,
            brand_unread = CASE WHEN $2 = 'brand' THEN 0 ELSE brand_unread END
        WHERE id = $1
        "#,
    )
    .bind(conversation_id)
    .bind(reader.as_str())
    .execute(&mut **tx)
    .await?;

    Ok(marked.rows_affected())
}

async fn append_deal_event(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    event: &DomainEvent,
) -> AnyResult<()> {
    sqlx::query(
        r#"
        INSERT INTO deal_events (id, deal_id, kind, actor, occurred_at, payload)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(event.id)
    .bind(event.aggregate_id)
    .bind(event.kind.as_str())
    .bind(event.actor.map(Party::as_str))
    .bind(event.occurred_at)
    .bind(&event.payload)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn publish_notice(
    state: &AppState,
    deal: &Deal,
    plan: &TransitionPlan,
    transfer_ref: Option<String>,
) {
    let notice = DealLifecycleNotice {
        deal_id: deal.id,
        deal_number: deal.deal_number,
        kind: plan.event_kind(),
        actor: plan.actor,
        from: plan.from.as_str().to_string(),
        to: plan.to.as_str().to_string(),
        occurred_at: plan.at,
        transfer_ref,
        payout_cents: plan.payout.as_ref().map(|payout| payout.amount_cents),
    };

    // the transition is already committed; a missed notification is only logged
    if let Err(err) = state
        .redis
        .publish_deal_event(plan.event_kind(), &notice)
        .await
    {
        error!(
            "failed to publish {} notice for deal {}: {err}",
            plan.event_kind(),
            deal.id
        );
    }
}

// --- row mapping ---

fn deal_from_row(row: &PgRow) -> AnyResult<Deal> {
    let status_raw: String = row.try_get("status")?;
    let deliverables: Vec<Deliverable> =
        serde_json::from_value(row.try_get::<serde_json::Value, _>("deliverables")?)?;
    let services: Vec<ServiceItem> =
        serde_json::from_value(row.try_get::<serde_json::Value, _>("services")?)?;

    Ok(Deal {
        id: row.try_get("id")?,
        deal_number: row.try_get("deal_number")?,
        conversation_id: row.try_get("conversation_id")?,
        creator_id: row.try_get("creator_id")?,
        brand_id: row.try_get("brand_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        deliverables,
        services,
        amount_cents: row.try_get("amount_cents")?,
        platform_fee_cents: row.try_get("platform_fee_cents")?,
        creator_payout_cents: row.try_get("creator_payout_cents")?,
        currency: row.try_get("currency")?,
        stripe_payment_intent_id: row.try_get("stripe_payment_intent_id")?,
        stripe_transfer_id: row.try_get("stripe_transfer_id")?,
        status: status_raw.parse::<DealStatus>()?,
        deadline: row.try_get("deadline")?,
        status_updated_at: row.try_get("status_updated_at")?,
        accepted_at: row.try_get("accepted_at")?,
        delivered_at: row.try_get("delivered_at")?,
        approved_at: row.try_get("approved_at")?,
        completed_at: row.try_get("completed_at")?,
        cancelled_at: row.try_get("cancelled_at")?,
        revision_count: row.try_get("revision_count")?,
        max_revisions: row.try_get("max_revisions")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn conversation_from_row(row: &PgRow) -> AnyResult<Conversation> {
    Ok(Conversation {
        id: row.try_get("id")?,
        creator_id: row.try_get("creator_id")?,
        brand_id: row.try_get("brand_id")?,
        creator_unread: row.try_get("creator_unread")?,
        brand_unread: row.try_get("brand_unread")?,
        last_message_at: row.try_get("last_message_at")?,
        last_message_preview: row.try_get("last_message_preview")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn message_from_row(row: &PgRow) -> AnyResult<Message> {
    let sender_raw: String = row.try_get("sender_type")?;
    let attachments = serde_json::from_value(row.try_get::<serde_json::Value, _>("attachments")?)?;

    Ok(Message {
        id: row.try_get("id")?,
        conversation_id: row.try_get("conversation_id")?,
        sender_id: row.try_get("sender_id")?,
        sender_type: sender_raw.parse::<Party>()?,
        content: row.try_get("content")?,
        attachments,
        is_read: row.try_get("is_read")?,
        read_at: row.try_get("read_at")?,
        is_system_message: row.try_get("is_system_message")?,
        created_at: row.try_get("created_at")?,
    })
}

fn review_from_row(row: &PgRow) -> AnyResult<Review> {
    Ok(Review {
        id: row.try_get("id")?,
        deal_id: row.try_get("deal_id")?,
        reviewer_id: row.try_get("reviewer_id")?,
        reviewee_id: row.try_get("reviewee_id")?,
        rating: row.try_get("rating")?,
        comment: row.try_get("comment")?,
        communication_rating: row.try_get("communication_rating")?,
        quality_rating: row.try_get("quality_rating")?,
        was_on_time: row.try_get("was_on_time")?,
        would_work_again: row.try_get("would_work_again")?,
        is_public: row.try_get("is_public")?,
        created_at: row.try_get("created_at")?,
    })
}

fn event_from_row(row: &PgRow) -> AnyResult<DomainEvent> {
    let kind_raw: String = row.try_get("kind")?;
    let actor_raw: Option<String> = row.try_get("actor")?;
    let actor = actor_raw
        .as_deref()
        .map(str::parse::<Party>)
        .transpose()?;

    Ok(DomainEvent {
        id: row.try_get("id")?,
        aggregate_id: row.try_get("deal_id")?,
        kind: kind_raw.parse::<DomainEventKind>()?,
        actor,
        occurred_at: row.try_get("occurred_at")?,
        payload: row.try_get("payload")?,
    })
}

// --- error helpers ---

fn deal_error_response(err: DealError) -> (StatusCode, String) {
    let status = match &err {
        DealError::Validation(_)
        | DealError::IncompleteDeliverables(_)
        | DealError::RevisionLimitExceeded { .. } => StatusCode::BAD_REQUEST,
        DealError::NotFound(_) => StatusCode::NOT_FOUND,
        DealError::InvalidStatusTransition { .. } | DealError::DuplicateReview => {
            StatusCode::CONFLICT
        }
        DealError::PayoutFailed(_) => StatusCode::BAD_GATEWAY,
    };
    (status, err.to_string())
}

fn internal_error<E: std::fmt::Display>(err: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
