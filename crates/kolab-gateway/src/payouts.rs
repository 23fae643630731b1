use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use kolab_core::{PayoutError, storage::PayoutGateway};

/// Escrow transfer ledger backed by Postgres. One transfer row per deal,
/// keyed on the deal id, so releasing twice returns the original reference
/// instead of moving money again — the retry contract approvals depend on.
pub struct EscrowTransferLedger {
    pool: PgPool,
}

impl EscrowTransferLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PayoutGateway for EscrowTransferLedger {
    async fn release(
        &self,
        deal_id: Uuid,
        account_ref: &str,
        amount_cents: i64,
        currency: &str,
    ) -> Result<String, PayoutError> {
        if account_ref.trim().is_empty() {
            return Err(PayoutError::AccountNotPayable);
        }
        if amount_cents < 1 {
            return Err(PayoutError::TransferFailed(format!(
                "non-positive transfer amount: {amount_cents}"
            )));
        }

        let transfer_ref = format!("tr_{}", Uuid::new_v4().simple());
        let inserted = sqlx::query(
            r#"
            INSERT INTO payout_transfers (
                id, deal_id, transfer_ref, account_ref, amount_cents, currency, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (deal_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(deal_id)
        .bind(&transfer_ref)
        .bind(account_ref)
        .bind(amount_cents)
        .bind(currency)
        .execute(&self.pool)
        .await
        .map_err(|err| PayoutError::TransferFailed(err.to_string()))?;

        if inserted.rows_affected() == 1 {
            info!("released payout {transfer_ref} for deal {deal_id}");
            return Ok(transfer_ref);
        }

        // a transfer for this deal already exists; hand back its reference
        let existing = sqlx::query("SELECT transfer_ref FROM payout_transfers WHERE deal_id = $1")
            .bind(deal_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| PayoutError::TransferFailed(err.to_string()))?;
        let existing_ref: String = existing
            .try_get("transfer_ref")
            .map_err(|err| PayoutError::TransferFailed(err.to_string()))?;

        info!("payout for deal {deal_id} already released as {existing_ref}");
        Ok(existing_ref)
    }
}
