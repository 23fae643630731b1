use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use kolab_core::{PayoutError, storage::PayoutGateway};

/// Escrow transfer ledger kept in memory. One transfer per deal: a repeated
/// release for the same deal returns the original reference, which is the
/// idempotency contract approvals rely on.
#[derive(Default)]
pub struct LedgerPayouts {
    transfers: RwLock<HashMap<Uuid, String>>,
}

impl LedgerPayouts {
    pub async fn transfer_count(&self) -> usize {
        self.transfers.read().await.len()
    }
}

#[async_trait]
impl PayoutGateway for LedgerPayouts {
    async fn release(
        &self,
        deal_id: Uuid,
        account_ref: &str,
        amount_cents: i64,
        _currency: &str,
    ) -> Result<String, PayoutError> {
        if account_ref.trim().is_empty() {
            return Err(PayoutError::AccountNotPayable);
        }
        if amount_cents < 1 {
            return Err(PayoutError::TransferFailed(format!(
                "non-positive transfer amount: {amount_cents}"
            )));
        }

        let mut transfers = self.transfers.write().await;
        if let Some(existing) = transfers.get(&deal_id) {
            return Ok(existing.clone());
        }
        let transfer_ref = format!("tr_{}", Uuid::new_v4().simple());
        transfers.insert(deal_id, transfer_ref.clone());
        Ok(transfer_ref)
    }
}

/// Payout double that always refuses, for exercising the rollback path.
#[derive(Default)]
pub struct FailingPayouts;

#[async_trait]
impl PayoutGateway for FailingPayouts {
    async fn release(
        &self,
        _deal_id: Uuid,
        _account_ref: &str,
        _amount_cents: i64,
        _currency: &str,
    ) -> Result<String, PayoutError> {
        Err(PayoutError::TransferFailed(
            "escrow collaborator unavailable".to_string(),
        ))
    }
}
