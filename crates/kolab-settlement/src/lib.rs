use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Marketplace cut of the gross deal amount, in basis points.
pub const FEE_RATE_BPS: i64 = 1_000;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SettlementError {
    #[error("amount must be at least 1 cent, got {0}")]
    InvalidAmount(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub platform_fee_cents: i64,
    pub creator_payout_cents: i64,
}

pub fn fee_rate() -> Decimal {
    Decimal::new(FEE_RATE_BPS, 4)
}

/// Split a gross amount into the platform fee and the creator payout.
///
/// The fee is rounded half-up to the nearest cent; the payout is always the
/// remainder, so `platform_fee_cents + creator_payout_cents` reproduces the
/// gross amount exactly. This is the single source of fee arithmetic — other
/// crates carry the derived cents around but never recompute them.
pub fn compute_settlement(amount_cents: i64) -> Result<Settlement, SettlementError> {
    if amount_cents < 1 {
        return Err(SettlementError::InvalidAmount(amount_cents));
    }

    let fee = (Decimal::from(amount_cents) * fee_rate())
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    // fee <= gross, so the conversion back to cents is total
    let platform_fee_cents = fee.to_i64().unwrap_or(amount_cents);

    Ok(Settlement {
        platform_fee_cents,
        creator_payout_cents: amount_cents - platform_fee_cents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_percent_of_a_round_amount() {
        let settlement = compute_settlement(10_000).unwrap();
        assert_eq!(settlement.platform_fee_cents, 1_000);
        assert_eq!(settlement.creator_payout_cents, 9_000);
    }

    #[test]
    fn midpoint_fees_round_up() {
        // 15 cents gross -> 1.5 cent fee -> 2 cents
        let settlement = compute_settlement(15).unwrap();
        assert_eq!(settlement.platform_fee_cents, 2);
        assert_eq!(settlement.creator_payout_cents, 13);

        // 5 cents gross -> 0.5 cent fee -> 1 cent
        let settlement = compute_settlement(5).unwrap();
        assert_eq!(settlement.platform_fee_cents, 1);
        assert_eq!(settlement.creator_payout_cents, 4);
    }

    #[test]
    fn sub_midpoint_fees_round_down() {
        // 1 cent gross -> 0.1 cent fee -> 0 cents, creator keeps everything
        let settlement = compute_settlement(1).unwrap();
        assert_eq!(settlement.platform_fee_cents, 0);
        assert_eq!(settlement.creator_payout_cents, 1);

        // 104 cents gross -> 10.4 cent fee -> 10 cents
        let settlement = compute_settlement(104).unwrap();
        assert_eq!(settlement.platform_fee_cents, 10);
        assert_eq!(settlement.creator_payout_cents, 94);
    }

    #[test]
    fn rejects_non_positive_amounts() {
        assert_eq!(compute_settlement(0), Err(SettlementError::InvalidAmount(0)));
        assert_eq!(compute_settlement(-500), Err(SettlementError::InvalidAmount(-500)));
    }
}
