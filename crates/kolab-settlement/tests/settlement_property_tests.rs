//! Property-based coverage of the settlement split.
//!
//! The settlement invariants must hold for every representable gross amount,
//! not just the spot values covered by the unit tests, so this file drives
//! the calculator through proptest-generated inputs.

use proptest::prelude::*;

use kolab_settlement::{FEE_RATE_BPS, SettlementError, compute_settlement};

proptest! {
    /// Fee plus payout must reproduce the gross amount exactly.
    #[test]
    fn fee_and_payout_sum_to_the_gross_amount(amount_cents in 1i64..=5_000_000_000) {
        let settlement = compute_settlement(amount_cents).unwrap();
        prop_assert_eq!(
            settlement.platform_fee_cents + settlement.creator_payout_cents,
            amount_cents
        );
    }

    /// Both legs are non-negative and the fee never exceeds the gross amount.
    #[test]
    fn fee_and_payout_stay_within_bounds(amount_cents in 1i64..=5_000_000_000) {
        let settlement = compute_settlement(amount_cents).unwrap();
        prop_assert!(settlement.platform_fee_cents >= 0);
        prop_assert!(settlement.creator_payout_cents >= 0);
        prop_assert!(settlement.platform_fee_cents <= amount_cents);
    }

    /// The decimal rounding agrees with the integer half-up oracle for 10%.
    #[test]
    fn fee_matches_the_half_up_oracle(amount_cents in 1i64..=5_000_000_000) {
        let settlement = compute_settlement(amount_cents).unwrap();
        let oracle = (amount_cents * FEE_RATE_BPS + 5_000) / 10_000;
        prop_assert_eq!(settlement.platform_fee_cents, oracle);
    }

    /// The fee is monotone: a larger gross never yields a smaller fee.
    #[test]
    fn fee_is_monotone_in_the_gross_amount(amount_cents in 1i64..=5_000_000_000) {
        let smaller = compute_settlement(amount_cents).unwrap();
        let larger = compute_settlement(amount_cents + 1).unwrap();
        prop_assert!(larger.platform_fee_cents >= smaller.platform_fee_cents);
    }

    /// Everything at or below zero is rejected before any arithmetic runs.
    #[test]
    fn non_positive_amounts_are_rejected(amount_cents in i64::MIN..=0) {
        prop_assert_eq!(
            compute_settlement(amount_cents),
            Err(SettlementError::InvalidAmount(amount_cents))
        );
    }
}
