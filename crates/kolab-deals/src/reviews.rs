use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use kolab_core::{Deal, DealError, DealStatus, Review};

#[derive(Debug, Clone)]
pub struct ReviewDraft {
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

impl ReviewDraft {
    /// Validate against the deal being reviewed. Reviews only exist for
    /// completed deals, written by one party about the other; uniqueness per
    /// (deal, reviewer) is the store's constraint, not checked here.
    pub fn into_review(self, deal: &Deal, now: DateTime<Utc>) -> Result<Review, DealError> {
        if deal.status != DealStatus::Completed {
            return Err(DealError::InvalidStatusTransition {
                action: "review",
                status: deal.status,
            });
        }

        check_rating("rating", Some(self.rating))?;
        check_rating("communication_rating", self.communication_rating)?;
        check_rating("quality_rating", self.quality_rating)?;

        if self.comment.trim().is_empty() {
            return Err(DealError::validation("comment is required"));
        }

        let Some(reviewer_party) = deal.party_of(self.reviewer_id) else {
            return Err(DealError::validation("reviewer is not a party to this deal"));
        };
        if self.reviewee_id != deal.party_id(reviewer_party.other()) {
            return Err(DealError::validation(
                "reviewee must be the other party of the deal",
            ));
        }

        Ok(Review {
            id: Uuid::new_v4(),
            deal_id: self.deal_id,
            reviewer_id: self.reviewer_id,
            reviewee_id: self.reviewee_id,
            rating: self.rating,
            comment: self.comment.trim().to_string(),
            communication_rating: self.communication_rating,
            quality_rating: self.quality_rating,
            was_on_time: self.was_on_time,
            would_work_again: self.would_work_again,
            is_public: true,
            created_at: now,
        })
    }
}

fn check_rating(field: &str, value: Option<i32>) -> Result<(), DealError> {
    match value {
        Some(rating) if !(1..=5).contains(&rating) => Err(DealError::validation(format!(
            "{field} must be between 1 and 5"
        ))),
        _ => Ok(()),
    }
}

/// Recompute a reviewee's aggregate from the full set of public ratings.
/// Always a rescan of everything, so concurrent inserts can never leave the
/// average drifting from the rows it summarizes.
pub fn aggregate_ratings(ratings: &[i32]) -> (Decimal, i64) {
    if ratings.is_empty() {
        return (Decimal::ZERO, 0);
    }

    let total: i64 = ratings.iter().map(|rating| i64::from(*rating)).sum();
    let mean = Decimal::from(total) / Decimal::from(ratings.len() as i64);
    (
        mean.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero),
        ratings.len() as i64,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_rounds_the_mean_to_one_decimal() {
        let (avg, total) = aggregate_ratings(&[4, 5, 5]);
        assert_eq!(avg, Decimal::new(47, 1));
        assert_eq!(total, 3);
    }

    #[test]
    fn aggregate_of_nothing_is_zero() {
        let (avg, total) = aggregate_ratings(&[]);
        assert_eq!(avg, Decimal::ZERO);
        assert_eq!(total, 0);
    }

    #[test]
    fn aggregate_of_a_single_rating_is_that_rating() {
        let (avg, total) = aggregate_ratings(&[3]);
        assert_eq!(avg, Decimal::new(30, 1));
        assert_eq!(total, 1);
    }

    #[test]
    fn midpoint_averages_round_up() {
        // [4, 5] -> 4.5 -> stays 4.5 at one decimal; [4, 4, 5] -> 4.333 -> 4.3
        let (avg, _) = aggregate_ratings(&[4, 5]);
        assert_eq!(avg, Decimal::new(45, 1));
        let (avg, _) = aggregate_ratings(&[4, 4, 5]);
        assert_eq!(avg, Decimal::new(43, 1));
        // 3.75 at one decimal rounds half-up to 3.8
        let (avg, _) = aggregate_ratings(&[3, 4, 4, 4]);
        assert_eq!(avg, Decimal::new(38, 1));
    }
}
