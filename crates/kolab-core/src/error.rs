use uuid::Uuid;

use crate::models::DealStatus;

#[derive(thiserror::Error, Debug)]
pub enum PayoutError {
    #[error("creator has no payable account on file")]
    AccountNotPayable,
    #[error("transfer failed: {0}")]
    TransferFailed(String),
}

#[derive(thiserror::Error, Debug)]
pub enum DealError {
    #[error("{0}")]
    Validation(String),
    #[error("deal {0} not found")]
    NotFound(Uuid),
    #[error("cannot {action} a deal with status: {status}")]
    InvalidStatusTransition {
        action: &'static str,
        status: DealStatus,
    },
    #[error("all deliverables must be complete before submitting; incomplete: {0:?}")]
    IncompleteDeliverables(Vec<String>),
    #[error("revision limit of {max} reached")]
    RevisionLimitExceeded { max: i32 },
    #[error("a review for this deal by this reviewer already exists")]
    DuplicateReview,
    #[error("payout failed: {0}")]
    PayoutFailed(#[from] PayoutError),
}

impl DealError {
    pub fn validation(message: impl Into<String>) -> Self {
        DealError::Validation(message.into())
    }
}
