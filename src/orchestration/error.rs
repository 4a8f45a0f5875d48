//! Failure taxonomy of a withdrawal attempt and its user-facing translation.

use crate::engine::messages;
use crate::engine::{EligibilityFailure, ValidationError};
use crate::fulfillment::FulfillmentError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WithdrawError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),
    #[error("no authenticated account")]
    Unauthorized,
    #[error("not eligible: {0:?}")]
    Eligibility(EligibilityFailure),
    #[error("storage unavailable: {0}")]
    TransientPersistence(String),
    #[error("fulfillment failed: {0}")]
    Fulfillment(#[from] FulfillmentError),
    #[error("card out of stock")]
    OutOfStock,
    #[error("attempt already in progress")]
    AttemptInProgress,
    #[error("attempt was rolled back and cannot be resubmitted")]
    AttemptRolledBack,
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl WithdrawError {
    /// The only text a client sees for this failure.
    pub fn user_message(&self, min_earned_to_withdraw: i64) -> String {
        match self {
            WithdrawError::Validation(ValidationError::MissingPayload) => messages::UNKNOWN.to_string(),
            WithdrawError::Validation(ValidationError::UnsupportedCard(_))
            | WithdrawError::Validation(ValidationError::UnsupportedCountry(_)) => {
                messages::REFRESH.to_string()
            }
            WithdrawError::Validation(ValidationError::AmountRequired) => {
                messages::AMOUNT_REQUIRED.to_string()
            }
            WithdrawError::Unauthorized => messages::NOT_AUTHORIZED.to_string(),
            WithdrawError::Eligibility(EligibilityFailure::Suspended) => {
                messages::ACCOUNT_SUSPENDED.to_string()
            }
            WithdrawError::Eligibility(EligibilityFailure::EmailNotVerified) => {
                messages::EMAIL_NOT_VERIFIED.to_string()
            }
            WithdrawError::Eligibility(EligibilityFailure::InsufficientBalance { .. }) => {
                messages::BALANCE_NOT_ENOUGH.to_string()
            }
            WithdrawError::Eligibility(EligibilityFailure::InsufficientEarnings { .. }) => {
                messages::min_earned(min_earned_to_withdraw)
            }
            WithdrawError::OutOfStock => messages::OUT_OF_STOCK.to_string(),
            WithdrawError::AttemptInProgress => messages::ATTEMPT_IN_PROGRESS.to_string(),
            WithdrawError::TransientPersistence(_)
            | WithdrawError::AttemptRolledBack
            | WithdrawError::Fulfillment(_)
            | WithdrawError::InvariantViolation(_) => messages::BASE.to_string(),
        }
    }
}
