//! Gift card vendor abstraction: stock checks and card issuance.

use crate::domain::{CardType, CountryCode};
use async_trait::async_trait;
use std::fmt;

pub mod giftcard_api;
pub mod mock;

pub use giftcard_api::GiftcardApiGateway;
pub use mock::MockFulfillment;

/// A card issued by the vendor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCard {
    pub card_code: String,
    pub card_type: CardType,
}

/// Vendor operations consumed by the withdrawal flow.
///
/// `check_stock` is a read and may be retried. `issue` purchases a card and
/// must not be retried by implementations.
#[async_trait]
pub trait FulfillmentGateway: Send + Sync + fmt::Debug {
    async fn check_stock(
        &self,
        card_type: CardType,
        coin_amount: i64,
        country_code: CountryCode,
    ) -> Result<bool, FulfillmentError>;

    async fn issue(
        &self,
        card_type: CardType,
        coin_amount: i64,
        country_code: CountryCode,
    ) -> Result<IssuedCard, FulfillmentError>;
}

/// Error type for fulfillment operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FulfillmentError {
    /// Network error (connection refused, DNS failure, client timeout)
    NetworkError(String),
    /// Non-success HTTP status from the vendor
    HttpError { status: u16, message: String },
    /// Response body could not be understood
    ParseError(String),
    RateLimited,
    /// The caller's deadline elapsed before the vendor answered
    Timeout,
    Other(String),
}

impl fmt::Display for FulfillmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FulfillmentError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            FulfillmentError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            FulfillmentError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            FulfillmentError::RateLimited => write!(f, "Rate limited"),
            FulfillmentError::Timeout => write!(f, "Timed out"),
            FulfillmentError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for FulfillmentError {}
