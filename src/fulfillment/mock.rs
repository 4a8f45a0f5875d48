//! Scriptable vendor for tests and local runs without network calls.

use super::{FulfillmentError, FulfillmentGateway, IssuedCard};
use crate::domain::{CardType, CountryCode};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
enum IssueBehavior {
    Succeed(String),
    Fail(FulfillmentError),
}

/// Mock vendor with configurable stock, issuance and latency.
///
/// Defaults: in stock, issuance fails. Clones share call counters.
#[derive(Debug, Clone)]
pub struct MockFulfillment {
    in_stock: bool,
    stock_error: Option<FulfillmentError>,
    issue: IssueBehavior,
    issue_delay: Option<Duration>,
    stock_calls: Arc<AtomicUsize>,
    issue_calls: Arc<AtomicUsize>,
}

impl MockFulfillment {
    pub fn new() -> Self {
        Self {
            in_stock: true,
            stock_error: None,
            issue: IssueBehavior::Fail(FulfillmentError::Other("issuance disabled".to_string())),
            issue_delay: None,
            stock_calls: Arc::new(AtomicUsize::new(0)),
            issue_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Issue succeeds with the given card code.
    pub fn issuing(mut self, card_code: &str) -> Self {
        self.issue = IssueBehavior::Succeed(card_code.to_string());
        self
    }

    pub fn failing_issue(mut self, err: FulfillmentError) -> Self {
        self.issue = IssueBehavior::Fail(err);
        self
    }

    /// Sleep before answering an issue call.
    pub fn with_issue_delay(mut self, delay: Duration) -> Self {
        self.issue_delay = Some(delay);
        self
    }

    pub fn out_of_stock(mut self) -> Self {
        self.in_stock = false;
        self
    }

    pub fn failing_stock_check(mut self, err: FulfillmentError) -> Self {
        self.stock_error = Some(err);
        self
    }

    pub fn stock_calls(&self) -> usize {
        self.stock_calls.load(Ordering::SeqCst)
    }

    pub fn issue_calls(&self) -> usize {
        self.issue_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockFulfillment {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FulfillmentGateway for MockFulfillment {
    async fn check_stock(
        &self,
        _card_type: CardType,
        _coin_amount: i64,
        _country_code: CountryCode,
    ) -> Result<bool, FulfillmentError> {
        self.stock_calls.fetch_add(1, Ordering::SeqCst);
        match &self.stock_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.in_stock),
        }
    }

    async fn issue(
        &self,
        card_type: CardType,
        _coin_amount: i64,
        _country_code: CountryCode,
    ) -> Result<IssuedCard, FulfillmentError> {
        self.issue_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.issue_delay {
            tokio::time::sleep(delay).await;
        }
        match &self.issue {
            IssueBehavior::Succeed(code) => Ok(IssuedCard {
                card_code: code.clone(),
                card_type,
            }),
            IssueBehavior::Fail(err) => Err(err.clone()),
        }
    }
}
