//! HTTP client for the gift card vendor API.

use super::{FulfillmentError, FulfillmentGateway, IssuedCard};
use crate::domain::{CardType, CountryCode};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CardQuery<'a> {
    card_type: &'a str,
    coin_amount: i64,
    country_code: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StockResponse {
    in_stock: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    card_code: String,
    card_type: String,
}

/// Vendor gateway over HTTP.
///
/// Stock checks retry on network errors, 429 and 5xx. Orders are sent once.
#[derive(Debug, Clone)]
pub struct GiftcardApiGateway {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    retry_window: Duration,
}

impl GiftcardApiGateway {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, FulfillmentError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| FulfillmentError::Other(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            retry_window: Duration::from_secs(5),
        })
    }

    /// Upper bound on the total time spent retrying a stock check.
    pub fn with_retry_window(mut self, window: Duration) -> Self {
        self.retry_window = window;
        self
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let request = self.client.post(format!("{}/{}", self.base_url, path));
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

/// Sort a vendor response into success, retryable and fatal outcomes.
async fn classify(
    sent: Result<Response, reqwest::Error>,
) -> Result<Response, backoff::Error<FulfillmentError>> {
    let response = sent.map_err(|e| {
        backoff::Error::transient(FulfillmentError::NetworkError(e.to_string()))
    })?;

    let status = response.status();
    if status == 429 {
        return Err(backoff::Error::transient(FulfillmentError::RateLimited));
    }
    if status.is_server_error() {
        return Err(backoff::Error::transient(FulfillmentError::HttpError {
            status: status.as_u16(),
            message: "Server error".to_string(),
        }));
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(backoff::Error::permanent(FulfillmentError::HttpError {
            status: status.as_u16(),
            message,
        }));
    }
    Ok(response)
}

fn into_inner(err: backoff::Error<FulfillmentError>) -> FulfillmentError {
    match err {
        backoff::Error::Permanent(e) => e,
        backoff::Error::Transient { err, .. } => err,
    }
}

#[async_trait]
impl FulfillmentGateway for GiftcardApiGateway {
    async fn check_stock(
        &self,
        card_type: CardType,
        coin_amount: i64,
        country_code: CountryCode,
    ) -> Result<bool, FulfillmentError> {
        debug!(card = %card_type, coins = coin_amount, country = %country_code, "Checking stock");
        let query = CardQuery {
            card_type: card_type.as_str(),
            coin_amount,
            country_code: country_code.as_str(),
        };
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.retry_window),
            ..Default::default()
        };

        let stock: StockResponse = retry(backoff, || async {
            let response = classify(self.post("stock").json(&query).send().await).await?;
            response
                .json::<StockResponse>()
                .await
                .map_err(|e| backoff::Error::permanent(FulfillmentError::ParseError(e.to_string())))
        })
        .await?;

        Ok(stock.in_stock)
    }

    async fn issue(
        &self,
        card_type: CardType,
        coin_amount: i64,
        country_code: CountryCode,
    ) -> Result<IssuedCard, FulfillmentError> {
        debug!(card = %card_type, coins = coin_amount, country = %country_code, "Ordering card");
        let query = CardQuery {
            card_type: card_type.as_str(),
            coin_amount,
            country_code: country_code.as_str(),
        };

        let response = classify(self.post("orders").json(&query).send().await)
            .await
            .map_err(into_inner)?;
        let order = response
            .json::<OrderResponse>()
            .await
            .map_err(|e| FulfillmentError::ParseError(e.to_string()))?;

        let issued_type = CardType::from_str(&order.card_type)
            .map_err(|e| FulfillmentError::ParseError(e.to_string()))?;
        if issued_type != card_type {
            warn!(requested = %card_type, issued = %issued_type, "Vendor issued a different card type");
        }
        if order.card_code.trim().is_empty() {
            return Err(FulfillmentError::ParseError("empty card code".to_string()));
        }

        Ok(IssuedCard {
            card_code: order.card_code,
            card_type: issued_type,
        })
    }
}
