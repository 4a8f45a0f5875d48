//! Structural validation of the inbound withdraw payload.

use crate::domain::{CardType, CountryCode, WithdrawPayload, WithdrawalRequest};
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no payload")]
    MissingPayload,
    #[error("unsupported card type: {0}")]
    UnsupportedCard(String),
    #[error("unsupported country code: {0}")]
    UnsupportedCountry(String),
    #[error("coin amount must be a positive integer")]
    AmountRequired,
}

/// Card and country chosen by the caller, checked before authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub card_type: CardType,
    pub country_code: CountryCode,
}

/// Turns raw payloads into typed requests. Has no side effects.
///
/// Validation runs in two phases so the caller can check authentication in
/// between: `validate_selection` first, then `validate` for the amount.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestValidator;

impl RequestValidator {
    /// Payload presence, card type and country code.
    pub fn validate_selection(
        &self,
        payload: Option<&WithdrawPayload>,
    ) -> Result<Selection, ValidationError> {
        let payload = payload.ok_or(ValidationError::MissingPayload)?;

        let raw_card = payload.card_type.as_deref().unwrap_or_default();
        let card_type = CardType::from_str(raw_card)
            .map_err(|_| ValidationError::UnsupportedCard(raw_card.to_string()))?;

        let country_code = match payload.country_code.as_deref() {
            None | Some("") => CountryCode::default(),
            Some(raw) => CountryCode::from_str(raw)
                .map_err(|_| ValidationError::UnsupportedCountry(raw.to_string()))?,
        };

        Ok(Selection {
            card_type,
            country_code,
        })
    }

    /// Full validation: the selection checks followed by the amount.
    pub fn validate(
        &self,
        payload: Option<&WithdrawPayload>,
    ) -> Result<WithdrawalRequest, ValidationError> {
        let selection = self.validate_selection(payload)?;
        let payload = payload.ok_or(ValidationError::MissingPayload)?;

        let coin_amount = payload
            .coin_amount
            .as_ref()
            .and_then(parse_coin_amount)
            .filter(|amount| *amount > 0)
            .ok_or(ValidationError::AmountRequired)?;

        Ok(WithdrawalRequest {
            card_type: selection.card_type,
            coin_amount,
            country_code: selection.country_code,
            request_id: payload
                .request_id
                .as_ref()
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty()),
        })
    }
}

fn parse_coin_amount(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => parse_leading_int(s),
        _ => None,
    }
}

fn parse_leading_int(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let magnitude: i64 = digits[..end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}
