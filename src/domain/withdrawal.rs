//! Withdrawal request and record types.

use super::primitives::{AttemptId, CardType, CountryCode, GainId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Raw inbound payload of the `onsiteGiftcardWithdraw` event.
///
/// Fields are kept loose here; `RequestValidator` turns them into a
/// `WithdrawalRequest`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawPayload {
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    pub card_type: Option<String>,
    /// Number or numeric string.
    #[serde(default)]
    pub coin_amount: Option<Value>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub country_code: Option<String>,
    /// Client-generated id reused on redelivery of the same request.
    #[serde(default, deserialize_with = "lenient_string")]
    pub request_id: Option<String>,
}

/// Accepts any JSON value. Strings pass through, null is absent, anything
/// else keeps its JSON text so validation can reject it field by field.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

/// Validated withdrawal request. Transient, never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalRequest {
    pub card_type: CardType,
    /// Always positive.
    pub coin_amount: i64,
    pub country_code: CountryCode,
    pub request_id: Option<String>,
}

/// Persisted outcome of a committed debit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WithdrawalRecord {
    /// Awaiting manual approval before a code is issued.
    #[serde(rename_all = "camelCase")]
    Pending {
        attempt_id: AttemptId,
        account: GainId,
        coin_amount: i64,
        card_type: CardType,
        country_code: CountryCode,
        created_at: DateTime<Utc>,
        note: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Completed {
        attempt_id: AttemptId,
        account: GainId,
        coin_amount: i64,
        card_type: CardType,
        country_code: CountryCode,
        card_code: String,
        approver: String,
        created_at: DateTime<Utc>,
    },
}

impl WithdrawalRecord {
    pub fn attempt_id(&self) -> &AttemptId {
        match self {
            WithdrawalRecord::Pending { attempt_id, .. } => attempt_id,
            WithdrawalRecord::Completed { attempt_id, .. } => attempt_id,
        }
    }

    pub fn account(&self) -> &GainId {
        match self {
            WithdrawalRecord::Pending { account, .. } => account,
            WithdrawalRecord::Completed { account, .. } => account,
        }
    }

    pub fn coin_amount(&self) -> i64 {
        match self {
            WithdrawalRecord::Pending { coin_amount, .. } => *coin_amount,
            WithdrawalRecord::Completed { coin_amount, .. } => *coin_amount,
        }
    }

    pub fn card_type(&self) -> CardType {
        match self {
            WithdrawalRecord::Pending { card_type, .. } => *card_type,
            WithdrawalRecord::Completed { card_type, .. } => *card_type,
        }
    }

    pub fn country_code(&self) -> CountryCode {
        match self {
            WithdrawalRecord::Pending { country_code, .. } => *country_code,
            WithdrawalRecord::Completed { country_code, .. } => *country_code,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            WithdrawalRecord::Pending { created_at, .. } => *created_at,
            WithdrawalRecord::Completed { created_at, .. } => *created_at,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, WithdrawalRecord::Pending { .. })
    }

    /// Storage status label.
    pub fn status(&self) -> &'static str {
        match self {
            WithdrawalRecord::Pending { .. } => "pending",
            WithdrawalRecord::Completed { .. } => "completed",
        }
    }
}
