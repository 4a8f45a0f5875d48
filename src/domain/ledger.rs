//! Balance movement types.

use super::primitives::{AttemptId, GainId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::str::FromStr;

/// Why the balance moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementReason {
    Opening,
    Withdrawal,
    WithdrawalReversal,
}

impl MovementReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementReason::Opening => "opening",
            MovementReason::Withdrawal => "withdrawal",
            MovementReason::WithdrawalReversal => "withdrawal_reversal",
        }
    }
}

impl FromStr for MovementReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "opening" => Ok(MovementReason::Opening),
            "withdrawal" => Ok(MovementReason::Withdrawal),
            "withdrawal_reversal" => Ok(MovementReason::WithdrawalReversal),
            other => Err(format!("unknown movement reason: {}", other)),
        }
    }
}

/// Key that makes a ledger mutation apply at most once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn debit(attempt: &AttemptId) -> Self {
        IdempotencyKey(format!("debit:{}", attempt))
    }

    /// Compensating credit for the debit of the same attempt.
    pub fn credit(attempt: &AttemptId) -> Self {
        IdempotencyKey(format!("credit:{}", attempt))
    }

    pub fn opening(account: &GainId) -> Self {
        IdempotencyKey(format!("opening:{}", account))
    }

    pub fn from_stored(key: String) -> Self {
        IdempotencyKey(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Append-only record of a single balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceMovement {
    pub account: GainId,
    pub delta: i64,
    pub resulting_balance: i64,
    pub created_at: DateTime<Utc>,
    pub reason: MovementReason,
    pub idempotency_key: IdempotencyKey,
}
