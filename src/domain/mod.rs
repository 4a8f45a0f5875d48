//! Domain types for gift card withdrawals.
//!
//! This module provides:
//! - Primitives: GainId, AttemptId, CardType, CountryCode
//! - Account standing snapshot
//! - Ledger movement and idempotency key types
//! - Withdrawal request/record types and outbound client events

pub mod events;
pub mod ledger;
pub mod primitives;
pub mod standing;
pub mod withdrawal;

pub use events::{NotificationLevel, OutboundEvent};
pub use ledger::{BalanceMovement, IdempotencyKey, MovementReason};
pub use primitives::{AttemptId, CardType, CountryCode, GainId, GainIdParseError, UnsupportedValue};
pub use standing::{AccountStanding, StandingFlag};
pub use withdrawal::{WithdrawPayload, WithdrawalRecord, WithdrawalRequest};
