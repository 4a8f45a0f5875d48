//! Storage contracts consumed by the eligibility pipeline and the orchestrator.
//!
//! The SQLite implementations live in `crate::db`; tests substitute their own.

use crate::domain::{AccountStanding, AttemptId, GainId, IdempotencyKey, WithdrawalRecord};
use async_trait::async_trait;
use thiserror::Error;

/// Reports moderation and verification flags for an account.
#[async_trait]
pub trait AccountStandingProvider: Send + Sync {
    /// Fetch a fresh standing snapshot. Missing rows read as "not flagged".
    async fn fetch(&self, account: &GainId) -> Result<AccountStanding, StoreError>;
}

/// Sums historical earnings across every earning source.
#[async_trait]
pub trait EarningsAggregator: Send + Sync {
    /// Total coins earned. Zero when the account has no earnings rows.
    async fn sum(&self, account: &GainId) -> Result<i64, StoreError>;
}

/// Sole writer of account balances and balance movements.
#[async_trait]
pub trait BalanceLedger: Send + Sync {
    /// Current balance. Zero for an unknown account.
    async fn balance(&self, account: &GainId) -> Result<i64, LedgerError>;

    /// Atomically subtract `amount` and append the movement.
    ///
    /// Repeating a call with the same key returns the balance computed by the
    /// first call without mutating anything.
    async fn debit(
        &self,
        account: &GainId,
        amount: i64,
        key: &IdempotencyKey,
    ) -> Result<i64, LedgerError>;

    /// Whether a movement was already written under `key`.
    async fn has_movement(&self, key: &IdempotencyKey) -> Result<bool, LedgerError>;

    /// Compensating credit, idempotent under the same key discipline as `debit`.
    async fn credit(
        &self,
        account: &GainId,
        amount: i64,
        key: &IdempotencyKey,
    ) -> Result<i64, LedgerError>;
}

/// Sole writer of withdrawal records.
#[async_trait]
pub trait WithdrawalRecordStore: Send + Sync {
    /// Persist a record. Returns `false` if a record for the same attempt
    /// already exists, in which case nothing is written.
    async fn insert(&self, record: &WithdrawalRecord) -> Result<bool, StoreError>;

    async fn find(&self, attempt: &AttemptId) -> Result<Option<WithdrawalRecord>, StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Infrastructure failures are worth retrying; corrupt data is not.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Db(_))
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Amount must be positive, got {0}")]
    InvalidAmount(i64),
    #[error("Insufficient balance for {account}: balance {balance}, requested {requested}")]
    InsufficientBalance {
        account: GainId,
        balance: i64,
        requested: i64,
    },
    #[error("Account not found: {0}")]
    AccountNotFound(GainId),
    #[error("Account already exists: {0}")]
    AccountExists(GainId),
    #[error("Idempotency key {0} was already used for a different movement")]
    KeyConflict(IdempotencyKey),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Store(e) if e.is_transient())
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Store(StoreError::Db(err))
    }
}
