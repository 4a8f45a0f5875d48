//! SQLite persistence.
//!
//! This module provides:
//! - Database initialization and migrations
//! - The balance ledger with per-account serialization
//! - The repository for standing, earnings, withdrawal records and notifications

pub mod ledger;
pub mod locks;
pub mod migrations;
pub mod repo;

pub use ledger::SqliteLedger;
pub use locks::AccountLocks;
pub use migrations::init_db;
pub use repo::{EarningSource, NotificationRow, Repository};

use crate::store::StoreError;
use chrono::{DateTime, Utc};

/// Timestamps are stored as milliseconds since the Unix epoch.
pub(crate) fn timestamp_from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {}", ms)))
}
