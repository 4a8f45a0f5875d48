//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for everything except balance
//! mutation, which belongs to `SqliteLedger`. Methods are organized across
//! submodules by domain:
//! - `withdrawals.rs` - Withdrawal record operations

mod withdrawals;

use crate::domain::{AccountStanding, GainId, NotificationLevel, StandingFlag};
use crate::notify::NotificationSink;
use crate::store::{AccountStandingProvider, EarningsAggregator, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::str::FromStr;

use super::timestamp_from_millis;

/// Source of earned coins counted toward the withdrawal threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarningSource {
    Survey,
    Video,
    Referral,
}

impl EarningSource {
    fn table(&self) -> &'static str {
        match self {
            EarningSource::Survey => "survey_earnings",
            EarningSource::Video => "video_earnings",
            EarningSource::Referral => "referral_earnings",
        }
    }
}

fn flag_table(flag: StandingFlag) -> &'static str {
    match flag {
        StandingFlag::Banned => "banned_accounts",
        StandingFlag::Frozen => "frozen_accounts",
        StandingFlag::Muted => "muted_accounts",
        StandingFlag::CountryBanned => "country_banned_accounts",
        StandingFlag::Deleted => "deleted_accounts",
    }
}

/// Stored notification as shown to the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRow {
    pub level: NotificationLevel,
    pub kind: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Standing administration
    // =========================================================================

    /// Set or clear a moderation flag.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub async fn set_standing_flag(
        &self,
        account: &GainId,
        flag: StandingFlag,
        on: bool,
    ) -> Result<(), StoreError> {
        // Table names come from a closed enum; only values are bound.
        let table = flag_table(flag);
        if on {
            sqlx::query(&format!(
                "INSERT INTO {} (gainid, created_at) VALUES (?, ?) ON CONFLICT(gainid) DO NOTHING",
                table
            ))
            .bind(account.as_str())
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(&format!("DELETE FROM {} WHERE gainid = ?", table))
                .bind(account.as_str())
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    /// Write the email confirmation row. Without a row the account counts as
    /// confirmed.
    pub async fn set_email_confirmed(&self, account: &GainId, confirmed: bool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO email_verifications (gainid, email_confirmed)
            VALUES (?, ?)
            ON CONFLICT(gainid) DO UPDATE SET email_confirmed = excluded.email_confirmed
            "#,
        )
        .bind(account.as_str())
        .bind(confirmed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns `false` when the account does not exist.
    pub async fn set_identity_verified(&self, account: &GainId, verified: bool) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE users SET verified = ? WHERE gainid = ?")
            .bind(verified)
            .bind(account.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Earnings
    // =========================================================================

    pub async fn record_earning(
        &self,
        account: &GainId,
        source: EarningSource,
        coins: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO {} (gainid, coins, created_at) VALUES (?, ?, ?)",
            source.table()
        ))
        .bind(account.as_str())
        .bind(coins)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Notifications for an account, newest first.
    pub async fn notifications_for(&self, account: &GainId) -> Result<Vec<NotificationRow>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT level, kind, message, created_at
            FROM notifications
            WHERE gainid = ?
            ORDER BY id DESC
            "#,
        )
        .bind(account.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<NotificationRow, StoreError> {
                let level: String = row.try_get("level")?;
                Ok(NotificationRow {
                    level: NotificationLevel::from_str(&level).map_err(StoreError::Corrupt)?,
                    kind: row.try_get("kind")?,
                    message: row.try_get("message")?,
                    created_at: timestamp_from_millis(row.try_get("created_at")?)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl AccountStandingProvider for Repository {
    async fn fetch(&self, account: &GainId) -> Result<AccountStanding, StoreError> {
        let id = account.as_str();
        let row = sqlx::query(
            r#"
            SELECT
                EXISTS(SELECT 1 FROM banned_accounts WHERE gainid = ?) AS banned,
                EXISTS(SELECT 1 FROM frozen_accounts WHERE gainid = ?) AS frozen,
                EXISTS(SELECT 1 FROM muted_accounts WHERE gainid = ?) AS muted,
                EXISTS(SELECT 1 FROM country_banned_accounts WHERE gainid = ?) AS country_banned,
                EXISTS(SELECT 1 FROM deleted_accounts WHERE gainid = ?) AS deleted,
                (SELECT email_confirmed FROM email_verifications WHERE gainid = ?) AS email_confirmed,
                COALESCE((SELECT verified FROM users WHERE gainid = ?), 0) AS identity_verified
            "#,
        )
        .bind(id)
        .bind(id)
        .bind(id)
        .bind(id)
        .bind(id)
        .bind(id)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        let email_confirmed: Option<bool> = row.try_get("email_confirmed")?;
        Ok(AccountStanding {
            banned: row.try_get("banned")?,
            frozen: row.try_get("frozen")?,
            muted: row.try_get("muted")?,
            country_banned: row.try_get("country_banned")?,
            deleted: row.try_get("deleted")?,
            // A missing verification row counts as verified.
            email_verified: email_confirmed.unwrap_or(true),
            identity_verified: row.try_get("identity_verified")?,
        })
    }
}

#[async_trait]
impl EarningsAggregator for Repository {
    async fn sum(&self, account: &GainId) -> Result<i64, StoreError> {
        let id = account.as_str();
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT
                (SELECT COALESCE(SUM(coins), 0) FROM survey_earnings WHERE gainid = ?)
                + (SELECT COALESCE(SUM(coins), 0) FROM video_earnings WHERE gainid = ?)
                + (SELECT COALESCE(SUM(coins), 0) FROM referral_earnings WHERE gainid = ?)
            "#,
        )
        .bind(id)
        .bind(id)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }
}

#[async_trait]
impl NotificationSink for Repository {
    async fn notify(
        &self,
        account: &GainId,
        level: NotificationLevel,
        kind: &str,
        message: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (gainid, level, kind, message, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.as_str())
        .bind(level.as_str())
        .bind(kind)
        .bind(message)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_db, SqliteLedger};
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Repository, SqliteLedger) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("repo.db").to_string_lossy().to_string();
        let pool = init_db(&db_path).await.unwrap();
        (temp_dir, Repository::new(pool.clone()), SqliteLedger::new(pool))
    }

    fn user() -> GainId {
        GainId::new("u1".to_string())
    }

    #[tokio::test]
    async fn test_unknown_account_has_clean_standing() {
        let (_dir, repo, _ledger) = setup().await;
        let standing = repo.fetch(&user()).await.unwrap();
        assert!(!standing.banned);
        assert!(!standing.frozen);
        assert!(!standing.identity_verified);
        // No verification row reads as verified.
        assert!(standing.email_verified);
    }

    #[tokio::test]
    async fn test_flags_roundtrip() {
        let (_dir, repo, ledger) = setup().await;
        let account = user();
        ledger.open_account(&account, 0).await.unwrap();

        repo.set_standing_flag(&account, StandingFlag::Banned, true).await.unwrap();
        repo.set_standing_flag(&account, StandingFlag::Muted, true).await.unwrap();
        repo.set_standing_flag(&account, StandingFlag::Muted, true).await.unwrap();
        repo.set_email_confirmed(&account, false).await.unwrap();
        assert!(repo.set_identity_verified(&account, true).await.unwrap());

        let standing = repo.fetch(&account).await.unwrap();
        assert!(standing.banned);
        assert!(standing.muted);
        assert!(!standing.frozen);
        assert!(!standing.email_verified);
        assert!(standing.identity_verified);

        repo.set_standing_flag(&account, StandingFlag::Banned, false).await.unwrap();
        repo.set_email_confirmed(&account, true).await.unwrap();
        let standing = repo.fetch(&account).await.unwrap();
        assert!(!standing.banned);
        assert!(standing.email_verified);
    }

    #[tokio::test]
    async fn test_identity_flag_on_missing_account() {
        let (_dir, repo, _ledger) = setup().await;
        assert!(!repo.set_identity_verified(&user(), true).await.unwrap());
    }

    #[tokio::test]
    async fn test_earnings_sum_across_sources() {
        let (_dir, repo, _ledger) = setup().await;
        let account = user();
        assert_eq!(repo.sum(&account).await.unwrap(), 0);

        repo.record_earning(&account, EarningSource::Survey, 100).await.unwrap();
        repo.record_earning(&account, EarningSource::Survey, 20).await.unwrap();
        repo.record_earning(&account, EarningSource::Video, 30).await.unwrap();
        repo.record_earning(&account, EarningSource::Referral, 5).await.unwrap();
        repo.record_earning(&GainId::new("other".into()), EarningSource::Video, 999)
            .await
            .unwrap();

        assert_eq!(repo.sum(&account).await.unwrap(), 155);
    }

    #[tokio::test]
    async fn test_notifications_are_stored_newest_first() {
        let (_dir, repo, _ledger) = setup().await;
        let account = user();
        repo.notify(&account, NotificationLevel::Info, "pendingwithdrawal", "first")
            .await
            .unwrap();
        repo.notify(&account, NotificationLevel::Info, "successwithdrawal", "second")
            .await
            .unwrap();

        let rows = repo.notifications_for(&account).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].message, "second");
        assert_eq!(rows[1].kind, "pendingwithdrawal");
        assert_eq!(rows[1].level, NotificationLevel::Info);
    }
}
