//! SQLite-backed balance ledger.
//!
//! Every mutation updates `users.balance` and appends to `balance_movements`
//! inside one transaction while holding the account's lock. The
//! `balance + delta >= 0` guard in the UPDATE re-checks sufficiency at write
//! time, so an earlier eligibility read is never trusted on its own.

use super::locks::AccountLocks;
use super::timestamp_from_millis;
use crate::domain::{BalanceMovement, GainId, IdempotencyKey, MovementReason};
use crate::store::{BalanceLedger, LedgerError, StoreError};
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone)]
pub struct SqliteLedger {
    pool: SqlitePool,
    locks: AccountLocks,
}

/// Movement previously written under an idempotency key.
struct PriorMovement {
    account: GainId,
    delta: i64,
    resulting_balance: i64,
}

impl SqliteLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            locks: AccountLocks::new(),
        }
    }

    /// Create an account with an opening balance.
    ///
    /// A non-zero opening balance is itself recorded as a movement so the
    /// balance always equals the sum of movement deltas.
    pub async fn open_account(&self, account: &GainId, opening_balance: i64) -> Result<(), LedgerError> {
        if opening_balance < 0 {
            return Err(LedgerError::InvalidAmount(opening_balance));
        }
        let _guard = self.locks.acquire(account).await;
        let now = chrono::Utc::now().timestamp_millis();

        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            r#"
            INSERT INTO users (gainid, balance, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(gainid) DO NOTHING
            "#,
        )
        .bind(account.as_str())
        .bind(opening_balance)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(LedgerError::AccountExists(account.clone()));
        }

        if opening_balance > 0 {
            insert_movement(
                &mut tx,
                account,
                opening_balance,
                opening_balance,
                MovementReason::Opening,
                &IdempotencyKey::opening(account),
                now,
            )
            .await?;
        }
        tx.commit().await?;

        info!(gainid = %account, balance = opening_balance, "Account opened");
        Ok(())
    }

    /// Full movement history for an account, oldest first.
    pub async fn movements(&self, account: &GainId) -> Result<Vec<BalanceMovement>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT gainid, delta, resulting_balance, reason, idempotency_key, created_at
            FROM balance_movements
            WHERE gainid = ?
            ORDER BY id ASC
            "#,
        )
        .bind(account.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(movement_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(LedgerError::from)
    }

    #[instrument(skip(self, account, key), fields(gainid = %account, key = %key))]
    async fn apply(
        &self,
        account: &GainId,
        delta: i64,
        reason: MovementReason,
        key: &IdempotencyKey,
    ) -> Result<i64, LedgerError> {
        let _guard = self.locks.acquire(account).await;

        if let Some(prior) = self.find_by_key(key).await? {
            return replay(prior, account, delta, key);
        }

        let mut tx = self.pool.begin().await?;
        // The UPDATE goes first so the transaction takes the write lock
        // immediately instead of upgrading from a read.
        let updated = sqlx::query(
            r#"
            UPDATE users SET balance = balance + ?
            WHERE gainid = ? AND balance + ? >= 0
            RETURNING balance
            "#,
        )
        .bind(delta)
        .bind(account.as_str())
        .bind(delta)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = updated else {
            tx.rollback().await?;
            let current: Option<i64> =
                sqlx::query_scalar("SELECT balance FROM users WHERE gainid = ?")
                    .bind(account.as_str())
                    .fetch_optional(&self.pool)
                    .await?;
            return Err(match current {
                None => LedgerError::AccountNotFound(account.clone()),
                Some(balance) => LedgerError::InsufficientBalance {
                    account: account.clone(),
                    balance,
                    requested: -delta,
                },
            });
        };
        let resulting_balance: i64 = row.try_get("balance")?;

        let now = chrono::Utc::now().timestamp_millis();
        match insert_movement(&mut tx, account, delta, resulting_balance, reason, key, now).await {
            Ok(()) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                // Another writer outside this process used the key first.
                drop(tx);
                return match self.find_by_key(key).await? {
                    Some(prior) => replay(prior, account, delta, key),
                    None => Err(LedgerError::KeyConflict(key.clone())),
                };
            }
            Err(e) => return Err(e.into()),
        }
        tx.commit().await?;

        info!(delta, balance = resulting_balance, reason = reason.as_str(), "Balance updated");
        Ok(resulting_balance)
    }

    async fn find_by_key(&self, key: &IdempotencyKey) -> Result<Option<PriorMovement>, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT gainid, delta, resulting_balance
            FROM balance_movements
            WHERE idempotency_key = ?
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(PriorMovement {
            account: GainId::new(row.try_get("gainid")?),
            delta: row.try_get("delta")?,
            resulting_balance: row.try_get("resulting_balance")?,
        }))
    }
}

fn replay(
    prior: PriorMovement,
    account: &GainId,
    delta: i64,
    key: &IdempotencyKey,
) -> Result<i64, LedgerError> {
    if prior.account != *account || prior.delta != delta {
        return Err(LedgerError::KeyConflict(key.clone()));
    }
    debug!(balance = prior.resulting_balance, "Idempotent replay of ledger movement");
    Ok(prior.resulting_balance)
}

async fn insert_movement(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    account: &GainId,
    delta: i64,
    resulting_balance: i64,
    reason: MovementReason,
    key: &IdempotencyKey,
    created_at: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO balance_movements
            (gainid, delta, resulting_balance, reason, idempotency_key, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(account.as_str())
    .bind(delta)
    .bind(resulting_balance)
    .bind(reason.as_str())
    .bind(key.as_str())
    .bind(created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn movement_from_row(row: &SqliteRow) -> Result<BalanceMovement, StoreError> {
    let reason: String = row.try_get("reason")?;
    Ok(BalanceMovement {
        account: GainId::new(row.try_get("gainid")?),
        delta: row.try_get("delta")?,
        resulting_balance: row.try_get("resulting_balance")?,
        created_at: timestamp_from_millis(row.try_get("created_at")?)?,
        reason: MovementReason::from_str(&reason).map_err(StoreError::Corrupt)?,
        idempotency_key: IdempotencyKey::from_stored(row.try_get("idempotency_key")?),
    })
}

#[async_trait]
impl BalanceLedger for SqliteLedger {
    async fn balance(&self, account: &GainId) -> Result<i64, LedgerError> {
        let balance: Option<i64> = sqlx::query_scalar("SELECT balance FROM users WHERE gainid = ?")
            .bind(account.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(balance.unwrap_or(0))
    }

    async fn has_movement(&self, key: &IdempotencyKey) -> Result<bool, LedgerError> {
        Ok(self.find_by_key(key).await?.is_some())
    }

    async fn debit(
        &self,
        account: &GainId,
        amount: i64,
        key: &IdempotencyKey,
    ) -> Result<i64, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        self.apply(account, -amount, MovementReason::Withdrawal, key)
            .await
    }

    async fn credit(
        &self,
        account: &GainId,
        amount: i64,
        key: &IdempotencyKey,
    ) -> Result<i64, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        self.apply(account, amount, MovementReason::WithdrawalReversal, key)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::domain::AttemptId;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, SqliteLedger) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("ledger.db").to_string_lossy().to_string();
        let pool = init_db(&db_path).await.unwrap();
        (temp_dir, SqliteLedger::new(pool))
    }

    fn user(id: &str) -> GainId {
        GainId::new(id.to_string())
    }

    fn debit_key(attempt: &str) -> IdempotencyKey {
        IdempotencyKey::debit(&AttemptId::from_stored(attempt.to_string()))
    }

    #[tokio::test]
    async fn test_debit_updates_balance_and_appends_movement() {
        let (_dir, ledger) = setup().await;
        let account = user("u1");
        ledger.open_account(&account, 500).await.unwrap();

        let balance = ledger.debit(&account, 100, &debit_key("a1")).await.unwrap();
        assert_eq!(balance, 400);
        assert_eq!(ledger.balance(&account).await.unwrap(), 400);

        let movements = ledger.movements(&account).await.unwrap();
        assert_eq!(movements.len(), 2);
        assert_eq!(movements[0].reason, MovementReason::Opening);
        assert_eq!(movements[1].delta, -100);
        assert_eq!(movements[1].resulting_balance, 400);
        assert_eq!(movements[1].reason, MovementReason::Withdrawal);
    }

    #[tokio::test]
    async fn test_repeated_key_does_not_debit_twice() {
        let (_dir, ledger) = setup().await;
        let account = user("u1");
        ledger.open_account(&account, 500).await.unwrap();

        let first = ledger.debit(&account, 100, &debit_key("a1")).await.unwrap();
        let second = ledger.debit(&account, 100, &debit_key("a1")).await.unwrap();
        assert_eq!(first, 400);
        assert_eq!(second, 400);
        assert_eq!(ledger.balance(&account).await.unwrap(), 400);
        assert_eq!(ledger.movements(&account).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_key_reuse_with_different_amount_conflicts() {
        let (_dir, ledger) = setup().await;
        let account = user("u1");
        ledger.open_account(&account, 500).await.unwrap();
        ledger.debit(&account, 100, &debit_key("a1")).await.unwrap();

        let err = ledger.debit(&account, 200, &debit_key("a1")).await.unwrap_err();
        assert!(matches!(err, LedgerError::KeyConflict(_)));
        assert_eq!(ledger.balance(&account).await.unwrap(), 400);
    }

    #[tokio::test]
    async fn test_insufficient_balance_is_rejected_at_write_time() {
        let (_dir, ledger) = setup().await;
        let account = user("u1");
        ledger.open_account(&account, 50).await.unwrap();

        let err = ledger.debit(&account, 100, &debit_key("a1")).await.unwrap_err();
        match err {
            LedgerError::InsufficientBalance { balance, requested, .. } => {
                assert_eq!(balance, 50);
                assert_eq!(requested, 100);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(ledger.balance(&account).await.unwrap(), 50);
        assert_eq!(ledger.movements(&account).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let (_dir, ledger) = setup().await;
        let ghost = user("ghost");
        assert_eq!(ledger.balance(&ghost).await.unwrap(), 0);
        let err = ledger.debit(&ghost, 1, &debit_key("a1")).await.unwrap_err();
        assert!(matches!(err, LedgerError::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn test_non_positive_amounts_rejected() {
        let (_dir, ledger) = setup().await;
        let account = user("u1");
        ledger.open_account(&account, 10).await.unwrap();
        assert!(matches!(
            ledger.debit(&account, 0, &debit_key("a1")).await,
            Err(LedgerError::InvalidAmount(0))
        ));
        assert!(matches!(
            ledger.credit(&account, -5, &debit_key("a2")).await,
            Err(LedgerError::InvalidAmount(-5))
        ));
    }

    #[tokio::test]
    async fn test_credit_restores_and_is_idempotent() {
        let (_dir, ledger) = setup().await;
        let account = user("u1");
        let attempt = AttemptId::from_stored("a1".to_string());
        ledger.open_account(&account, 300).await.unwrap();

        ledger
            .debit(&account, 120, &IdempotencyKey::debit(&attempt))
            .await
            .unwrap();
        let restored = ledger
            .credit(&account, 120, &IdempotencyKey::credit(&attempt))
            .await
            .unwrap();
        let again = ledger
            .credit(&account, 120, &IdempotencyKey::credit(&attempt))
            .await
            .unwrap();
        assert_eq!(restored, 300);
        assert_eq!(again, 300);
        assert_eq!(ledger.balance(&account).await.unwrap(), 300);
    }

    #[tokio::test]
    async fn test_open_account_twice_fails() {
        let (_dir, ledger) = setup().await;
        let account = user("u1");
        ledger.open_account(&account, 0).await.unwrap();
        assert!(matches!(
            ledger.open_account(&account, 10).await,
            Err(LedgerError::AccountExists(_))
        ));
        assert!(ledger.movements(&account).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_debits_never_overdraw() {
        let (_dir, ledger) = setup().await;
        let ledger = Arc::new(ledger);
        let account = user("u1");
        ledger.open_account(&account, 500).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..10 {
            let ledger = ledger.clone();
            let account = account.clone();
            handles.push(tokio::spawn(async move {
                ledger.debit(&account, 100, &debit_key(&format!("a{}", i))).await
            }));
        }

        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(LedgerError::InsufficientBalance { .. }) => {}
                Err(e) => panic!("unexpected error: {:?}", e),
            }
        }
        assert_eq!(ok, 5);
        assert_eq!(ledger.balance(&account).await.unwrap(), 0);

        let movements = ledger.movements(&account).await.unwrap();
        let sum: i64 = movements.iter().map(|m| m.delta).sum();
        assert_eq!(sum, 0);
    }
}
