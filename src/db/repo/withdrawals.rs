//! Withdrawal record operations for the repository.

use crate::db::timestamp_from_millis;
use crate::domain::{AttemptId, CardType, CountryCode, GainId, WithdrawalRecord};
use crate::store::{StoreError, WithdrawalRecordStore};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;

use super::Repository;

const RECORD_COLUMNS: &str =
    "attempt_id, gainid, status, coin_amount, card_type, country_code, card_code, approver, note, created_at";

impl Repository {
    /// Withdrawal records for an account, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn withdrawals_for(&self, account: &GainId) -> Result<Vec<WithdrawalRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM gift_card_withdrawals WHERE gainid = ? ORDER BY created_at DESC, attempt_id ASC",
            RECORD_COLUMNS
        ))
        .bind(account.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    pub async fn count_withdrawals(&self, account: &GainId) -> Result<i64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM gift_card_withdrawals WHERE gainid = ?")
                .bind(account.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

#[async_trait]
impl WithdrawalRecordStore for Repository {
    async fn insert(&self, record: &WithdrawalRecord) -> Result<bool, StoreError> {
        let (card_code, approver, note) = match record {
            WithdrawalRecord::Pending { note, .. } => (None, None, note.as_deref()),
            WithdrawalRecord::Completed {
                card_code, approver, ..
            } => (Some(card_code.as_str()), Some(approver.as_str()), None),
        };

        let result = sqlx::query(
            r#"
            INSERT INTO gift_card_withdrawals (
                attempt_id, gainid, status, coin_amount, card_type, country_code,
                card_code, approver, note, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(attempt_id) DO NOTHING
            "#,
        )
        .bind(record.attempt_id().as_str())
        .bind(record.account().as_str())
        .bind(record.status())
        .bind(record.coin_amount())
        .bind(record.card_type().as_str())
        .bind(record.country_code().as_str())
        .bind(card_code)
        .bind(approver)
        .bind(note)
        .bind(record.created_at().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find(&self, attempt: &AttemptId) -> Result<Option<WithdrawalRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM gift_card_withdrawals WHERE attempt_id = ?",
            RECORD_COLUMNS
        ))
        .bind(attempt.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }
}

fn record_from_row(row: &SqliteRow) -> Result<WithdrawalRecord, StoreError> {
    let status: String = row.try_get("status")?;
    let card_type: String = row.try_get("card_type")?;
    let country_code: String = row.try_get("country_code")?;

    let attempt_id = AttemptId::from_stored(row.try_get("attempt_id")?);
    let account = GainId::new(row.try_get("gainid")?);
    let coin_amount: i64 = row.try_get("coin_amount")?;
    let card_type = CardType::from_str(&card_type).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    let country_code =
        CountryCode::from_str(&country_code).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    let created_at = timestamp_from_millis(row.try_get("created_at")?)?;

    match status.as_str() {
        "pending" => Ok(WithdrawalRecord::Pending {
            attempt_id,
            account,
            coin_amount,
            card_type,
            country_code,
            created_at,
            note: row.try_get("note")?,
        }),
        "completed" => {
            let card_code: Option<String> = row.try_get("card_code")?;
            let approver: Option<String> = row.try_get("approver")?;
            match (card_code, approver) {
                (Some(card_code), Some(approver)) => Ok(WithdrawalRecord::Completed {
                    attempt_id,
                    account,
                    coin_amount,
                    card_type,
                    country_code,
                    card_code,
                    approver,
                    created_at,
                }),
                _ => Err(StoreError::Corrupt(format!(
                    "completed withdrawal {} without card code",
                    attempt_id
                ))),
            }
        }
        other => Err(StoreError::Corrupt(format!("unknown withdrawal status: {}", other))),
    }
}
