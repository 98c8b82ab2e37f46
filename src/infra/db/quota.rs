use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::query_as;

use crate::application::quota::{QuotaStore, QuotaStoreError};
use crate::domain::quota::QuotaRecord;

use super::PostgresRepositories;

/// Roll and increment in one statement so concurrent commits serialize on the
/// row lock and the counter saturates at the limit.
const COMMIT_SQL: &str = r#"
INSERT INTO quota_records (identity_key, window_date, used_count, quota_limit, updated_at)
VALUES ($1, $2, 1, $3, now())
ON CONFLICT (identity_key) DO UPDATE SET
    used_count = CASE
        WHEN quota_records.window_date = EXCLUDED.window_date
            THEN LEAST(quota_records.used_count + 1, EXCLUDED.quota_limit)
        ELSE 1
    END,
    window_date = EXCLUDED.window_date,
    quota_limit = EXCLUDED.quota_limit,
    updated_at = now()
RETURNING identity_key, window_date, used_count, quota_limit
"#;

#[derive(Debug, sqlx::FromRow)]
struct QuotaRow {
    identity_key: String,
    window_date: NaiveDate,
    used_count: i32,
    quota_limit: i32,
}

impl TryFrom<QuotaRow> for QuotaRecord {
    type Error = QuotaStoreError;

    fn try_from(row: QuotaRow) -> Result<Self, Self::Error> {
        let used_count = u32::try_from(row.used_count).map_err(|_| {
            QuotaStoreError::Corrupt(format!("negative count for {}", row.identity_key))
        })?;
        let limit = u32::try_from(row.quota_limit).map_err(|_| {
            QuotaStoreError::Corrupt(format!("negative limit for {}", row.identity_key))
        })?;
        Ok(QuotaRecord {
            identity_key: row.identity_key,
            window_date: row.window_date,
            used_count,
            limit,
        })
    }
}

fn unavailable(err: sqlx::Error) -> QuotaStoreError {
    QuotaStoreError::Unavailable(err.to_string())
}

#[async_trait]
impl QuotaStore for PostgresRepositories {
    async fn load(&self, key: &str) -> Result<Option<QuotaRecord>, QuotaStoreError> {
        let row = query_as::<_, QuotaRow>(
            "SELECT identity_key, window_date, used_count, quota_limit \
             FROM quota_records WHERE identity_key = $1",
        )
        .bind(key)
        .fetch_optional(self.pool())
        .await
        .map_err(unavailable)?;
        row.map(QuotaRecord::try_from).transpose()
    }

    async fn commit(
        &self,
        key: &str,
        limit: u32,
        window: NaiveDate,
    ) -> Result<QuotaRecord, QuotaStoreError> {
        let limit = i32::try_from(limit)
            .map_err(|_| QuotaStoreError::Corrupt(format!("limit {limit} out of range")))?;
        let row = query_as::<_, QuotaRow>(COMMIT_SQL)
            .bind(key)
            .bind(window)
            .bind(limit)
            .fetch_one(self.pool())
            .await
            .map_err(unavailable)?;
        QuotaRecord::try_from(row)
    }

    async fn discard(&self, key: &str) -> Result<(), QuotaStoreError> {
        sqlx::query("DELETE FROM quota_records WHERE identity_key = $1")
            .bind(key)
            .execute(self.pool())
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}
