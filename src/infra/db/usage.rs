use async_trait::async_trait;
use uuid::Uuid;

use crate::application::usage::{UsageEvent, UsageSink, UsageSinkError};
use crate::domain::quota::IdentityClass;

use super::PostgresRepositories;

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn saturating_i32(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[async_trait]
impl UsageSink for PostgresRepositories {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn record(&self, event: &UsageEvent) -> Result<(), UsageSinkError> {
        let identity_class = match event.identity_class {
            IdentityClass::Anonymous => "anonymous",
            IdentityClass::Authenticated => "authenticated",
        };
        sqlx::query(
            "INSERT INTO usage_logs \
             (id, operation, file_count, input_bytes, output_bytes, page_count, elapsed_ms, identity_class, client_version) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(Uuid::new_v4())
        .bind(event.operation.as_str())
        .bind(saturating_i32(event.file_count))
        .bind(saturating_i64(event.input_bytes))
        .bind(saturating_i64(event.output_bytes))
        .bind(saturating_i32(event.page_count))
        .bind(saturating_i64(event.elapsed_ms))
        .bind(identity_class)
        .bind(event.client_version.as_deref())
        .execute(self.pool())
        .await
        .map_err(|err| UsageSinkError {
            sink: "postgres",
            message: err.to_string(),
        })?;
        Ok(())
    }
}
