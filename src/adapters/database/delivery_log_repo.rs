use crate::adapters::database::DbPool;
use crate::adapters::database::records::DeliveryLogRecord;
use crate::domain::delivery_log::{DeliveryLog, NewDeliveryLog};
use crate::error::Result;
use crate::services::ports::DeliveryLogRepository;
use async_trait::async_trait;
use std::collections::HashSet;
use time::OffsetDateTime;

#[derive(Clone, Debug)]
pub struct PgDeliveryLogRepository {
    pool: DbPool,
}

impl PgDeliveryLogRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeliveryLogRepository for PgDeliveryLogRepository {
    #[tracing::instrument(level = "debug", skip(self, entry), fields(status = %entry.status))]
    async fn append(&self, entry: NewDeliveryLog) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO newsletter_logs (newsletter_id, message_id, client_id, status, server_response, fire_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (newsletter_id, message_id, client_id, fire_at) DO NOTHING
            "#,
        )
        .bind(entry.newsletter_id)
        .bind(entry.message_id)
        .bind(entry.client_id)
        .bind(entry.status.to_string())
        .bind(&entry.server_response)
        .bind(entry.fire_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn recorded_pairs(&self, newsletter_id: i64, fire_at: OffsetDateTime) -> Result<HashSet<(i64, i64)>> {
        let rows = sqlx::query_as::<_, (i64, i64)>(
            "SELECT message_id, client_id FROM newsletter_logs WHERE newsletter_id = $1 AND fire_at = $2",
        )
        .bind(newsletter_id)
        .bind(fire_at)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_for_newsletter(&self, newsletter_id: i64, limit: i64) -> Result<Vec<DeliveryLog>> {
        let records = sqlx::query_as::<_, DeliveryLogRecord>(
            r#"
            SELECT id, newsletter_id, message_id, client_id, status, server_response, fire_at, created_at
            FROM newsletter_logs
            WHERE newsletter_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(newsletter_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(TryInto::try_into).collect()
    }
}
