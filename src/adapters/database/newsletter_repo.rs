use crate::adapters::database::DbPool;
use crate::adapters::database::records::NewsletterRecord;
use crate::domain::newsletter::{NewNewsletter, Newsletter, NewsletterStatus};
use crate::error::{AppError, Result};
use crate::services::ports::NewsletterRepository;
use async_trait::async_trait;

const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Clone, Debug)]
pub struct PgNewsletterRepository {
    pool: DbPool,
}

impl PgNewsletterRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_link_error(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) => {
            // A linked client or message does not exist
            AppError::NotFound
        }
        e => AppError::Database(e),
    }
}

#[async_trait]
impl NewsletterRepository for PgNewsletterRepository {
    /// Inserts the newsletter and its client/message links in one transaction.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if a linked client or message does not exist.
    #[tracing::instrument(level = "debug", skip(self, newsletter))]
    async fn create(&self, newsletter: NewNewsletter) -> Result<Newsletter> {
        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, NewsletterRecord>(
            r#"
            INSERT INTO newsletters (frequency, send_time, finish_date, finish_time)
            VALUES ($1, $2, $3, $4)
            RETURNING id, frequency, send_time, created_at, finish_date, finish_time, status, is_active
            "#,
        )
        .bind(newsletter.frequency.to_string())
        .bind(newsletter.time)
        .bind(newsletter.finish_date)
        .bind(newsletter.finish_time)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO newsletter_clients (newsletter_id, client_id) SELECT $1, UNNEST($2::BIGINT[])")
            .bind(record.id)
            .bind(&newsletter.client_ids)
            .execute(&mut *tx)
            .await
            .map_err(map_link_error)?;

        sqlx::query("INSERT INTO newsletter_messages (newsletter_id, message_id) SELECT $1, UNNEST($2::BIGINT[])")
            .bind(record.id)
            .bind(&newsletter.message_ids)
            .execute(&mut *tx)
            .await
            .map_err(map_link_error)?;

        tx.commit().await?;
        record.try_into()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn get(&self, id: i64) -> Result<Option<Newsletter>> {
        let record = sqlx::query_as::<_, NewsletterRecord>(
            r#"
            SELECT id, frequency, send_time, created_at, finish_date, finish_time, status, is_active
            FROM newsletters
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        record.map(TryInto::try_into).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn update_status(&self, id: i64, status: NewsletterStatus) -> Result<()> {
        let result = sqlx::query("UPDATE newsletters SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn set_active(&self, id: i64, is_active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE newsletters SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(is_active)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM newsletters WHERE id = $1").bind(id).execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}
