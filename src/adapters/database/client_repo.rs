use crate::adapters::database::DbPool;
use crate::adapters::database::records::ClientRecord;
use crate::domain::client::{Client, NewClient};
use crate::error::{AppError, Result};
use crate::services::ports::ClientRepository;
use async_trait::async_trait;

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone, Debug)]
pub struct PgClientRepository {
    pool: DbPool,
}

impl PgClientRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClientRepository for PgClientRepository {
    /// # Errors
    /// Returns `AppError::Conflict` if the email is already registered.
    #[tracing::instrument(level = "debug", skip(self, client))]
    async fn create(&self, client: NewClient) -> Result<Client> {
        let result = sqlx::query_as::<_, ClientRecord>(
            r#"
            INSERT INTO clients (email, first_name, last_name, middle_name, comment)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, email, first_name, last_name, middle_name, comment, is_active
            "#,
        )
        .bind(&client.email)
        .bind(&client.first_name)
        .bind(&client.last_name)
        .bind(&client.middle_name)
        .bind(&client.comment)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(record) => Ok(record.into()),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Err(AppError::Conflict(format!("client {} already exists", client.email)))
            }
            Err(e) => Err(AppError::Database(e)),
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn get(&self, id: i64) -> Result<Option<Client>> {
        let record = sqlx::query_as::<_, ClientRecord>(
            "SELECT id, email, first_name, last_name, middle_name, comment, is_active FROM clients WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Into::into))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_for_newsletter(&self, newsletter_id: i64) -> Result<Vec<Client>> {
        let records = sqlx::query_as::<_, ClientRecord>(
            r#"
            SELECT c.id, c.email, c.first_name, c.last_name, c.middle_name, c.comment, c.is_active
            FROM clients c
            JOIN newsletter_clients nc ON nc.client_id = c.id
            WHERE nc.newsletter_id = $1
            ORDER BY c.id ASC
            "#,
        )
        .bind(newsletter_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Into::into).collect())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn set_active(&self, id: i64, is_active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE clients SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(is_active)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}
