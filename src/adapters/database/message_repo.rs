use crate::adapters::database::DbPool;
use crate::adapters::database::records::MessageRecord;
use crate::domain::message::{Message, NewMessage};
use crate::error::Result;
use crate::services::ports::MessageRepository;
use async_trait::async_trait;

#[derive(Clone, Debug)]
pub struct PgMessageRepository {
    pool: DbPool,
}

impl PgMessageRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    #[tracing::instrument(level = "debug", skip(self, message))]
    async fn create(&self, message: NewMessage) -> Result<Message> {
        let record = sqlx::query_as::<_, MessageRecord>(
            "INSERT INTO messages (subject, body) VALUES ($1, $2) RETURNING id, subject, body",
        )
        .bind(&message.subject)
        .bind(&message.body)
        .fetch_one(&self.pool)
        .await?;

        Ok(record.into())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_for_newsletter(&self, newsletter_id: i64) -> Result<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT m.id, m.subject, m.body
            FROM messages m
            JOIN newsletter_messages nm ON nm.message_id = m.id
            WHERE nm.newsletter_id = $1
            ORDER BY m.id ASC
            "#,
        )
        .bind(newsletter_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Into::into).collect())
    }
}
