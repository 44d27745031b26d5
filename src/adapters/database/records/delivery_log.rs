use crate::domain::delivery_log::{DeliveryLog, DeliveryStatus};
use crate::error::AppError;
use sqlx::FromRow;
use time::OffsetDateTime;

#[derive(Debug, FromRow)]
pub struct DeliveryLogRecord {
    pub(crate) id: i64,
    pub(crate) newsletter_id: i64,
    pub(crate) message_id: i64,
    pub(crate) client_id: i64,
    pub(crate) status: String,
    pub(crate) server_response: String,
    pub(crate) fire_at: OffsetDateTime,
    pub(crate) created_at: OffsetDateTime,
}

impl TryFrom<DeliveryLogRecord> for DeliveryLog {
    type Error = AppError;

    fn try_from(record: DeliveryLogRecord) -> Result<Self, Self::Error> {
        let status = record.status.trim().parse::<DeliveryStatus>().map_err(|e| {
            tracing::error!(log_id = record.id, error = %e, "Corrupt delivery log row");
            AppError::Internal
        })?;

        Ok(Self {
            id: record.id,
            newsletter_id: record.newsletter_id,
            message_id: record.message_id,
            client_id: record.client_id,
            status,
            server_response: record.server_response,
            fire_at: record.fire_at,
            created_at: record.created_at,
        })
    }
}
