use crate::domain::newsletter::{Frequency, Newsletter, NewsletterStatus};
use crate::error::AppError;
use sqlx::FromRow;
use time::{Date, OffsetDateTime, Time};

#[derive(Debug, FromRow)]
pub struct NewsletterRecord {
    pub(crate) id: i64,
    pub(crate) frequency: String,
    pub(crate) send_time: Time,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) finish_date: Option<Date>,
    pub(crate) finish_time: Option<Time>,
    pub(crate) status: String,
    pub(crate) is_active: bool,
}

impl TryFrom<NewsletterRecord> for Newsletter {
    type Error = AppError;

    fn try_from(record: NewsletterRecord) -> Result<Self, Self::Error> {
        let frequency = record.frequency.trim().parse::<Frequency>().map_err(|e| {
            tracing::error!(newsletter_id = record.id, error = %e, "Corrupt newsletter row");
            AppError::Internal
        })?;
        let status = record.status.trim().parse::<NewsletterStatus>().map_err(|e| {
            tracing::error!(newsletter_id = record.id, error = %e, "Corrupt newsletter row");
            AppError::Internal
        })?;

        Ok(Self {
            id: record.id,
            frequency,
            time: record.send_time,
            created_at: record.created_at,
            finish_date: record.finish_date,
            finish_time: record.finish_time,
            status,
            is_active: record.is_active,
        })
    }
}
