use crate::domain::message::Message;
use sqlx::FromRow;

#[derive(Debug, FromRow)]
pub struct MessageRecord {
    pub(crate) id: i64,
    pub(crate) subject: String,
    pub(crate) body: String,
}

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        Self { id: record.id, subject: record.subject, body: record.body }
    }
}
