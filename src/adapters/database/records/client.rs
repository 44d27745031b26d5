use crate::domain::client::Client;
use sqlx::FromRow;

#[derive(Debug, FromRow)]
pub struct ClientRecord {
    pub(crate) id: i64,
    pub(crate) email: String,
    pub(crate) first_name: String,
    pub(crate) last_name: String,
    pub(crate) middle_name: Option<String>,
    pub(crate) comment: Option<String>,
    pub(crate) is_active: bool,
}

impl From<ClientRecord> for Client {
    fn from(record: ClientRecord) -> Self {
        Self {
            id: record.id,
            email: record.email,
            first_name: record.first_name,
            last_name: record.last_name,
            middle_name: record.middle_name,
            comment: record.comment,
            is_active: record.is_active,
        }
    }
}
