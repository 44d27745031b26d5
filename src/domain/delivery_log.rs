use time::OffsetDateTime;

/// Server response recorded for a successful send.
pub const DELIVERED_RESPONSE: &str = "delivered";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Success,
    Failure,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "S"),
            Self::Failure => write!(f, "F"),
        }
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "S" => Ok(Self::Success),
            "F" => Ok(Self::Failure),
            _ => Err(format!("Invalid delivery status: {s}")),
        }
    }
}

/// One send attempt of one message to one client. Rows are never updated.
#[derive(Debug, Clone)]
pub struct DeliveryLog {
    pub id: i64,
    pub newsletter_id: i64,
    pub message_id: i64,
    pub client_id: i64,
    pub status: DeliveryStatus,
    pub server_response: String,
    pub fire_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewDeliveryLog {
    pub newsletter_id: i64,
    pub message_id: i64,
    pub client_id: i64,
    pub status: DeliveryStatus,
    pub server_response: String,
    pub fire_at: OffsetDateTime,
}

impl NewDeliveryLog {
    #[must_use]
    pub fn delivered(newsletter_id: i64, message_id: i64, client_id: i64, fire_at: OffsetDateTime) -> Self {
        Self {
            newsletter_id,
            message_id,
            client_id,
            status: DeliveryStatus::Success,
            server_response: DELIVERED_RESPONSE.to_string(),
            fire_at,
        }
    }

    #[must_use]
    pub fn failed(
        newsletter_id: i64,
        message_id: i64,
        client_id: i64,
        fire_at: OffsetDateTime,
        error: impl ToString,
    ) -> Self {
        Self {
            newsletter_id,
            message_id,
            client_id,
            status: DeliveryStatus::Failure,
            server_response: error.to_string(),
            fire_at,
        }
    }
}
