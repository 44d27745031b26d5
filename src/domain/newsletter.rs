use crate::error::{AppError, Result};
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Daily => write!(f, "D"),
            Self::Weekly => write!(f, "W"),
            Self::Monthly => write!(f, "M"),
        }
    }
}

impl std::str::FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "D" => Ok(Self::Daily),
            "W" => Ok(Self::Weekly),
            "M" => Ok(Self::Monthly),
            _ => Err(format!("Invalid newsletter frequency: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewsletterStatus {
    Created,
    Started,
    Finished,
}

impl std::fmt::Display for NewsletterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "C"),
            Self::Started => write!(f, "S"),
            Self::Finished => write!(f, "F"),
        }
    }
}

impl std::str::FromStr for NewsletterStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "C" => Ok(Self::Created),
            "S" => Ok(Self::Started),
            "F" => Ok(Self::Finished),
            _ => Err(format!("Invalid newsletter status: {s}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Newsletter {
    pub id: i64,
    pub frequency: Frequency,
    /// Time of day (UTC) at which the newsletter goes out.
    pub time: Time,
    pub created_at: OffsetDateTime,
    pub finish_date: Option<Date>,
    pub finish_time: Option<Time>,
    pub status: NewsletterStatus,
    pub is_active: bool,
}

impl Newsletter {
    /// The instant after which no more passes should be sent, interpreted as UTC.
    ///
    /// # Errors
    /// Returns `AppError::InvalidSchedule` if the finish date or time is missing.
    pub fn finish_at(&self) -> Result<OffsetDateTime> {
        match (self.finish_date, self.finish_time) {
            (Some(date), Some(time)) => Ok(PrimitiveDateTime::new(date, time).assume_utc()),
            (date, time) => Err(AppError::InvalidSchedule(format!(
                "{self} has incomplete finish (date: {date:?}, time: {time:?})"
            ))),
        }
    }

    /// Whether `now` is strictly past the finish instant.
    ///
    /// # Errors
    /// Returns `AppError::InvalidSchedule` if the finish instant cannot be built.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> Result<bool> {
        Ok(now > self.finish_at()?)
    }
}

/// The display name doubles as the periodic task name, so it only depends on the id.
impl std::fmt::Display for Newsletter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Newsletter #{}", self.id)
    }
}

#[derive(Debug, Clone)]
pub struct NewNewsletter {
    pub frequency: Frequency,
    pub time: Time,
    pub finish_date: Option<Date>,
    pub finish_time: Option<Time>,
    pub client_ids: Vec<i64>,
    pub message_ids: Vec<i64>,
}
