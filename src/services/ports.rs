//! Persistence and delivery collaborators consumed by the services.
//!
//! Postgres implementations live in `adapters::database`, in-memory ones in
//! `adapters::memory`; SMTP delivery is `adapters::mail::SmtpMailTransport`.

use crate::domain::client::{Client, NewClient};
use crate::domain::delivery_log::{DeliveryLog, NewDeliveryLog};
use crate::domain::message::{Message, NewMessage};
use crate::domain::newsletter::{NewNewsletter, Newsletter, NewsletterStatus};
use crate::domain::schedule::{CrontabSchedule, PeriodicTask, RecurrenceSpec, ScheduledTask};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;
use time::OffsetDateTime;

#[async_trait]
pub trait NewsletterRepository: Send + Sync + std::fmt::Debug {
    async fn create(&self, newsletter: NewNewsletter) -> Result<Newsletter>;

    async fn get(&self, id: i64) -> Result<Option<Newsletter>>;

    async fn update_status(&self, id: i64, status: NewsletterStatus) -> Result<()>;

    async fn set_active(&self, id: i64, is_active: bool) -> Result<()>;

    /// Deletes the newsletter together with its client/message links and delivery log.
    async fn delete(&self, id: i64) -> Result<()>;
}

#[async_trait]
pub trait ClientRepository: Send + Sync + std::fmt::Debug {
    async fn create(&self, client: NewClient) -> Result<Client>;

    async fn get(&self, id: i64) -> Result<Option<Client>>;

    /// Clients of a newsletter, ordered by id.
    async fn list_for_newsletter(&self, newsletter_id: i64) -> Result<Vec<Client>>;

    async fn set_active(&self, id: i64, is_active: bool) -> Result<()>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync + std::fmt::Debug {
    async fn create(&self, message: NewMessage) -> Result<Message>;

    /// Messages of a newsletter, ordered by id.
    async fn list_for_newsletter(&self, newsletter_id: i64) -> Result<Vec<Message>>;
}

/// Append-only record of send attempts.
#[async_trait]
pub trait DeliveryLogRepository: Send + Sync + std::fmt::Debug {
    /// Appends a row. Returns `false` if the same (newsletter, message, client, fire) was already logged.
    async fn append(&self, entry: NewDeliveryLog) -> Result<bool>;

    /// `(message_id, client_id)` pairs already logged for a firing.
    async fn recorded_pairs(&self, newsletter_id: i64, fire_at: OffsetDateTime) -> Result<HashSet<(i64, i64)>>;

    /// Log rows of a newsletter, newest first.
    async fn list_for_newsletter(&self, newsletter_id: i64, limit: i64) -> Result<Vec<DeliveryLog>>;
}

/// Storage for recurrences and the periodic tasks bound to them.
#[async_trait]
pub trait PeriodicTaskRegistry: Send + Sync + std::fmt::Debug {
    /// Returns the schedule row for `spec`, creating it if absent.
    async fn schedule_or_get(&self, spec: RecurrenceSpec) -> Result<CrontabSchedule>;

    /// # Errors
    /// Returns `AppError::Conflict` if a task with the same name exists.
    async fn register(&self, name: &str, schedule_id: i64, newsletter_id: i64) -> Result<PeriodicTask>;

    async fn find_by_name(&self, name: &str) -> Result<Option<PeriodicTask>>;

    async fn find_by_newsletter(&self, newsletter_id: i64) -> Result<Option<PeriodicTask>>;

    async fn delete(&self, task_id: i64) -> Result<()>;

    /// All registered tasks with their recurrence.
    async fn list_scheduled(&self) -> Result<Vec<ScheduledTask>>;

    /// Moves `last_run_at` from `previous` to `fired_at`. Returns `false` if another
    /// scheduler already claimed the firing.
    async fn claim_run(&self, task_id: i64, previous: Option<OffsetDateTime>, fired_at: OffsetDateTime)
    -> Result<bool>;

    /// Undoes a claim whose pass failed: moves `last_run_at` from `claimed` back to
    /// `previous` so the firing is picked up again. Returns `false` if the task moved on.
    async fn release_run(&self, task_id: i64, claimed: OffsetDateTime, previous: Option<OffsetDateTime>)
    -> Result<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Could not build email: {0}")]
    Build(String),
    #[error("Transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait MailTransport: Send + Sync + std::fmt::Debug {
    /// Sends one email from the configured sender address.
    ///
    /// # Errors
    /// Returns `MailError` if the email cannot be built or the relay rejects it.
    async fn send(&self, email: &OutgoingEmail) -> std::result::Result<(), MailError>;

    /// Checks that the relay is reachable.
    async fn check(&self) -> std::result::Result<(), MailError>;
}
