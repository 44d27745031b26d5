use crate::domain::client::Client;
use crate::domain::delivery_log::{DeliveryLog, DeliveryStatus};
use crate::domain::newsletter::{Newsletter, NewsletterStatus};
use crate::domain::schedule::PeriodicTask;
use crate::services::delivery_service::DeliveryPass;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NewsletterStatusDto {
    Created,
    Started,
    Finished,
}

impl From<NewsletterStatus> for NewsletterStatusDto {
    fn from(status: NewsletterStatus) -> Self {
        match status {
            NewsletterStatus::Created => Self::Created,
            NewsletterStatus::Started => Self::Started,
            NewsletterStatus::Finished => Self::Finished,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsletterResponse {
    pub id: i64,
    pub status: NewsletterStatusDto,
    pub is_active: bool,
}

impl From<Newsletter> for NewsletterResponse {
    fn from(newsletter: Newsletter) -> Self {
        Self { id: newsletter.id, status: newsletter.status.into(), is_active: newsletter.is_active }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub task_id: i64,
    pub name: String,
    pub newsletter_id: i64,
    pub schedule_id: i64,
}

impl From<PeriodicTask> for TaskResponse {
    fn from(task: PeriodicTask) -> Self {
        Self { task_id: task.id, name: task.name, newsletter_id: task.newsletter_id, schedule_id: task.schedule_id }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassResponse {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<usize>,
}

impl From<DeliveryPass> for PassResponse {
    fn from(pass: DeliveryPass) -> Self {
        let outcome = |outcome| Self { outcome, delivered: None, failed: None, skipped: None };
        match pass {
            DeliveryPass::Completed { delivered, failed, skipped } => Self {
                outcome: "completed",
                delivered: Some(delivered),
                failed: Some(failed),
                skipped: Some(skipped),
            },
            DeliveryPass::Expired => outcome("expired"),
            DeliveryPass::Missing => outcome("missing"),
            DeliveryPass::AlreadyRunning => outcome("alreadyRunning"),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientResponse {
    pub id: i64,
    pub email: String,
    pub is_active: bool,
}

impl From<Client> for ClientResponse {
    fn from(client: Client) -> Self {
        Self { id: client.id, email: client.email, is_active: client.is_active }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryLogDto {
    pub id: i64,
    pub message_id: i64,
    pub client_id: i64,
    pub success: bool,
    pub server_response: String,
    #[serde(with = "time::serde::rfc3339")]
    pub fire_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<DeliveryLog> for DeliveryLogDto {
    fn from(log: DeliveryLog) -> Self {
        Self {
            id: log.id,
            message_id: log.message_id,
            client_id: log.client_id,
            success: log.status == DeliveryStatus::Success,
            server_response: log.server_response,
            fire_at: log.fire_at,
            created_at: log.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<i64>,
}
