use crate::domain::client::Client;
use crate::domain::delivery_log::DeliveryLog;
use crate::domain::newsletter::{Newsletter, NewsletterStatus};
use crate::domain::schedule::PeriodicTask;
use crate::error::{AppError, Result};
use crate::services::Repositories;
use crate::services::delivery_service::{DeliveryPass, NewsletterDeliveryService};
use time::OffsetDateTime;

pub const MAX_LOG_PAGE: i64 = 500;

/// Newsletter lifecycle: starting, rescheduling, stopping and inspecting deliveries.
#[derive(Clone, Debug)]
pub struct NewsletterService {
    repos: Repositories,
    delivery: NewsletterDeliveryService,
}

impl NewsletterService {
    #[must_use]
    pub const fn new(repos: Repositories, delivery: NewsletterDeliveryService) -> Self {
        Self { repos, delivery }
    }

    /// Registers the newsletter's periodic task and marks it started.
    ///
    /// # Errors
    /// - `AppError::NotFound` if the newsletter does not exist.
    /// - `AppError::Conflict` if it is already started.
    /// - `AppError::BadRequest` if it is inactive or its finish time has passed.
    /// - `AppError::InvalidSchedule` if the finish date or time is missing.
    #[tracing::instrument(skip(self), err(level = "warn"))]
    pub async fn start(&self, newsletter_id: i64) -> Result<PeriodicTask> {
        let newsletter = self.schedulable(newsletter_id).await?;
        if newsletter.status == NewsletterStatus::Started {
            return Err(AppError::Conflict(format!("{newsletter} is already started")));
        }

        self.activate(&newsletter).await
    }

    /// Replaces the periodic task after the newsletter's frequency or time changed.
    ///
    /// # Errors
    /// Same as [`Self::start`], except that a started newsletter is accepted.
    #[tracing::instrument(skip(self), err(level = "warn"))]
    pub async fn reschedule(&self, newsletter_id: i64) -> Result<PeriodicTask> {
        let mut newsletter = self.schedulable(newsletter_id).await?;
        self.delivery.delete_task(&mut newsletter).await?;
        self.activate(&newsletter).await
    }

    /// Removes the periodic task, then the newsletter with its links and log.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the newsletter does not exist.
    #[tracing::instrument(skip(self), err(level = "warn"))]
    pub async fn remove(&self, newsletter_id: i64) -> Result<()> {
        let mut newsletter = self.find(newsletter_id).await?;
        self.delivery.delete_task(&mut newsletter).await?;
        self.repos.newsletters.delete(newsletter_id).await?;

        tracing::info!("Newsletter removed");
        Ok(())
    }

    /// Marks the newsletter inactive and stops its periodic task.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the newsletter does not exist.
    #[tracing::instrument(skip(self), err(level = "warn"))]
    pub async fn deactivate(&self, newsletter_id: i64) -> Result<Newsletter> {
        let mut newsletter = self.find(newsletter_id).await?;
        self.repos.newsletters.set_active(newsletter_id, false).await?;
        newsletter.is_active = false;
        self.delivery.delete_task(&mut newsletter).await?;
        Ok(newsletter)
    }

    /// # Errors
    /// Returns `AppError::NotFound` if the client does not exist.
    #[tracing::instrument(skip(self), err(level = "warn"))]
    pub async fn deactivate_client(&self, client_id: i64) -> Result<Client> {
        let mut client = self.repos.clients.get(client_id).await?.ok_or(AppError::NotFound)?;
        self.repos.clients.set_active(client_id, false).await?;
        client.is_active = false;

        tracing::info!(client = %client, "Client deactivated");
        Ok(client)
    }

    /// Delivery log of a newsletter, newest first, at most `limit` rows.
    ///
    /// # Errors
    /// - `AppError::NotFound` if the newsletter does not exist.
    /// - `AppError::BadRequest` if `limit` is outside `1..=MAX_LOG_PAGE`.
    pub async fn logs(&self, newsletter_id: i64, limit: i64) -> Result<Vec<DeliveryLog>> {
        if !(1..=MAX_LOG_PAGE).contains(&limit) {
            return Err(AppError::BadRequest(format!("limit must be between 1 and {MAX_LOG_PAGE}")));
        }
        self.find(newsletter_id).await?;
        self.repos.logs.list_for_newsletter(newsletter_id, limit).await
    }

    /// Runs a delivery pass now instead of waiting for the next firing.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the newsletter does not exist, otherwise
    /// whatever the delivery pass returns.
    #[tracing::instrument(skip(self), err(level = "warn"))]
    pub async fn dispatch(&self, newsletter_id: i64) -> Result<DeliveryPass> {
        self.find(newsletter_id).await?;
        self.delivery.send_newsletter(newsletter_id).await
    }

    async fn find(&self, newsletter_id: i64) -> Result<Newsletter> {
        self.repos.newsletters.get(newsletter_id).await?.ok_or(AppError::NotFound)
    }

    async fn schedulable(&self, newsletter_id: i64) -> Result<Newsletter> {
        let newsletter = self.find(newsletter_id).await?;
        if !newsletter.is_active {
            return Err(AppError::BadRequest(format!("{newsletter} is inactive")));
        }
        if newsletter.is_expired_at(OffsetDateTime::now_utc())? {
            return Err(AppError::BadRequest(format!("{newsletter} finish time has already passed")));
        }
        Ok(newsletter)
    }

    async fn activate(&self, newsletter: &Newsletter) -> Result<PeriodicTask> {
        let task = self.delivery.create_task(newsletter).await?;
        self.repos.newsletters.update_status(newsletter.id, NewsletterStatus::Started).await?;
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mail::MemoryMailTransport;
    use crate::adapters::memory::MemoryStore;
    use crate::config::DeliveryConfig;
    use crate::domain::newsletter::{Frequency, NewNewsletter};
    use std::sync::Arc;
    use time::Duration;
    use time::macros::time;

    fn service(store: &Arc<MemoryStore>) -> NewsletterService {
        let repos = Repositories::in_memory(store);
        let delivery =
            NewsletterDeliveryService::new(repos.clone(), Arc::new(MemoryMailTransport::new()), DeliveryConfig::default());
        NewsletterService::new(repos, delivery)
    }

    async fn newsletter(store: &Arc<MemoryStore>, finish_in: Duration) -> Newsletter {
        let finish = OffsetDateTime::now_utc() + finish_in;
        Repositories::in_memory(store)
            .newsletters
            .create(NewNewsletter {
                frequency: Frequency::Weekly,
                time: time!(07:15),
                finish_date: Some(finish.date()),
                finish_time: Some(finish.time()),
                client_ids: vec![],
                message_ids: vec![],
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_start_registers_task_once() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store);
        let newsletter = newsletter(&store, Duration::days(7)).await;

        let task = service.start(newsletter.id).await.unwrap();
        assert_eq!(task.name, newsletter.to_string());

        let stored = service.find(newsletter.id).await.unwrap();
        assert_eq!(stored.status, NewsletterStatus::Started);

        assert!(matches!(service.start(newsletter.id).await, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_start_rejects_expired_newsletter() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store);
        let newsletter = newsletter(&store, -Duration::days(1)).await;

        assert!(matches!(service.start(newsletter.id).await, Err(AppError::BadRequest(_))));
        assert!(service.repos.registry.find_by_newsletter(newsletter.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reschedule_replaces_task() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store);
        let newsletter = newsletter(&store, Duration::days(7)).await;

        let first = service.start(newsletter.id).await.unwrap();
        let second = service.reschedule(newsletter.id).await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(service.find(newsletter.id).await.unwrap().status, NewsletterStatus::Started);
        assert_eq!(store.schedule_count().await, 1);
    }

    #[tokio::test]
    async fn test_deactivate_stops_task() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store);
        let newsletter = newsletter(&store, Duration::days(7)).await;
        service.start(newsletter.id).await.unwrap();

        let deactivated = service.deactivate(newsletter.id).await.unwrap();

        assert!(!deactivated.is_active);
        assert_eq!(deactivated.status, NewsletterStatus::Finished);
        assert!(service.repos.registry.find_by_newsletter(newsletter.id).await.unwrap().is_none());
        assert!(matches!(service.start(newsletter.id).await, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_logs_rejects_bad_limit() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store);
        let newsletter = newsletter(&store, Duration::days(7)).await;

        assert!(matches!(service.logs(newsletter.id, 0).await, Err(AppError::BadRequest(_))));
        assert!(service.logs(newsletter.id, 10).await.unwrap().is_empty());
        assert!(matches!(service.logs(newsletter.id + 100, 10).await, Err(AppError::NotFound)));
    }
}
