use crate::config::DeliveryConfig;
use crate::domain::delivery_log::NewDeliveryLog;
use crate::domain::newsletter::{Newsletter, NewsletterStatus};
use crate::domain::schedule::{CrontabSchedule, PeriodicTask, RecurrenceSpec};
use crate::error::{AppError, Result};
use crate::services::Repositories;
use crate::services::ports::{MailTransport, OutgoingEmail};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

#[derive(Clone, Debug)]
struct Metrics {
    deliveries: Counter<u64>,
    passes: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("newsletter-server");
        Self {
            deliveries: meter
                .u64_counter("newsletter_deliveries_total")
                .with_description("Send attempts by outcome")
                .build(),
            passes: meter
                .u64_counter("newsletter_passes_total")
                .with_description("Delivery passes by outcome")
                .build(),
        }
    }
}

/// Result of one delivery pass. The delivery log stays the record of each attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPass {
    Completed { delivered: usize, failed: usize, skipped: usize },
    /// The finish time has passed; the periodic task was removed and nothing was sent.
    Expired,
    /// The newsletter was deleted after it was scheduled.
    Missing,
    /// Another pass for the same newsletter is still running in this process.
    AlreadyRunning,
}

impl DeliveryPass {
    const fn outcome(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Expired => "expired",
            Self::Missing => "missing",
            Self::AlreadyRunning => "already_running",
        }
    }
}

/// Removes the in-flight marker when a pass ends, including on early return.
struct PassGuard {
    in_flight: Arc<DashMap<i64, ()>>,
    newsletter_id: i64,
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.newsletter_id);
    }
}

#[derive(Clone, Debug)]
pub struct NewsletterDeliveryService {
    repos: Repositories,
    mailer: Arc<dyn MailTransport>,
    config: DeliveryConfig,
    in_flight: Arc<DashMap<i64, ()>>,
    metrics: Metrics,
}

impl NewsletterDeliveryService {
    #[must_use]
    pub fn new(repos: Repositories, mailer: Arc<dyn MailTransport>, config: DeliveryConfig) -> Self {
        Self { repos, mailer, config, in_flight: Arc::new(DashMap::new()), metrics: Metrics::new() }
    }

    /// Looks up or creates the crontab schedule matching the newsletter's frequency and time.
    ///
    /// # Errors
    /// Returns an error if the registry cannot be reached.
    #[tracing::instrument(level = "debug", skip(self, newsletter), fields(newsletter_id = newsletter.id))]
    pub async fn build_schedule(&self, newsletter: &Newsletter) -> Result<CrontabSchedule> {
        let spec = RecurrenceSpec::for_newsletter(newsletter);
        self.repos.registry.schedule_or_get(spec).await
    }

    /// Registers the periodic task that fires delivery passes for the newsletter.
    ///
    /// # Errors
    /// Returns `AppError::Conflict` if a task with the newsletter's name already exists.
    #[tracing::instrument(skip(self, newsletter), fields(newsletter_id = newsletter.id), err(level = "warn"))]
    pub async fn create_task(&self, newsletter: &Newsletter) -> Result<PeriodicTask> {
        let schedule = self.build_schedule(newsletter).await?;
        let task = self.repos.registry.register(&newsletter.to_string(), schedule.id, newsletter.id).await?;

        tracing::info!(task_id = task.id, schedule = %schedule.spec, "Periodic task registered");
        Ok(task)
    }

    /// Removes the newsletter's periodic task and marks the newsletter finished.
    /// Returns `false` when no task was registered.
    ///
    /// # Errors
    /// Returns an error if the registry or the newsletter store fails.
    #[tracing::instrument(skip(self, newsletter), fields(newsletter_id = newsletter.id))]
    pub async fn delete_task(&self, newsletter: &mut Newsletter) -> Result<bool> {
        let name = newsletter.to_string();
        let Some(task) = self.repos.registry.find_by_name(&name).await? else {
            tracing::warn!(task_name = %name, "No periodic task registered for newsletter");
            return Ok(false);
        };

        self.repos.registry.delete(task.id).await?;
        newsletter.status = NewsletterStatus::Finished;
        self.repos.newsletters.update_status(newsletter.id, NewsletterStatus::Finished).await?;

        tracing::info!(task_id = task.id, "Periodic task deleted");
        Ok(true)
    }

    /// Whether the newsletter's finish instant lies before `now`.
    ///
    /// # Errors
    /// Returns `AppError::InvalidSchedule` if the finish date or time is missing.
    pub fn is_expired(&self, newsletter: &Newsletter, now: OffsetDateTime) -> Result<bool> {
        let expired = newsletter.is_expired_at(now)?;
        tracing::debug!(%now, expired, "Checked newsletter expiry");
        if expired {
            tracing::info!("Newsletter finish time has passed");
        }
        Ok(expired)
    }

    /// Runs a delivery pass for the current minute.
    ///
    /// # Errors
    /// See [`Self::send_newsletter_at`].
    pub async fn send_newsletter(&self, newsletter_id: i64) -> Result<DeliveryPass> {
        let now = OffsetDateTime::now_utc();
        let fire_at =
            now - Duration::seconds(i64::from(now.second())) - Duration::nanoseconds(i64::from(now.nanosecond()));
        self.send_newsletter_at(newsletter_id, fire_at).await
    }

    /// Sends every message of the newsletter to every client and logs each attempt.
    ///
    /// Pairs already logged for `fire_at` are skipped, so a repeated firing never sends twice.
    /// A failed send is logged and does not stop the pass.
    ///
    /// # Errors
    /// Returns `AppError::InvalidSchedule` if the finish instant is incomplete (nothing is sent),
    /// a storage error if reading the newsletter fails, or `AppError::Internal` once every pair
    /// was attempted if some attempts could not be logged.
    #[tracing::instrument(skip(self), fields(fire_at = %fire_at), err(level = "warn"))]
    pub async fn send_newsletter_at(&self, newsletter_id: i64, fire_at: OffsetDateTime) -> Result<DeliveryPass> {
        let pass = self.run_pass(newsletter_id, fire_at).await?;
        self.metrics.passes.add(1, &[KeyValue::new("outcome", pass.outcome())]);
        Ok(pass)
    }

    async fn run_pass(&self, newsletter_id: i64, fire_at: OffsetDateTime) -> Result<DeliveryPass> {
        let Some(_guard) = self.try_begin(newsletter_id) else {
            tracing::warn!("Delivery pass already running, skipping firing");
            return Ok(DeliveryPass::AlreadyRunning);
        };

        let Some(mut newsletter) = self.repos.newsletters.get(newsletter_id).await? else {
            tracing::warn!("Newsletter no longer exists, removing its periodic task");
            if let Some(task) = self.repos.registry.find_by_newsletter(newsletter_id).await? {
                self.repos.registry.delete(task.id).await?;
            }
            return Ok(DeliveryPass::Missing);
        };

        if self.is_expired(&newsletter, OffsetDateTime::now_utc())? {
            self.delete_task(&mut newsletter).await?;
            return Ok(DeliveryPass::Expired);
        }

        let messages = self.repos.messages.list_for_newsletter(newsletter_id).await?;
        let mut clients = self.repos.clients.list_for_newsletter(newsletter_id).await?;
        if self.config.skip_inactive_clients {
            clients.retain(|client| client.is_active);
        }
        let already_logged = self.repos.logs.recorded_pairs(newsletter_id, fire_at).await?;

        tracing::info!(messages = messages.len(), clients = clients.len(), "Starting delivery pass");

        let (mut delivered, mut failed, mut skipped, mut unlogged) = (0, 0, 0, 0);
        for message in &messages {
            for client in &clients {
                if already_logged.contains(&(message.id, client.id)) {
                    skipped += 1;
                    continue;
                }

                let email = OutgoingEmail {
                    to: client.email.clone(),
                    subject: message.subject.clone(),
                    body: message.body.clone(),
                };

                let entry = match self.mailer.send(&email).await {
                    Ok(()) => {
                        tracing::debug!(message_id = message.id, client_id = client.id, "Email delivered");
                        self.metrics.deliveries.add(1, &[KeyValue::new("status", "success")]);
                        delivered += 1;
                        NewDeliveryLog::delivered(newsletter_id, message.id, client.id, fire_at)
                    }
                    Err(e) => {
                        tracing::error!(message_id = message.id, client_id = client.id, error = %e, "Email delivery failed");
                        self.metrics.deliveries.add(1, &[KeyValue::new("status", "failure")]);
                        failed += 1;
                        NewDeliveryLog::failed(newsletter_id, message.id, client.id, fire_at, e)
                    }
                };

                match self.repos.logs.append(entry).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::debug!(message_id = message.id, client_id = client.id, "Attempt already logged");
                    }
                    Err(e) => {
                        tracing::error!(message_id = message.id, client_id = client.id, error = %e, "Failed to log attempt");
                        unlogged += 1;
                    }
                }
            }
        }

        tracing::info!(delivered, failed, skipped, unlogged, "Delivery pass finished");
        if unlogged > 0 {
            // Unlogged pairs are not in `recorded_pairs`, so a retried firing attempts them again.
            return Err(AppError::Internal);
        }
        Ok(DeliveryPass::Completed { delivered, failed, skipped })
    }

    fn try_begin(&self, newsletter_id: i64) -> Option<PassGuard> {
        match self.in_flight.entry(newsletter_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(PassGuard { in_flight: Arc::clone(&self.in_flight), newsletter_id })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mail::MemoryMailTransport;
    use crate::adapters::memory::MemoryStore;
    use crate::domain::newsletter::{Frequency, NewNewsletter};
    use time::macros::time;

    async fn service_with_newsletter(finish_time: Option<time::Time>) -> (NewsletterDeliveryService, Newsletter) {
        let store = Arc::new(MemoryStore::new());
        let repos = Repositories::in_memory(&store);
        let newsletter = repos
            .newsletters
            .create(NewNewsletter {
                frequency: Frequency::Daily,
                time: time!(09:00),
                finish_date: Some((OffsetDateTime::now_utc() + Duration::days(30)).date()),
                finish_time,
                client_ids: vec![],
                message_ids: vec![],
            })
            .await
            .unwrap();
        let service =
            NewsletterDeliveryService::new(repos, Arc::new(MemoryMailTransport::new()), DeliveryConfig::default());
        (service, newsletter)
    }

    #[tokio::test]
    async fn test_overlapping_pass_is_skipped() {
        let (service, newsletter) = service_with_newsletter(Some(time!(00:00))).await;

        let guard = service.try_begin(newsletter.id);
        assert!(guard.is_some());

        let pass = service.send_newsletter(newsletter.id).await.unwrap();
        assert_eq!(pass, DeliveryPass::AlreadyRunning);

        drop(guard);
        let pass = service.send_newsletter(newsletter.id).await.unwrap();
        assert_eq!(pass, DeliveryPass::Completed { delivered: 0, failed: 0, skipped: 0 });
    }

    #[tokio::test]
    async fn test_guard_released_after_failed_pass() {
        let (service, newsletter) = service_with_newsletter(None).await;

        assert!(matches!(
            service.send_newsletter(newsletter.id).await,
            Err(AppError::InvalidSchedule(_))
        ));
        assert!(service.in_flight.is_empty());
    }
}
