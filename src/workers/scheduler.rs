use crate::config::SchedulerConfig;
use crate::error::AppError;
use crate::services::delivery_service::NewsletterDeliveryService;
use crate::services::ports::PeriodicTaskRegistry;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

#[derive(Clone, Debug)]
struct Metrics {
    firings: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("newsletter-server");
        Self {
            firings: meter
                .u64_counter("newsletter_scheduler_firings_total")
                .with_description("Periodic task firings claimed by this scheduler")
                .build(),
        }
    }
}

/// Fires the delivery pass of every periodic task whose recurrence slot has passed.
#[derive(Debug)]
pub struct SchedulerWorker {
    registry: Arc<dyn PeriodicTaskRegistry>,
    delivery: NewsletterDeliveryService,
    interval_secs: u64,
    semaphore: Arc<Semaphore>,
    metrics: Metrics,
}

impl SchedulerWorker {
    #[must_use]
    pub fn new(
        registry: Arc<dyn PeriodicTaskRegistry>,
        delivery: NewsletterDeliveryService,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            registry,
            delivery,
            interval_secs: config.tick_interval_secs,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_passes)),
            metrics: Metrics::new(),
        }
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        let mut passes = JoinSet::new();

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    while passes.try_join_next().is_some() {}

                    if let Err(e) = self.fire_due(OffsetDateTime::now_utc(), &mut passes)
                        .instrument(tracing::info_span!("scheduler_iteration"))
                        .await
                    {
                        tracing::error!(error = %e, "Scheduler iteration failed");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!(in_flight = passes.len(), "Scheduler shutting down, waiting for delivery passes...");
        while passes.join_next().await.is_some() {}
    }

    /// Fires everything due at `now` and waits for the passes to finish.
    /// Returns the number of firings claimed.
    ///
    /// # Errors
    /// Returns an error if the registry cannot be read.
    pub async fn tick(&self, now: OffsetDateTime) -> anyhow::Result<usize> {
        let mut passes = JoinSet::new();
        let fired = self.fire_due(now, &mut passes).await?;
        while passes.join_next().await.is_some() {}
        Ok(fired)
    }

    #[tracing::instrument(level = "debug", skip(self, passes), err, fields(fired = tracing::field::Empty))]
    async fn fire_due(&self, now: OffsetDateTime, passes: &mut JoinSet<()>) -> anyhow::Result<usize> {
        let tasks = self.registry.list_scheduled().await?;
        let mut fired = 0;

        for scheduled in tasks {
            let task = &scheduled.task;
            let due = match scheduled.due_at(now) {
                Ok(Some(due)) => due,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(task_id = task.id, error = %e, "Cannot evaluate task recurrence");
                    continue;
                }
            };

            // Unclaimed firings stay due and are picked up on a later tick.
            let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
                tracing::debug!("All delivery slots busy, deferring remaining firings");
                break;
            };

            if !self.registry.claim_run(task.id, task.last_run_at, due).await? {
                tracing::debug!(task_id = task.id, "Firing already claimed elsewhere");
                continue;
            }

            fired += 1;
            self.metrics.firings.add(1, &[KeyValue::new("task", task.name.clone())]);

            let delivery = self.delivery.clone();
            let registry = Arc::clone(&self.registry);
            let (task_id, newsletter_id, previous) = (task.id, task.newsletter_id, task.last_run_at);
            passes.spawn(
                async move {
                    let _permit = permit;
                    match delivery.send_newsletter_at(newsletter_id, due).await {
                        Ok(_) => {}
                        // Retrying cannot fix an incomplete finish instant; the slot stays consumed.
                        Err(e @ AppError::InvalidSchedule(_)) => {
                            tracing::error!(error = %e, "Delivery pass rejected");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Delivery pass failed, releasing firing for retry");
                            match registry.release_run(task_id, due, previous).await {
                                Ok(true) => {}
                                Ok(false) => tracing::warn!("Firing was already moved on, not released"),
                                Err(e) => tracing::error!(error = %e, "Failed to release firing"),
                            }
                        }
                    }
                }
                .instrument(tracing::info_span!("delivery_pass", newsletter_id, fire_at = %due)),
            );
        }

        if fired > 0 {
            tracing::info!(fired, "Fired due periodic tasks");
            tracing::Span::current().record("fired", fired);
        }
        Ok(fired)
    }
}
