#![allow(clippy::unwrap_used, clippy::panic, clippy::todo, clippy::missing_panics_doc, clippy::must_use_candidate, missing_debug_implementations, clippy::clone_on_ref_ptr, unreachable_pub)]
use async_trait::async_trait;
use newsletter_server::adapters::memory::MemoryStore;
use newsletter_server::config::{DeliveryConfig, SchedulerConfig};
use newsletter_server::domain::delivery_log::{DeliveryLog, NewDeliveryLog};
use newsletter_server::domain::newsletter::Frequency;
use newsletter_server::error::{AppError, Result};
use newsletter_server::services::delivery_service::NewsletterDeliveryService;
use newsletter_server::services::ports::{DeliveryLogRepository, NewsletterRepository, PeriodicTaskRegistry};
use newsletter_server::workers::SchedulerWorker;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use time::macros::time;
use time::{Duration, OffsetDateTime};
mod common;

/// Log repository whose first append fails.
#[derive(Debug)]
struct FlakyLogs {
    store: Arc<MemoryStore>,
    failed: AtomicBool,
}

#[async_trait]
impl DeliveryLogRepository for FlakyLogs {
    async fn append(&self, entry: NewDeliveryLog) -> Result<bool> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(AppError::Internal);
        }
        self.store.append(entry).await
    }

    async fn recorded_pairs(&self, newsletter_id: i64, fire_at: OffsetDateTime) -> Result<HashSet<(i64, i64)>> {
        self.store.recorded_pairs(newsletter_id, fire_at).await
    }

    async fn list_for_newsletter(&self, newsletter_id: i64, limit: i64) -> Result<Vec<DeliveryLog>> {
        self.store.list_for_newsletter(newsletter_id, limit).await
    }
}

#[tokio::test]
async fn test_beat_fires_each_slot_once() {
    let app = common::TestApp::new();
    let a = app.client("a@example.com").await;
    let m = app.message("Daily digest").await;
    let newsletter = app.newsletter(Frequency::Daily, time!(09:00), Duration::days(30), vec![a], vec![m]).await;
    app.newsletters.start(newsletter.id).await.unwrap();

    let now = OffsetDateTime::now_utc();
    assert_eq!(app.scheduler.tick(now).await.unwrap(), 0);

    let later = now + Duration::days(2);
    assert_eq!(app.scheduler.tick(later).await.unwrap(), 1);
    assert_eq!(app.scheduler.tick(later).await.unwrap(), 0);

    let logs = app.store.all_logs().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].fire_at.time(), time!(09:00));
    assert!(logs[0].fire_at <= later);

    let task = app.repos.registry.find_by_newsletter(newsletter.id).await.unwrap().unwrap();
    assert_eq!(task.last_run_at, Some(logs[0].fire_at));

    assert_eq!(app.scheduler.tick(later + Duration::DAY).await.unwrap(), 1);
    assert_eq!(app.store.all_logs().await.len(), 2);
}

#[tokio::test]
async fn test_beat_skips_stopped_newsletters() {
    let app = common::TestApp::new();
    let a = app.client("a@example.com").await;
    let m = app.message("Weekly").await;
    let newsletter = app.newsletter(Frequency::Weekly, time!(07:00), Duration::days(60), vec![a], vec![m]).await;
    app.newsletters.start(newsletter.id).await.unwrap();
    app.newsletters.deactivate(newsletter.id).await.unwrap();

    assert_eq!(app.scheduler.tick(OffsetDateTime::now_utc() + Duration::days(14)).await.unwrap(), 0);
    assert!(app.mailer.sent().await.is_empty());
}

#[tokio::test]
async fn test_beat_deregisters_deleted_newsletter() {
    let app = common::TestApp::new();
    let a = app.client("a@example.com").await;
    let m = app.message("Short lived").await;
    let newsletter = app.newsletter(Frequency::Daily, time!(09:00), Duration::days(3), vec![a], vec![m]).await;
    app.newsletters.start(newsletter.id).await.unwrap();

    // The task row has no foreign key, so it outlives the newsletter.
    app.repos.newsletters.delete(newsletter.id).await.unwrap();

    assert_eq!(app.scheduler.tick(OffsetDateTime::now_utc() + Duration::days(2)).await.unwrap(), 1);
    assert!(app.repos.registry.list_scheduled().await.unwrap().is_empty());
    assert!(app.mailer.sent().await.is_empty());
}

#[tokio::test]
async fn test_failed_log_write_is_retried_next_tick() {
    let app = common::TestApp::new();
    let a = app.client("a@example.com").await;
    let b = app.client("b@example.com").await;
    let m = app.message("Daily digest").await;
    let newsletter = app.newsletter(Frequency::Daily, time!(09:00), Duration::days(30), vec![a, b], vec![m]).await;
    app.newsletters.start(newsletter.id).await.unwrap();

    let mut repos = app.repos.clone();
    repos.logs = Arc::new(FlakyLogs { store: app.store.clone(), failed: AtomicBool::new(false) });
    let delivery = NewsletterDeliveryService::new(repos.clone(), app.mailer.clone(), DeliveryConfig::default());
    let scheduler = SchedulerWorker::new(repos.registry.clone(), delivery, &SchedulerConfig::default());

    let later = OffsetDateTime::now_utc() + Duration::days(2);
    assert_eq!(scheduler.tick(later).await.unwrap(), 1);
    assert_eq!(app.store.all_logs().await.len(), 1);
    // The firing was handed back, so the task still points at the slot before it.
    let task = app.repos.registry.find_by_newsletter(newsletter.id).await.unwrap().unwrap();
    assert_eq!(task.last_run_at, None);

    assert_eq!(scheduler.tick(later).await.unwrap(), 1);

    let logs = app.store.all_logs().await;
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].fire_at, logs[1].fire_at);
    let clients: HashSet<i64> = logs.iter().map(|log| log.client_id).collect();
    assert_eq!(clients, HashSet::from([a, b]));
    // Only the pair whose log write failed is mailed again.
    assert_eq!(app.mailer.sent().await.len(), 3);

    let task = app.repos.registry.find_by_newsletter(newsletter.id).await.unwrap().unwrap();
    assert_eq!(task.last_run_at, Some(logs[0].fire_at));
}
