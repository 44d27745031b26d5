#![allow(clippy::unwrap_used, clippy::panic, clippy::todo, clippy::missing_panics_doc, clippy::must_use_candidate, missing_debug_implementations, clippy::clone_on_ref_ptr, unreachable_pub)]
use newsletter_server::config::DeliveryConfig;
use newsletter_server::domain::delivery_log::{DELIVERED_RESPONSE, DeliveryStatus};
use newsletter_server::domain::newsletter::{Frequency, NewNewsletter, NewsletterStatus};
use newsletter_server::error::AppError;
use newsletter_server::services::delivery_service::DeliveryPass;
use newsletter_server::services::ports::{ClientRepository, NewsletterRepository, PeriodicTaskRegistry};
use time::Duration;
use time::macros::{date, datetime, time};
mod common;

#[tokio::test]
async fn test_daily_newsletter_delivers_to_every_client() {
    let app = common::TestApp::new();
    let a = app.client("a@example.com").await;
    let b = app.client("b@example.com").await;
    let m = app.message("Hello").await;
    let newsletter = app.newsletter(Frequency::Daily, time!(09:00), Duration::days(30), vec![a, b], vec![m]).await;

    let task = app.delivery.create_task(&newsletter).await.unwrap();
    let scheduled = app.repos.registry.list_scheduled().await.unwrap();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].task.id, task.id);
    assert_eq!(scheduled[0].spec.to_string(), "0 9 * * *");

    let pass = app.delivery.send_newsletter(newsletter.id).await.unwrap();
    assert_eq!(pass, DeliveryPass::Completed { delivered: 2, failed: 0, skipped: 0 });

    let logs = app.store.all_logs().await;
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().all(|log| log.status == DeliveryStatus::Success && log.server_response == DELIVERED_RESPONSE));

    let sent = app.mailer.sent().await;
    let recipients: Vec<_> = sent.iter().map(|email| email.to.as_str()).collect();
    assert_eq!(recipients, vec!["a@example.com", "b@example.com"]);
    assert!(sent.iter().all(|email| email.subject == "Hello" && email.body == "Body of Hello"));
}

#[tokio::test]
async fn test_every_pair_is_logged_despite_failures() {
    let app = common::TestApp::new();
    let clients = vec![
        app.client("one@example.com").await,
        app.client("bounce@example.com").await,
        app.client("three@example.com").await,
    ];
    let messages = vec![app.message("First").await, app.message("Second").await];
    let newsletter =
        app.newsletter(Frequency::Weekly, time!(18:30), Duration::days(30), clients.clone(), messages.clone()).await;
    app.mailer.reject("bounce@example.com").await;

    let pass = app.delivery.send_newsletter(newsletter.id).await.unwrap();
    assert_eq!(pass, DeliveryPass::Completed { delivered: 4, failed: 2, skipped: 0 });

    let logs = app.store.all_logs().await;
    assert_eq!(logs.len(), clients.len() * messages.len());

    let failures: Vec<_> = logs.iter().filter(|log| log.status == DeliveryStatus::Failure).collect();
    assert_eq!(failures.len(), 2);
    assert!(failures.iter().all(|log| log.client_id == clients[1]));
    assert!(failures.iter().all(|log| log.server_response.contains("550 mailbox unavailable")));

    // The client after the failing one still received both messages.
    let third = logs.iter().filter(|log| log.client_id == clients[2] && log.status == DeliveryStatus::Success);
    assert_eq!(third.count(), 2);
}

#[tokio::test]
async fn test_expired_newsletter_is_finished_without_sending() {
    let app = common::TestApp::new();
    let a = app.client("a@example.com").await;
    let m = app.message("Late").await;
    let newsletter = app.newsletter(Frequency::Daily, time!(09:00), -Duration::days(1), vec![a], vec![m]).await;
    app.delivery.create_task(&newsletter).await.unwrap();

    let pass = app.delivery.send_newsletter(newsletter.id).await.unwrap();

    assert_eq!(pass, DeliveryPass::Expired);
    assert!(app.store.all_logs().await.is_empty());
    assert!(app.mailer.sent().await.is_empty());
    assert!(app.repos.registry.find_by_newsletter(newsletter.id).await.unwrap().is_none());
    assert_eq!(app.get_newsletter(newsletter.id).await.unwrap().status, NewsletterStatus::Finished);
}

#[tokio::test]
async fn test_repeated_firing_does_not_resend() {
    let app = common::TestApp::new();
    let a = app.client("a@example.com").await;
    let b = app.client("b@example.com").await;
    let m = app.message("Once").await;
    let newsletter = app.newsletter(Frequency::Daily, time!(09:00), Duration::days(30), vec![a, b], vec![m]).await;
    let fire_at = datetime!(2026-03-04 09:00 UTC);

    let first = app.delivery.send_newsletter_at(newsletter.id, fire_at).await.unwrap();
    let second = app.delivery.send_newsletter_at(newsletter.id, fire_at).await.unwrap();

    assert_eq!(first, DeliveryPass::Completed { delivered: 2, failed: 0, skipped: 0 });
    assert_eq!(second, DeliveryPass::Completed { delivered: 0, failed: 0, skipped: 2 });
    assert_eq!(app.store.all_logs().await.len(), 2);
    assert_eq!(app.mailer.sent().await.len(), 2);

    let next_day = app.delivery.send_newsletter_at(newsletter.id, fire_at + Duration::DAY).await.unwrap();
    assert_eq!(next_day, DeliveryPass::Completed { delivered: 2, failed: 0, skipped: 0 });
    assert_eq!(app.store.all_logs().await.len(), 4);
}

#[tokio::test]
async fn test_missing_newsletter_deregisters_task() {
    let app = common::TestApp::new();
    let newsletter = app.newsletter(Frequency::Monthly, time!(12:00), Duration::days(90), vec![], vec![]).await;
    app.delivery.create_task(&newsletter).await.unwrap();

    // The task row has no foreign key, so it outlives the newsletter.
    app.repos.newsletters.delete(newsletter.id).await.unwrap();

    let pass = app.delivery.send_newsletter(newsletter.id).await.unwrap();

    assert_eq!(pass, DeliveryPass::Missing);
    assert!(app.repos.registry.find_by_newsletter(newsletter.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_incomplete_finish_sends_nothing() {
    let app = common::TestApp::new();
    let a = app.client("a@example.com").await;
    let m = app.message("Unsafe").await;
    let newsletter = app
        .repos
        .newsletters
        .create(NewNewsletter {
            frequency: Frequency::Daily,
            time: time!(09:00),
            finish_date: Some(date!(2099-01-01)),
            finish_time: None,
            client_ids: vec![a],
            message_ids: vec![m],
        })
        .await
        .unwrap();
    app.delivery.create_task(&newsletter).await.unwrap();

    let result = app.delivery.send_newsletter(newsletter.id).await;

    assert!(matches!(result, Err(AppError::InvalidSchedule(_))));
    assert!(app.mailer.sent().await.is_empty());
    assert!(app.store.all_logs().await.is_empty());
    assert!(app.repos.registry.find_by_newsletter(newsletter.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_task_without_task_is_noop() {
    let app = common::TestApp::new();
    let mut newsletter = app.newsletter(Frequency::Daily, time!(09:00), Duration::days(30), vec![], vec![]).await;

    assert!(!app.delivery.delete_task(&mut newsletter).await.unwrap());
    assert_eq!(app.get_newsletter(newsletter.id).await.unwrap().status, NewsletterStatus::Created);
}

#[tokio::test]
async fn test_inactive_clients_skipped_when_configured() {
    let mut config = common::get_test_config();
    config.delivery = DeliveryConfig { skip_inactive_clients: true };
    let app = common::TestApp::with_config(&config);
    let active = app.client("active@example.com").await;
    let inactive = app.client("inactive@example.com").await;
    let m = app.message("News").await;
    let newsletter =
        app.newsletter(Frequency::Daily, time!(09:00), Duration::days(30), vec![active, inactive], vec![m]).await;
    app.repos.clients.set_active(inactive, false).await.unwrap();

    let pass = app.delivery.send_newsletter(newsletter.id).await.unwrap();

    assert_eq!(pass, DeliveryPass::Completed { delivered: 1, failed: 0, skipped: 0 });
    assert_eq!(app.mailer.sent().await[0].to, "active@example.com");

    // Default configuration still mails everyone linked to the newsletter.
    let all = common::TestApp::new();
    let a = all.client("a@example.com").await;
    let b = all.client("b@example.com").await;
    let m = all.message("News").await;
    let other = all.newsletter(Frequency::Daily, time!(09:00), Duration::days(30), vec![a, b], vec![m]).await;
    all.repos.clients.set_active(b, false).await.unwrap();
    let pass = all.delivery.send_newsletter(other.id).await.unwrap();
    assert_eq!(pass, DeliveryPass::Completed { delivered: 2, failed: 0, skipped: 0 });
}
