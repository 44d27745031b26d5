#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;
pub mod workers;

use crate::adapters::database::DbPool;
use crate::config::Config;
use crate::services::Repositories;
use crate::services::delivery_service::NewsletterDeliveryService;
use crate::services::health_service::HealthService;
use crate::services::newsletter_service::NewsletterService;
use crate::services::ports::MailTransport;
use crate::workers::SchedulerWorker;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Applies the pending schema migrations.
///
/// # Errors
/// Returns an error if a migration fails.
pub async fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    sqlx::migrate!().run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Flips the shutdown channel on SIGINT or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        #[cfg(unix)]
        let terminate = async {
            if let Ok(mut signal) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                signal.recv().await;
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {}
            () = terminate => {}
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });
}

/// Background loops started once the server is listening.
#[derive(Debug)]
pub struct Workers {
    pub scheduler: SchedulerWorker,
}

impl Workers {
    #[must_use]
    pub fn spawn_all(self, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![tokio::spawn(self.scheduler.run(shutdown_rx).instrument(tracing::info_span!("scheduler_worker")))]
    }
}

/// Fully wired services and workers.
#[derive(Debug)]
pub struct App {
    pub newsletter_service: NewsletterService,
    pub health_service: HealthService,
    pub workers: Workers,
}

impl App {
    /// Wires services over the given storage and mail transport. `pool` is only used
    /// for readiness checks.
    #[must_use]
    pub fn build(config: &Config, repos: Repositories, mailer: Arc<dyn MailTransport>, pool: Option<DbPool>) -> Self {
        let delivery = NewsletterDeliveryService::new(repos.clone(), Arc::clone(&mailer), config.delivery.clone());
        let scheduler = SchedulerWorker::new(Arc::clone(&repos.registry), delivery.clone(), &config.scheduler);

        Self {
            newsletter_service: NewsletterService::new(repos, delivery),
            health_service: HealthService::new(pool, mailer),
            workers: Workers { scheduler },
        }
    }
}
