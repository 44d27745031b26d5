pub mod client_repo;
pub mod delivery_log_repo;
pub mod message_repo;
pub mod newsletter_repo;
pub mod periodic_task_repo;
pub mod records;

use crate::config::DatabaseConfig;
use backon::{ExponentialBuilder, Retryable};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;

pub use client_repo::PgClientRepository;
pub use delivery_log_repo::PgDeliveryLogRepository;
pub use message_repo::PgMessageRepository;
pub use newsletter_repo::PgNewsletterRepository;
pub use periodic_task_repo::PgPeriodicTaskRegistry;

pub type DbPool = Pool<Postgres>;

const CONNECT_ATTEMPTS: usize = 8;

/// Initializes the database connection pool, retrying with exponential backoff while
/// the database comes up.
///
/// # Errors
/// Returns `sqlx::Error` if the connection still fails after the retries.
pub async fn init_pool(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let retry_strategy = ExponentialBuilder::default()
        .with_max_delay(Duration::from_secs(config.connect_max_backoff_secs))
        .with_max_times(CONNECT_ATTEMPTS);

    (|| async {
        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .connect(&config.url)
            .await
    })
    .retry(&retry_strategy)
    .notify(|e, duration| {
        tracing::warn!(error = %e, retry_in = ?duration, "Database connection failed, retrying...");
    })
    .await
}
