use crate::adapters::database::DbPool;
use crate::services::ports::MailTransport;
use opentelemetry::{KeyValue, global, metrics::Gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const CHECK_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
struct Metrics {
    status: Gauge<i64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("newsletter-server");
        Self {
            status: meter
                .i64_gauge("newsletter_health_status")
                .with_description("Status of health checks (1 for ok, 0 for error)")
                .build(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HealthService {
    pool: Option<DbPool>,
    mailer: Arc<dyn MailTransport>,
    metrics: Metrics,
}

impl HealthService {
    /// `pool` is `None` when running on in-memory storage.
    #[must_use]
    pub fn new(pool: Option<DbPool>, mailer: Arc<dyn MailTransport>) -> Self {
        Self { pool, mailer, metrics: Metrics::new() }
    }

    /// Checks database connectivity.
    ///
    /// # Errors
    /// Returns a string describing the failure if the database is unreachable.
    pub async fn check_db(&self) -> Result<(), String> {
        let Some(pool) = &self.pool else {
            return Ok(());
        };

        let result = match timeout(CHECK_TIMEOUT, sqlx::query("SELECT 1").execute(pool)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(format!("Database connection failed: {e:?}")),
            Err(_) => Err("Database connection timed out".to_string()),
        };
        self.record("database", result.is_ok());
        result
    }

    /// Checks that the mail relay answers.
    ///
    /// # Errors
    /// Returns a string describing the failure if the relay is unreachable.
    pub async fn check_mail(&self) -> Result<(), String> {
        let result = match timeout(CHECK_TIMEOUT, self.mailer.check()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("Mail relay check failed: {e}")),
            Err(_) => Err("Mail relay check timed out".to_string()),
        };
        self.record("mail", result.is_ok());
        result
    }

    fn record(&self, component: &'static str, ok: bool) {
        self.metrics.status.record(i64::from(ok), &[KeyValue::new("component", component)]);
    }
}
