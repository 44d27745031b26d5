use clap::{Args, Parser, ValueEnum};

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub database: DatabaseConfig,

    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub mail: MailConfig,

    #[command(flatten)]
    pub scheduler: SchedulerConfig,

    #[command(flatten)]
    pub delivery: DeliveryConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}

#[derive(Clone, Debug, Args)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[arg(long = "database-url", env = "NEWSLETTER_DATABASE_URL")]
    pub url: String,

    /// Maximum number of pooled connections
    #[arg(long = "db-max-connections", env = "NEWSLETTER_DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub max_connections: u32,

    /// Minimum number of idle connections kept open
    #[arg(long = "db-min-connections", env = "NEWSLETTER_DB_MIN_CONNECTIONS", default_value_t = 1)]
    pub min_connections: u32,

    /// Seconds to wait for a free connection
    #[arg(long = "db-acquire-timeout-secs", env = "NEWSLETTER_DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 5)]
    pub acquire_timeout_secs: u64,

    /// Seconds before an idle connection is closed
    #[arg(long = "db-idle-timeout-secs", env = "NEWSLETTER_DB_IDLE_TIMEOUT_SECS", default_value_t = 600)]
    pub idle_timeout_secs: u64,

    /// Maximum lifetime of a connection in seconds
    #[arg(long = "db-max-lifetime-secs", env = "NEWSLETTER_DB_MAX_LIFETIME_SECS", default_value_t = 1800)]
    pub max_lifetime_secs: u64,

    /// Upper bound for the startup connection backoff
    #[arg(long = "db-connect-max-backoff-secs", env = "NEWSLETTER_DB_CONNECT_MAX_BACKOFF_SECS", default_value_t = 30)]
    pub connect_max_backoff_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "NEWSLETTER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the management API (health probes and newsletter operations)
    #[arg(long, env = "NEWSLETTER_MGMT_PORT", default_value_t = 9090)]
    pub mgmt_port: u16,

    /// Seconds to wait for in-flight delivery passes on shutdown
    #[arg(long, env = "NEWSLETTER_SHUTDOWN_TIMEOUT_SECS", default_value_t = 30)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct MailConfig {
    /// SMTP relay host
    #[arg(long = "smtp-host", env = "NEWSLETTER_SMTP_HOST", default_value = "localhost")]
    pub smtp_host: String,

    /// SMTP port
    #[arg(long = "smtp-port", env = "NEWSLETTER_SMTP_PORT", default_value_t = 587)]
    pub smtp_port: u16,

    /// SMTP username
    #[arg(long = "smtp-username", env = "NEWSLETTER_SMTP_USERNAME")]
    pub username: Option<String>,

    /// SMTP password
    #[arg(long = "smtp-password", env = "NEWSLETTER_SMTP_PASSWORD")]
    pub password: Option<String>,

    /// Use STARTTLS (disable for local relays such as MailHog)
    #[arg(long = "smtp-starttls", env = "NEWSLETTER_SMTP_STARTTLS", default_value_t = true, action = clap::ArgAction::Set)]
    pub starttls: bool,

    /// Sender address for every newsletter email
    #[arg(long = "mail-from", env = "NEWSLETTER_MAIL_FROM")]
    pub from: String,

    /// Timeout for a single SMTP send
    #[arg(long = "smtp-timeout-secs", env = "NEWSLETTER_SMTP_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct SchedulerConfig {
    /// How often the scheduler looks for due newsletters
    #[arg(long = "scheduler-tick-secs", env = "NEWSLETTER_SCHEDULER_TICK_SECS", default_value_t = 30)]
    pub tick_interval_secs: u64,

    /// Maximum number of delivery passes running at once
    #[arg(long = "scheduler-max-concurrent-passes", env = "NEWSLETTER_SCHEDULER_MAX_CONCURRENT_PASSES", default_value_t = 4)]
    pub max_concurrent_passes: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_interval_secs: 30, max_concurrent_passes: 4 }
    }
}

#[derive(Clone, Debug, Default, Args)]
pub struct DeliveryConfig {
    /// Skip clients marked inactive when sending
    #[arg(long = "skip-inactive-clients", env = "NEWSLETTER_SKIP_INACTIVE_CLIENTS", default_value_t = false)]
    pub skip_inactive_clients: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Default, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long, env = "NEWSLETTER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP collector endpoint; traces and metrics are exported when set
    #[arg(long, env = "NEWSLETTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}
