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

use newsletter_server::api::MgmtState;
use newsletter_server::config::Config;
use newsletter_server::services::Repositories;
use newsletter_server::{App, adapters, telemetry};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::Instrument;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    let telemetry_guard = telemetry::init_telemetry(&config.telemetry)?;

    let boot_span = tracing::info_span!("boot_server");
    let (mgmt_listener, mgmt_app, shutdown_tx, shutdown_rx, workers) = async {
        // Phase 1: Infrastructure
        let pool = adapters::database::init_pool(&config.database).await?;
        newsletter_server::run_migrations(&pool).await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        newsletter_server::spawn_signal_handler(shutdown_tx.clone());

        let mailer = Arc::new(adapters::mail::SmtpMailTransport::new(&config.mail)?);

        // Phase 2: Wiring
        let app = App::build(&config, Repositories::postgres(&pool), mailer, Some(pool));
        let mgmt_app = newsletter_server::api::mgmt_router(MgmtState {
            health_service: app.health_service,
            newsletter_service: app.newsletter_service,
        });

        // Phase 3: Listener
        let mgmt_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.mgmt_port).parse()?;
        tracing::info!(address = %mgmt_addr, "management server listening");
        let mgmt_listener = tokio::net::TcpListener::bind(mgmt_addr).await?;

        Ok::<_, anyhow::Error>((mgmt_listener, mgmt_app, shutdown_tx, shutdown_rx, app.workers))
    }
    .instrument(boot_span)
    .await?;

    // Phase 4: Run
    let worker_tasks = workers.spawn_all(shutdown_rx.clone());

    let mut mgmt_rx = shutdown_rx.clone();
    let mgmt_server = axum::serve(mgmt_listener, mgmt_app).with_graceful_shutdown(async move {
        let _ = mgmt_rx.wait_for(|&s| s).await;
    });

    if let Err(e) = mgmt_server.await {
        tracing::error!(error = %e, "Server error");
    }

    // Phase 5: Graceful shutdown, in-flight delivery passes are given a bounded grace period
    let _ = shutdown_tx.send(true);
    tokio::select! {
        () = async {
            futures::future::join_all(worker_tasks).await;
        } => {
            tracing::info!("Background tasks finished.");
        }
        () = tokio::time::sleep(std::time::Duration::from_secs(config.server.shutdown_timeout_secs)) => {
            tracing::warn!("Timeout waiting for background tasks to finish.");
        }
    }

    telemetry_guard.shutdown();
    Ok(())
}
