use crate::services::health_service::HealthService;
use crate::services::newsletter_service::NewsletterService;
use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

pub mod dto;
pub mod health;
pub mod newsletters;

#[derive(Clone, Debug)]
pub struct MgmtState {
    pub health_service: HealthService,
    pub newsletter_service: NewsletterService,
}

/// Health probes and newsletter operations, served on the management port.
pub fn mgmt_router(state: MgmtState) -> Router {
    Router::new()
        .route("/livez", get(health::livez))
        .route("/readyz", get(health::readyz))
        .route("/newsletters/{id}", delete(newsletters::remove))
        .route("/newsletters/{id}/start", post(newsletters::start))
        .route("/newsletters/{id}/reschedule", post(newsletters::reschedule))
        .route("/newsletters/{id}/deactivate", post(newsletters::deactivate))
        .route("/newsletters/{id}/dispatch", post(newsletters::dispatch))
        .route("/newsletters/{id}/logs", get(newsletters::logs))
        .route("/clients/{id}/deactivate", post(newsletters::deactivate_client))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
