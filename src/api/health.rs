use crate::api::MgmtState;
use crate::api::dto::health::HealthResponse;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

/// Liveness probe: returns 200 OK as long as the server is running.
pub async fn livez() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe: checks the database and the mail relay.
pub async fn readyz(State(state): State<MgmtState>) -> impl IntoResponse {
    let (db_res, mail_res) = tokio::join!(state.health_service.check_db(), state.health_service.check_mail());

    let mut status_code = StatusCode::OK;
    let db_status = if let Err(e) = db_res {
        tracing::warn!(error = %e, component = "database", "Readiness probe failed");
        status_code = StatusCode::SERVICE_UNAVAILABLE;
        "error"
    } else {
        "ok"
    };

    let mail_status = if let Err(e) = mail_res {
        tracing::warn!(error = %e, component = "mail", "Readiness probe failed");
        status_code = StatusCode::SERVICE_UNAVAILABLE;
        "error"
    } else {
        "ok"
    };

    let response = HealthResponse {
        status: if status_code == StatusCode::OK { "ok" } else { "error" }.to_string(),
        database: db_status.to_string(),
        mail: mail_status.to_string(),
    };

    (status_code, Json(response))
}
