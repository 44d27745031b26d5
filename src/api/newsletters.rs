use crate::api::MgmtState;
use crate::api::dto::newsletter::{
    ClientResponse, DeliveryLogDto, LogsQuery, NewsletterResponse, PassResponse, TaskResponse,
};
use crate::error::Result;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

const DEFAULT_LOG_LIMIT: i64 = 100;

pub async fn start(State(state): State<MgmtState>, Path(id): Path<i64>) -> Result<impl IntoResponse> {
    let task = state.newsletter_service.start(id).await?;
    Ok((StatusCode::CREATED, Json(TaskResponse::from(task))))
}

pub async fn reschedule(State(state): State<MgmtState>, Path(id): Path<i64>) -> Result<impl IntoResponse> {
    let task = state.newsletter_service.reschedule(id).await?;
    Ok(Json(TaskResponse::from(task)))
}

pub async fn remove(State(state): State<MgmtState>, Path(id): Path<i64>) -> Result<impl IntoResponse> {
    state.newsletter_service.remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn deactivate(State(state): State<MgmtState>, Path(id): Path<i64>) -> Result<impl IntoResponse> {
    let newsletter = state.newsletter_service.deactivate(id).await?;
    Ok(Json(NewsletterResponse::from(newsletter)))
}

/// Runs a delivery pass immediately.
pub async fn dispatch(State(state): State<MgmtState>, Path(id): Path<i64>) -> Result<impl IntoResponse> {
    let pass = state.newsletter_service.dispatch(id).await?;
    Ok(Json(PassResponse::from(pass)))
}

pub async fn logs(
    State(state): State<MgmtState>,
    Path(id): Path<i64>,
    Query(query): Query<LogsQuery>,
) -> Result<impl IntoResponse> {
    let logs = state.newsletter_service.logs(id, query.limit.unwrap_or(DEFAULT_LOG_LIMIT)).await?;
    Ok(Json(logs.into_iter().map(DeliveryLogDto::from).collect::<Vec<_>>()))
}

pub async fn deactivate_client(State(state): State<MgmtState>, Path(id): Path<i64>) -> Result<impl IntoResponse> {
    let client = state.newsletter_service.deactivate_client(id).await?;
    Ok(Json(ClientResponse::from(client)))
}
