use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::query::IntakeQuery;
use super::service::{IntakeService, IntakeServiceError};
use super::state::WizardAction;
use super::storage::KeyValueStore;
use super::tracker::{TrackerClient, TrackerError};

/// Router exposing the catalog and the per-ticket intake sessions.
pub fn intake_router<S, T>(service: Arc<IntakeService<S, T>>) -> Router
where
    S: KeyValueStore + 'static,
    T: TrackerClient + 'static,
{
    Router::new()
        .route("/api/v1/catalog", get(catalog_handler::<S, T>))
        .route("/api/v1/intake", get(open_handler::<S, T>))
        .route("/api/v1/intake/:ticket", get(session_handler::<S, T>))
        .route(
            "/api/v1/intake/:ticket/actions",
            post(dispatch_handler::<S, T>),
        )
        .route(
            "/api/v1/intake/:ticket/comment",
            get(comment_handler::<S, T>),
        )
        .route(
            "/api/v1/intake/:ticket/submit",
            post(submit_handler::<S, T>),
        )
        .route(
            "/api/v1/intake/:ticket/labels",
            post(labels_handler::<S, T>),
        )
        .with_state(service)
}

fn error_response(error: IntakeServiceError) -> Response {
    let status = match &error {
        IntakeServiceError::InvalidTicket(_) | IntakeServiceError::NoLabels => {
            StatusCode::BAD_REQUEST
        }
        IntakeServiceError::TicketRebind { .. }
        | IntakeServiceError::IncompleteFramework { .. } => StatusCode::CONFLICT,
        IntakeServiceError::NoDecision(_) => StatusCode::NOT_FOUND,
        IntakeServiceError::Tracker(TrackerError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
        IntakeServiceError::Tracker(_) => StatusCode::BAD_GATEWAY,
        IntakeServiceError::SessionsUnavailable | IntakeServiceError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}

pub(crate) async fn catalog_handler<S, T>(
    State(service): State<Arc<IntakeService<S, T>>>,
) -> Response
where
    S: KeyValueStore + 'static,
    T: TrackerClient + 'static,
{
    (StatusCode::OK, axum::Json(service.catalog())).into_response()
}

pub(crate) async fn open_handler<S, T>(
    State(service): State<Arc<IntakeService<S, T>>>,
    Query(query): Query<IntakeQuery>,
) -> Response
where
    S: KeyValueStore + 'static,
    T: TrackerClient + 'static,
{
    match service.open(&query) {
        Ok(session) => (StatusCode::OK, axum::Json(session)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn session_handler<S, T>(
    State(service): State<Arc<IntakeService<S, T>>>,
    Path(ticket): Path<String>,
) -> Response
where
    S: KeyValueStore + 'static,
    T: TrackerClient + 'static,
{
    match service.view(&ticket) {
        Ok(session) => (StatusCode::OK, axum::Json(session)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn dispatch_handler<S, T>(
    State(service): State<Arc<IntakeService<S, T>>>,
    Path(ticket): Path<String>,
    axum::Json(action): axum::Json<WizardAction>,
) -> Response
where
    S: KeyValueStore + 'static,
    T: TrackerClient + 'static,
{
    match service.dispatch(&ticket, action) {
        Ok(outcome) if outcome.applied => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Ok(outcome) => (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn comment_handler<S, T>(
    State(service): State<Arc<IntakeService<S, T>>>,
    Path(ticket): Path<String>,
) -> Response
where
    S: KeyValueStore + 'static,
    T: TrackerClient + 'static,
{
    match service.comment(&ticket) {
        Ok(rendered) => (StatusCode::OK, axum::Json(rendered)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_handler<S, T>(
    State(service): State<Arc<IntakeService<S, T>>>,
    Path(ticket): Path<String>,
) -> Response
where
    S: KeyValueStore + 'static,
    T: TrackerClient + 'static,
{
    let cancel = service.shutdown_token().child_token();
    match service.submit(&ticket, &cancel).await {
        Ok(receipt) => (StatusCode::ACCEPTED, axum::Json(receipt)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct LabelsRequest {
    labels: Vec<String>,
}

pub(crate) async fn labels_handler<S, T>(
    State(service): State<Arc<IntakeService<S, T>>>,
    Path(ticket): Path<String>,
    axum::Json(request): axum::Json<LabelsRequest>,
) -> Response
where
    S: KeyValueStore + 'static,
    T: TrackerClient + 'static,
{
    let cancel = service.shutdown_token().child_token();
    match service.label(&ticket, &request.labels, &cancel).await {
        Ok(acknowledgement) => (StatusCode::OK, axum::Json(acknowledgement)).into_response(),
        Err(error) => error_response(error),
    }
}
