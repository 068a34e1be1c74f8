//! CloudEvents receiver.
//!
//! `POST /` accepts events in binary mode (attributes in `ce-*` headers) or
//! structured mode (`application/cloudevents+json` body) and runs the
//! pipeline to completion before answering.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use kustomizer_core::{Dispatcher, EventKind, InboundEvent, KustomizerError, RunReport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const STRUCTURED_CONTENT_TYPE: &str = "application/cloudevents+json";

#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<Dispatcher>,
}

pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/", post(receive))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { dispatcher })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: kustomizer_core::VERSION,
    })
}

async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RunReport>, ApiError> {
    let event = decode_event(&headers, &body)?;
    let report = state.dispatcher.dispatch(&event).await?;
    Ok(Json(report))
}

/// Event attributes shared by both content modes.
#[derive(Debug, Default, Deserialize)]
struct Attributes {
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: Option<String>,
    owner: Option<String>,
    repository: Option<String>,
    #[serde(alias = "clone_url")]
    cloneurl: Option<String>,
}

impl Attributes {
    fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        Attributes {
            id: header("ce-id"),
            event_type: header("ce-type"),
            owner: header("ce-owner"),
            repository: header("ce-repository"),
            cloneurl: header("ce-cloneurl").or_else(|| header("ce-clone_url")),
        }
    }

    fn into_event(self) -> Result<InboundEvent, KustomizerError> {
        let kind = match self.event_type.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(event_type) => Some(EventKind::from_event_type(event_type).ok_or_else(|| {
                KustomizerError::InvalidField {
                    field: "kind",
                    reason: format!("unsupported event type {event_type:?}"),
                }
            })?),
        };
        Ok(InboundEvent {
            id: self.id,
            kind,
            owner: self.owner,
            repository: self.repository,
            clone_url: self.cloneurl,
        })
    }
}

fn is_structured(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim_start().starts_with(STRUCTURED_CONTENT_TYPE))
}

/// Decode a request into an event, without validating it.
pub fn decode_event(headers: &HeaderMap, body: &[u8]) -> Result<InboundEvent, ApiError> {
    let attributes = if is_structured(headers) {
        serde_json::from_slice::<Attributes>(body).map_err(|err| ApiError {
            status: StatusCode::BAD_REQUEST,
            message: format!("malformed structured event: {err}"),
        })?
    } else {
        Attributes::from_headers(headers)
    };
    Ok(attributes.into_event()?)
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<KustomizerError> for ApiError {
    fn from(err: KustomizerError) -> Self {
        let status = if err.is_validation() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        ApiError {
            status,
            message: err.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}
