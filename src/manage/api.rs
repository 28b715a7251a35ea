//! Admin HTTP API.

use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{info, warn};

use super::orchestrator::SessionOrchestrator;
use super::state::StatusSnapshot;
use crate::Result;

/// Shared state of the admin API.
#[derive(Clone)]
pub struct ManageState {
    pub orchestrator: SessionOrchestrator,
    /// HTML served at `/`.
    pub page: Option<Arc<str>>,
}

impl ManageState {
    pub fn new(orchestrator: SessionOrchestrator) -> Self {
        Self {
            orchestrator,
            page: None,
        }
    }

    pub fn with_page(mut self, page: impl Into<Arc<str>>) -> Self {
        self.page = Some(page.into());
        self
    }
}

/// Body of `POST /api/feature/{feature}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRequest {
    pub action: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "optional_port")]
    pub port: Option<u16>,
}

/// Successful feature request.
#[derive(Debug, Clone, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error body of every failed admin request.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse::new(error)))
}

/// Accept an absent port, `null`, a JSON number or a decimal string.
fn optional_port<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<u16>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| de::Error::custom("port out of range")),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<u16>()
            .map(Some)
            .map_err(de::Error::custom),
        _ => Err(de::Error::custom("port must be a number")),
    }
}

/// Serve the admin page.
pub async fn index(State(state): State<ManageState>) -> Response {
    match state.page {
        Some(page) => Html(page.to_string()).into_response(),
        None => api_error(StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}

/// Flags, live sessions and recent history of every feature.
pub async fn status(
    State(state): State<ManageState>,
) -> std::result::Result<Json<StatusSnapshot>, ApiError> {
    state
        .orchestrator
        .status()
        .map(Json)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Enable, disable, start or stop sessions of one feature.
pub async fn feature(
    State(state): State<ManageState>,
    Path(feature): Path<String>,
    body: Bytes,
) -> std::result::Result<Json<SuccessResponse>, ApiError> {
    let request: FeatureRequest = serde_json::from_slice(&body)
        .map_err(|_| api_error(StatusCode::BAD_REQUEST, "Invalid request"))?;

    state
        .orchestrator
        .apply(
            &feature,
            &request.action,
            request.session_id.as_deref(),
            request.port,
        )
        .map_err(|e| {
            warn!(feature = %feature, action = %request.action, error = %e, "admin request failed");
            api_error(StatusCode::BAD_REQUEST, e.to_string())
        })?;

    Ok(Json(SuccessResponse { success: true }))
}

async fn fallback(method: Method) -> Response {
    if method == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        api_error(StatusCode::NOT_FOUND, "Not found").into_response()
    }
}

async fn no_content() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Create the admin router.
pub fn create_router(state: ManageState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/status", get(status))
        .route("/api/feature/{feature}", post(feature))
        .fallback(fallback)
        .method_not_allowed_fallback(no_content)
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
        .with_state(state)
}

/// Serve the admin API on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: ManageState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(addr = ?listener.local_addr().ok(), "admin API listening");
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
