//! Deployment service HTTP routes: job intake, status polling, thumbnails.

pub mod api;
pub mod deploy;

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::DeployConfig;
use crate::services::deployer::{DeployOutcome, Deployer};

/// Payloads carry whole projects inline.
pub const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

pub const SERVICE_NAME: &str = "site-deploy-server";

/// Error responses are always a JSON object with at least `error`.
pub type ApiError = (StatusCode, Json<Value>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

/// Shared state for route handlers.
#[derive(Clone)]
pub struct AppState {
    pub deployer: Arc<Deployer>,
}

impl AppState {
    pub fn new(deployer: Deployer) -> Self {
        Self {
            deployer: Arc::new(deployer),
        }
    }

    fn config(&self) -> &DeployConfig {
        self.deployer.config()
    }
}

/// Build the service's Axum router.
pub fn deploy_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config().allowed_origins);
    Router::new()
        .route("/health", get(health))
        // Intake
        .route("/deploy", post(deploy_handler))
        // Polling
        .route("/projects/{project_id}/status", get(status_handler))
        // Thumbnails
        .route("/thumbnails", post(thumbnails_handler))
        .route("/thumbnails/check", get(thumbnails_check_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Compare the bearer token against the shared deployment secret.
pub fn authorize(config: &DeployConfig, headers: &HeaderMap) -> Result<(), ApiError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split_whitespace().nth(1))
        .unwrap_or("");

    if !token_matches(token, &config.deployment_secret) {
        tracing::warn!("Rejected request with invalid deployment token");
        return Err(api_error(StatusCode::UNAUTHORIZED, "Unauthorized"));
    }
    Ok(())
}

/// Constant-time comparison over SHA-256 digests of both tokens.
pub fn token_matches(provided: &str, expected: &str) -> bool {
    use sha2::{Digest, Sha256};
    use subtle::ConstantTimeEq;

    if provided.is_empty() || expected.is_empty() {
        return false;
    }
    let provided = Sha256::digest(provided.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    provided.ct_eq(&expected).into()
}

// ── Health ──

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": SERVICE_NAME,
        "activeDeployments": state.deployer.locks().len(),
    }))
}

// ── Intake ──

async fn deploy_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<DeployOutcome>, ApiError> {
    authorize(state.config(), &headers)?;
    deploy::handle_deploy(state.deployer.clone(), body)
        .await
        .map(Json)
}

// ── Polling ──

async fn status_handler(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<crate::models::project::ProjectStatusView>, ApiError> {
    api::project_status(&state.deployer, &project_id)
        .await
        .map(Json)
}

// ── Thumbnails ──

async fn thumbnails_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    authorize(state.config(), &headers)?;
    api::refresh_thumbnails(&state.deployer, body).await.map(Json)
}

async fn thumbnails_check_handler(
    State(state): State<AppState>,
) -> Result<Json<crate::services::thumbnails::ThumbnailCheck>, ApiError> {
    crate::services::thumbnails::check(&state.deployer)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!("Thumbnail check error: {e}");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to check thumbnails")
        })
}
