//! Job intake: validates a deployment request and runs it to completion.

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::Json;
use serde_json::json;

use super::{api_error, ApiError};
use crate::models::job::{DeployRequest, DeploymentJob};
use crate::services::deployer::{DeployOutcome, Deployer};

/// Handle an authorized `POST /deploy` body.
///
/// The job runs on its own task: a caller that disconnects stops waiting
/// for the response, but the job still reaches a terminal status.
pub async fn handle_deploy(
    deployer: Arc<Deployer>,
    body: Bytes,
) -> Result<DeployOutcome, ApiError> {
    let request: DeployRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!("Unreadable deploy request: {e}");
        api_error(StatusCode::BAD_REQUEST, "Invalid JSON body")
    })?;

    let job = DeploymentJob::from_request(request).map_err(|e| {
        tracing::warn!("Rejected deploy request: {e}");
        api_error(StatusCode::BAD_REQUEST, e.to_string())
    })?;
    let project_id = job.project_id.clone();

    crate::metrics::job_received();
    let handle = tokio::spawn(async move { deployer.deploy(job).await });

    let details = match handle.await {
        Ok(Ok(outcome)) => return Ok(outcome),
        Ok(Err(e)) => e.to_string(),
        Err(e) => {
            tracing::error!(project_id = %project_id, "Deployment task aborted: {e}");
            format!("Deployment task aborted: {e}")
        }
    };

    Err((
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": "Deployment failed",
            "details": details,
            "projectId": project_id,
        })),
    ))
}
