//! Read and maintenance API for deployed projects.

use axum::body::Bytes;
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{api_error, ApiError};
use crate::models::project::ProjectStatusView;
use crate::services::deployer::Deployer;
use crate::services::thumbnails::{self, RefreshError};

pub async fn project_status(
    deployer: &Deployer,
    project_id: &str,
) -> Result<ProjectStatusView, ApiError> {
    match deployer.status(project_id).await {
        Ok(Some(view)) => Ok(view),
        Ok(None) => Err(api_error(StatusCode::NOT_FOUND, "Project not found")),
        Err(e) => {
            tracing::error!(project_id, "Status lookup error: {e}");
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load project status",
            ))
        }
    }
}

/// Body of `POST /thumbnails`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailRequest {
    pub project_id: Option<String>,
    #[serde(default)]
    pub update_all: bool,
}

pub async fn refresh_thumbnails(deployer: &Deployer, body: Bytes) -> Result<Value, ApiError> {
    let request: ThumbnailRequest = serde_json::from_slice(&body)
        .map_err(|_| api_error(StatusCode::BAD_REQUEST, "Invalid JSON body"))?;

    if request.update_all {
        let summary = thumbnails::refresh_all(deployer).await.map_err(|e| {
            tracing::error!("Thumbnail refresh error: {e}");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to refresh thumbnails")
        })?;
        return Ok(json!({
            "success": true,
            "updated": summary.updated,
            "failed": summary.failed,
            "total": summary.total,
        }));
    }

    let Some(project_id) = request.project_id.filter(|id| !id.is_empty()) else {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Missing projectId or updateAll",
        ));
    };

    match thumbnails::refresh_one(deployer, &project_id).await {
        Ok(thumbnail) => Ok(json!({
            "success": true,
            "projectId": project_id,
            "thumbnail": thumbnail,
        })),
        Err(e @ RefreshError::NotFound(_)) => Err(api_error(StatusCode::NOT_FOUND, e.to_string())),
        Err(e @ RefreshError::NotReady(_)) => {
            Err(api_error(StatusCode::BAD_REQUEST, e.to_string()))
        }
        Err(e @ RefreshError::CaptureFailed(_)) => {
            Err(api_error(StatusCode::BAD_GATEWAY, e.to_string()))
        }
        Err(RefreshError::Store(e)) => {
            tracing::error!(project_id, "Thumbnail refresh error: {e}");
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to refresh thumbnail",
            ))
        }
    }
}
