//! Thumbnail refreshes for projects that are already live.

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use crate::models::project::ProjectStatus;
use crate::services::deployer::Deployer;
use crate::services::screenshot::Thumbnail;

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Project not found: {0}")]
    NotFound(String),
    #[error("Project {0} is not ready")]
    NotReady(String),
    #[error("Screenshot capture failed for {0}")]
    CaptureFailed(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RefreshSummary {
    pub updated: usize,
    pub failed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailCheck {
    pub total_ready: i64,
    pub needing_update: usize,
    pub has_api_key: bool,
}

/// Recapture one ready project. A placeholder result is not stored.
pub async fn refresh_one(deployer: &Deployer, project_id: &str) -> Result<String, RefreshError> {
    let record = deployer
        .store()
        .get(project_id)
        .await?
        .ok_or_else(|| RefreshError::NotFound(project_id.to_string()))?;
    if record.status != ProjectStatus::Ready {
        return Err(RefreshError::NotReady(project_id.to_string()));
    }

    let url = record
        .url
        .unwrap_or_else(|| deployer.config().public_url(project_id));

    match deployer.capture_manual(&url, project_id).await {
        Thumbnail::Captured(reference) => {
            deployer
                .store()
                .set_thumbnail(project_id, &reference, Utc::now())
                .await?;
            tracing::info!(project_id, "Thumbnail updated");
            Ok(reference)
        }
        Thumbnail::Placeholder(_) => Err(RefreshError::CaptureFailed(project_id.to_string())),
    }
}

/// Recapture every ready project still showing an empty or generated thumbnail.
pub async fn refresh_all(deployer: &Deployer) -> anyhow::Result<RefreshSummary> {
    let candidates = deployer.store().list_needing_thumbnail().await?;
    let total = candidates.len();
    let pause = deployer.config().screenshot.refresh_pause;
    tracing::info!(total, "Refreshing thumbnails");

    let mut summary = RefreshSummary {
        updated: 0,
        failed: 0,
        total,
    };
    for (i, record) in candidates.iter().enumerate() {
        match refresh_one(deployer, &record.project_id).await {
            Ok(_) => summary.updated += 1,
            Err(e) => {
                tracing::warn!(project_id = %record.project_id, "Thumbnail refresh failed: {e}");
                summary.failed += 1;
            }
        }
        if i + 1 < total {
            tokio::time::sleep(pause).await;
        }
    }

    tracing::info!(
        updated = summary.updated,
        failed = summary.failed,
        "Thumbnail refresh finished"
    );
    Ok(summary)
}

pub async fn check(deployer: &Deployer) -> anyhow::Result<ThumbnailCheck> {
    Ok(ThumbnailCheck {
        total_ready: deployer.store().count_ready().await?,
        needing_update: deployer.store().list_needing_thumbnail().await?.len(),
        has_api_key: deployer.screenshots().has_api_key(),
    })
}
