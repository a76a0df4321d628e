//! Deployment state machine.
//!
//! ```text
//! building ──► ready    (materialize, configure, build all succeeded)
//!     └──────► failed   (any of those three failed)
//! ```
//!
//! Publishing and screenshot capture run after a successful build and can
//! only degrade the result (no live route, placeholder thumbnail); they
//! never move a job to `failed`.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

use crate::config::DeployConfig;
use crate::error::DeployError;
use crate::models::job::DeploymentJob;
use crate::models::project::ProjectStatusView;
use crate::services::build_executor::{self, BuildCommands};
use crate::services::project_store::{ProjectStore, ReadyUpdate};
use crate::services::publisher::{self, PublishOutcome};
use crate::services::screenshot::{ScreenshotClient, Thumbnail};
use crate::services::workspace::{Workspace, WorkspaceLocks};
use crate::services::{build_config, materializer};

/// Result of a successful job, returned to the intake caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOutcome {
    pub success: bool,
    pub project_id: String,
    pub url: String,
    pub build_time: i64,
    pub thumbnail: String,
    #[serde(skip)]
    pub publish: PublishOutcome,
}

/// Runs jobs against injected collaborators; one instance per process.
#[derive(Clone)]
pub struct Deployer {
    store: Arc<dyn ProjectStore>,
    config: Arc<DeployConfig>,
    screenshots: ScreenshotClient,
    locks: WorkspaceLocks,
}

impl Deployer {
    pub fn new(store: Arc<dyn ProjectStore>, config: Arc<DeployConfig>) -> Self {
        let screenshots = ScreenshotClient::new(&config.screenshot);
        Self {
            store,
            config,
            screenshots,
            locks: WorkspaceLocks::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ProjectStore> {
        &self.store
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    pub fn screenshots(&self) -> &ScreenshotClient {
        &self.screenshots
    }

    pub fn locks(&self) -> &WorkspaceLocks {
        &self.locks
    }

    /// Run one job to a terminal status.
    pub async fn deploy(&self, job: DeploymentJob) -> Result<DeployOutcome, DeployError> {
        let project_id = job.project_id.clone();
        if self.locks.is_locked(&project_id) {
            tracing::info!(project_id = %project_id, "Waiting for the running job on this project");
        }
        let _guard = self.locks.acquire(&project_id).await;

        let start = Instant::now();
        self.store.mark_building(&project_id, Utc::now()).await?;
        crate::metrics::deployment_status_changed("building");
        tracing::info!(
            project_id = %project_id,
            retries = job.retries,
            max_retries = job.max_retries,
            "Starting deployment"
        );

        let ws = Workspace::for_project(&self.config.projects_root, &project_id);
        if let Err(e) = self.build(&job, &ws).await {
            self.fail(&project_id, &e, start).await;
            return Err(e);
        }

        build_executor::link_entry_points(&ws, &project_id).await;

        let publish = publisher::publish(&self.config.proxy, &project_id, &ws.output).await;
        crate::metrics::publish_result(publish.label());

        let url = self.config.public_url(&project_id);
        let thumbnail = self
            .screenshots
            .thumbnail(&url, &project_id, &self.screenshots.post_deploy_plan())
            .await
            .into_reference();

        let build_time = start.elapsed().as_millis() as i64;
        let ready = ReadyUpdate {
            url: url.clone(),
            thumbnail: thumbnail.clone(),
            completed_at: Utc::now(),
            build_time_ms: build_time,
        };
        if let Err(e) = self.store.mark_ready(&project_id, ready).await {
            let e = DeployError::Store(e);
            self.fail(&project_id, &e, start).await;
            return Err(e);
        }

        crate::metrics::deployment_status_changed("ready");
        crate::metrics::build_duration(build_time as u64);
        tracing::info!(
            project_id = %project_id,
            duration_ms = build_time,
            publish = publish.label(),
            "Project deployed"
        );

        Ok(DeployOutcome {
            success: true,
            project_id,
            url,
            build_time,
            thumbnail,
            publish,
        })
    }

    /// The fatal steps: any error here ends the job as `failed`.
    async fn build(&self, job: &DeploymentJob, ws: &Workspace) -> Result<(), DeployError> {
        let project_id = job.project_id.as_str();

        let step = Instant::now();
        materializer::materialize(
            ws,
            project_id,
            &job.payload,
            &self.config.temp_dir,
            self.config.fix_ownership,
        )
        .await?;
        crate::metrics::step_duration("materialize", step.elapsed().as_millis() as u64);

        build_config::synthesize(ws, project_id).await?;

        build_executor::install_and_build(ws, &BuildCommands::from_config(&self.config), project_id)
            .await
    }

    async fn fail(&self, project_id: &str, error: &DeployError, start: Instant) {
        tracing::error!(
            project_id,
            kind = error.kind(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Deployment failed: {error}"
        );
        crate::metrics::deployment_failed(error.kind());
        crate::metrics::deployment_status_changed("failed");

        if let Err(e) = self
            .store
            .mark_failed(project_id, &error.to_string(), Utc::now())
            .await
        {
            tracing::error!(project_id, "Failed to update project status: {e}");
        }
    }

    /// Polling view of a project, `None` when unknown.
    pub async fn status(&self, project_id: &str) -> anyhow::Result<Option<ProjectStatusView>> {
        Ok(self
            .store
            .get(project_id)
            .await?
            .map(|record| record.status_view()))
    }

    /// Manual-plan capture for an already live URL, used by thumbnail refreshes.
    pub async fn capture_manual(&self, url: &str, project_id: &str) -> Thumbnail {
        self.screenshots
            .thumbnail(url, project_id, &self.screenshots.manual_plan())
            .await
    }
}
