//! deploy.project: the persisted record a deployment job drives.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::deploy_projects;

/// Lifecycle of a project's most recent deployment job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Building,
    Ready,
    Failed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Building => "building",
            ProjectStatus::Ready => "ready",
            ProjectStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "building" => Ok(ProjectStatus::Building),
            "ready" => Ok(ProjectStatus::Ready),
            "failed" => Ok(ProjectStatus::Failed),
            other => Err(anyhow::anyhow!("unknown project status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMetadata {
    pub build_started_at: Option<DateTime<Utc>>,
    pub build_completed_at: Option<DateTime<Utc>>,
    pub build_time_ms: Option<i64>,
    pub thumbnail_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub project_id: String,
    pub name: String,
    pub status: ProjectStatus,
    pub url: Option<String>,
    pub thumbnail: String,
    pub error: Option<String>,
    pub metadata: ProjectMetadata,
}

impl ProjectRecord {
    /// A fresh record for a project the store has never seen.
    pub fn new(project_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            project_id: project_id.to_string(),
            name: default_name(project_id),
            status: ProjectStatus::Building,
            url: None,
            thumbnail: String::new(),
            error: None,
            metadata: ProjectMetadata {
                build_started_at: None,
                build_completed_at: None,
                build_time_ms: None,
                thumbnail_updated_at: None,
                created_at: now,
                updated_at: now,
            },
        }
    }

    pub fn status_view(&self) -> ProjectStatusView {
        ProjectStatusView {
            project_id: self.project_id.clone(),
            status: self.status,
            url: self.url.clone(),
            name: self.name.clone(),
            created_at: self.metadata.created_at,
            error: self.error.clone(),
        }
    }
}

pub fn default_name(project_id: &str) -> String {
    format!("project-{project_id}")
}

/// Polling response for a single project.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStatusView {
    pub project_id: String,
    pub status: ProjectStatus,
    pub url: Option<String>,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub error: Option<String>,
}

// ── Diesel rows ──

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = deploy_projects)]
pub struct DeployProjectRow {
    pub id: i64,
    pub project_id: String,
    pub name: String,
    pub status: String,
    pub url: Option<String>,
    pub thumbnail: String,
    pub error: Option<String>,
    pub build_started_at: Option<DateTime<Utc>>,
    pub build_completed_at: Option<DateTime<Utc>>,
    pub build_time_ms: Option<i64>,
    pub thumbnail_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DeployProjectRow> for ProjectRecord {
    type Error = anyhow::Error;

    fn try_from(row: DeployProjectRow) -> Result<Self, Self::Error> {
        Ok(Self {
            status: row.status.parse()?,
            project_id: row.project_id,
            name: row.name,
            url: row.url,
            thumbnail: row.thumbnail,
            error: row.error,
            metadata: ProjectMetadata {
                build_started_at: row.build_started_at,
                build_completed_at: row.build_completed_at,
                build_time_ms: row.build_time_ms,
                thumbnail_updated_at: row.thumbnail_updated_at,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = deploy_projects)]
pub struct NewDeployProject {
    pub project_id: String,
    pub name: String,
    pub status: String,
    pub thumbnail: String,
    pub build_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
