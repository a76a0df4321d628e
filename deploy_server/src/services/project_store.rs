//! Persistence for project records.
//!
//! The deployer only ever addresses a record by its own `project_id`, and
//! only through these transitions.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::models::project::{ProjectRecord, ProjectStatus};
use crate::services::screenshot::is_placeholder;

/// Final metadata written when a job succeeds.
#[derive(Debug, Clone)]
pub struct ReadyUpdate {
    pub url: String,
    pub thumbnail: String,
    pub completed_at: DateTime<Utc>,
    pub build_time_ms: i64,
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Enter `building`, creating the record when the id is new.
    async fn mark_building(&self, project_id: &str, started_at: DateTime<Utc>)
        -> anyhow::Result<()>;

    async fn mark_ready(&self, project_id: &str, update: ReadyUpdate) -> anyhow::Result<()>;

    async fn mark_failed(
        &self,
        project_id: &str,
        error: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    async fn get(&self, project_id: &str) -> anyhow::Result<Option<ProjectRecord>>;

    async fn set_thumbnail(
        &self,
        project_id: &str,
        thumbnail: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    /// Ready projects whose thumbnail is empty or a placeholder.
    async fn list_needing_thumbnail(&self) -> anyhow::Result<Vec<ProjectRecord>>;

    async fn count_ready(&self) -> anyhow::Result<i64>;
}

/// In-process store for tests and database-less runs.
#[derive(Default)]
pub struct MemoryProjectStore {
    records: RwLock<HashMap<String, ProjectRecord>>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(project_id: &str) -> anyhow::Error {
    anyhow::anyhow!("Project not found: {project_id}")
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn mark_building(
        &self,
        project_id: &str,
        started_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .entry(project_id.to_string())
            .or_insert_with(|| ProjectRecord::new(project_id, started_at));
        record.status = ProjectStatus::Building;
        record.error = None;
        record.metadata.build_started_at = Some(started_at);
        record.metadata.build_completed_at = None;
        record.metadata.build_time_ms = None;
        record.metadata.updated_at = started_at;
        Ok(())
    }

    async fn mark_ready(&self, project_id: &str, update: ReadyUpdate) -> anyhow::Result<()> {
        let mut records = self.records.write().await;
        let record = records.get_mut(project_id).ok_or_else(|| missing(project_id))?;
        record.status = ProjectStatus::Ready;
        record.error = None;
        record.url = Some(update.url);
        record.thumbnail = update.thumbnail;
        record.metadata.build_completed_at = Some(update.completed_at);
        record.metadata.build_time_ms = Some(update.build_time_ms);
        record.metadata.updated_at = update.completed_at;
        Ok(())
    }

    async fn mark_failed(
        &self,
        project_id: &str,
        error: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut records = self.records.write().await;
        let record = records.get_mut(project_id).ok_or_else(|| missing(project_id))?;
        record.status = ProjectStatus::Failed;
        record.error = Some(error.to_string());
        record.metadata.updated_at = at;
        Ok(())
    }

    async fn get(&self, project_id: &str) -> anyhow::Result<Option<ProjectRecord>> {
        Ok(self.records.read().await.get(project_id).cloned())
    }

    async fn set_thumbnail(
        &self,
        project_id: &str,
        thumbnail: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut records = self.records.write().await;
        let record = records.get_mut(project_id).ok_or_else(|| missing(project_id))?;
        record.thumbnail = thumbnail.to_string();
        record.metadata.thumbnail_updated_at = Some(at);
        record.metadata.updated_at = at;
        Ok(())
    }

    async fn list_needing_thumbnail(&self) -> anyhow::Result<Vec<ProjectRecord>> {
        let mut found: Vec<ProjectRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.status == ProjectStatus::Ready && is_placeholder(&r.thumbnail))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.metadata.created_at.cmp(&b.metadata.created_at));
        Ok(found)
    }

    async fn count_ready(&self) -> anyhow::Result<i64> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.status == ProjectStatus::Ready)
            .count() as i64)
    }
}
