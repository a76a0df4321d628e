//! Postgres-backed project store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::db::DbPool;
use crate::models::project::{default_name, DeployProjectRow, NewDeployProject, ProjectRecord};
use crate::schema::deploy_projects;
use crate::services::project_store::{ProjectStore, ReadyUpdate};

pub struct PgProjectStore {
    pool: DbPool,
}

impl PgProjectStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(
        &self,
    ) -> anyhow::Result<
        diesel_async::pooled_connection::deadpool::Object<diesel_async::AsyncPgConnection>,
    > {
        self.pool
            .get()
            .await
            .map_err(|e| anyhow::anyhow!("diesel pool: {e}"))
    }
}

fn ensure_updated(rows: usize, project_id: &str) -> anyhow::Result<()> {
    if rows == 0 {
        anyhow::bail!("Project not found: {project_id}");
    }
    Ok(())
}

#[async_trait]
impl ProjectStore for PgProjectStore {
    async fn mark_building(
        &self,
        project_id: &str,
        started_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let new_project = NewDeployProject {
            project_id: project_id.to_string(),
            name: default_name(project_id),
            status: "building".to_string(),
            thumbnail: String::new(),
            build_started_at: Some(started_at),
            created_at: started_at,
            updated_at: started_at,
        };

        diesel::insert_into(deploy_projects::table)
            .values(&new_project)
            .on_conflict(deploy_projects::project_id)
            .do_update()
            .set((
                deploy_projects::status.eq("building"),
                deploy_projects::error.eq(None::<String>),
                deploy_projects::build_started_at.eq(Some(started_at)),
                deploy_projects::build_completed_at.eq(None::<DateTime<Utc>>),
                deploy_projects::build_time_ms.eq(None::<i64>),
                deploy_projects::updated_at.eq(started_at),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn mark_ready(&self, project_id: &str, update: ReadyUpdate) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let rows = diesel::update(
            deploy_projects::table.filter(deploy_projects::project_id.eq(project_id)),
        )
        .set((
            deploy_projects::status.eq("ready"),
            deploy_projects::error.eq(None::<String>),
            deploy_projects::url.eq(Some(update.url)),
            deploy_projects::thumbnail.eq(update.thumbnail),
            deploy_projects::build_completed_at.eq(Some(update.completed_at)),
            deploy_projects::build_time_ms.eq(Some(update.build_time_ms)),
            deploy_projects::updated_at.eq(update.completed_at),
        ))
        .execute(&mut conn)
        .await?;
        ensure_updated(rows, project_id)
    }

    async fn mark_failed(
        &self,
        project_id: &str,
        error: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let rows = diesel::update(
            deploy_projects::table.filter(deploy_projects::project_id.eq(project_id)),
        )
        .set((
            deploy_projects::status.eq("failed"),
            deploy_projects::error.eq(Some(error)),
            deploy_projects::updated_at.eq(at),
        ))
        .execute(&mut conn)
        .await?;
        ensure_updated(rows, project_id)
    }

    async fn get(&self, project_id: &str) -> anyhow::Result<Option<ProjectRecord>> {
        let mut conn = self.conn().await?;
        let row = deploy_projects::table
            .filter(deploy_projects::project_id.eq(project_id))
            .select(DeployProjectRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        row.map(ProjectRecord::try_from).transpose()
    }

    async fn set_thumbnail(
        &self,
        project_id: &str,
        thumbnail: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let rows = diesel::update(
            deploy_projects::table.filter(deploy_projects::project_id.eq(project_id)),
        )
        .set((
            deploy_projects::thumbnail.eq(thumbnail),
            deploy_projects::thumbnail_updated_at.eq(Some(at)),
            deploy_projects::updated_at.eq(at),
        ))
        .execute(&mut conn)
        .await?;
        ensure_updated(rows, project_id)
    }

    async fn list_needing_thumbnail(&self) -> anyhow::Result<Vec<ProjectRecord>> {
        let mut conn = self.conn().await?;
        let rows = deploy_projects::table
            .filter(deploy_projects::status.eq("ready"))
            .filter(
                deploy_projects::thumbnail
                    .eq("")
                    .or(deploy_projects::thumbnail.like("data:image/svg+xml%")),
            )
            .order(deploy_projects::created_at.asc())
            .select(DeployProjectRow::as_select())
            .load(&mut conn)
            .await?;
        rows.into_iter().map(ProjectRecord::try_from).collect()
    }

    async fn count_ready(&self) -> anyhow::Result<i64> {
        let mut conn = self.conn().await?;
        let count = deploy_projects::table
            .filter(deploy_projects::status.eq("ready"))
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count)
    }
}
