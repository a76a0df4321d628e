//! Postgres pool and schema migration for the project store.

use diesel_async::pooled_connection::deadpool::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncPgConnection, SimpleAsyncConnection};

pub type DbPool = Pool<AsyncPgConnection>;

/// SQL migration for the deployment tables. Safe to run on every start.
pub const MIGRATION_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS deploy_projects (
    id                   BIGSERIAL PRIMARY KEY,
    project_id           VARCHAR(64) NOT NULL UNIQUE,
    name                 VARCHAR(255) NOT NULL,
    status               VARCHAR(16) NOT NULL DEFAULT 'building',
    url                  VARCHAR(512),
    thumbnail            TEXT NOT NULL DEFAULT '',
    error                TEXT,
    build_started_at     TIMESTAMPTZ,
    build_completed_at   TIMESTAMPTZ,
    build_time_ms        BIGINT,
    thumbnail_updated_at TIMESTAMPTZ,
    created_at           TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at           TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_deploy_projects_status ON deploy_projects (status);
"#;

/// Build the connection pool. Connections are opened lazily.
pub fn create_pool(database_url: &str, max_size: usize) -> anyhow::Result<DbPool> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    Pool::builder(manager)
        .max_size(max_size)
        .build()
        .map_err(|e| anyhow::anyhow!("diesel pool: {e}"))
}

pub async fn run_migration(conn: &mut AsyncPgConnection) -> anyhow::Result<()> {
    conn.batch_execute(MIGRATION_SQL)
        .await
        .map_err(|e| anyhow::anyhow!("deploy migration failed: {e}"))?;
    Ok(())
}
