//! Per-project build workspaces and the keyed lock guarding them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// On-disk layout of one project: `<root>/src` holds the materialized
/// input, `<root>/dist` the build output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub root: PathBuf,
    pub source: PathBuf,
    pub output: PathBuf,
}

impl Workspace {
    pub fn for_project(projects_root: &Path, project_id: &str) -> Self {
        let root = projects_root.join(project_id);
        Self {
            source: root.join("src"),
            output: root.join("dist"),
            root,
        }
    }

    /// Output directory as seen from the source directory.
    pub fn output_from_source(&self) -> &'static str {
        "../dist"
    }
}

/// At most one job may touch a project's workspace at a time.
#[derive(Clone, Default)]
pub struct WorkspaceLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl WorkspaceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `project_id`'s workspace.
    pub async fn acquire(&self, project_id: &str) -> WorkspaceGuard {
        let lock = self
            .locks
            .entry(project_id.to_string())
            .or_default()
            .clone();
        let guard = lock.lock_owned().await;
        WorkspaceGuard {
            guard: Some(guard),
            locks: self.locks.clone(),
            project_id: project_id.to_string(),
        }
    }

    pub fn is_locked(&self, project_id: &str) -> bool {
        self.locks
            .get(project_id)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Number of ids with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

pub struct WorkspaceGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    project_id: String,
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Waiters hold their own clone, so a count of one means nobody is queued.
        self.locks
            .remove_if(&self.project_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
