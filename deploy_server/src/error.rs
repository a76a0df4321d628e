//! Fatal deployment failures.
//!
//! Only the steps that leave no usable artifact behind produce a
//! `DeployError`; publishing and screenshot capture report their outcome
//! as plain values instead.

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("Failed to materialize project: {0}")]
    Materialization(String),

    #[error("Failed to write build config: {0}")]
    ConfigWrite(String),

    #[error("Dependency install failed: {output}")]
    DependencyInstall { output: String },

    #[error("Build failed: {output}")]
    BuildFailed { output: String },

    #[error("Project store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl DeployError {
    /// Stable label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DeployError::Materialization(_) => "materialization",
            DeployError::ConfigWrite(_) => "config_write",
            DeployError::DependencyInstall { .. } => "dependency_install",
            DeployError::BuildFailed { .. } => "build_failed",
            DeployError::Store(_) => "store",
        }
    }
}
