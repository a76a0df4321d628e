//! Build executor: installs dependencies and runs the bundler.
//!
//! Both steps run inside the workspace's `source` subtree under their own
//! timeout. Either failure aborts the job with the captured output; there
//! is no retry inside a job.

use std::path::Path;
use std::time::{Duration, Instant};

use crate::error::DeployError;
use crate::services::process::{run_command, CommandOutcome};
use crate::services::workspace::Workspace;

#[derive(Debug, Clone)]
pub struct BuildCommands {
    pub install: Vec<String>,
    pub build: Vec<String>,
    pub install_timeout: Duration,
    pub build_timeout: Duration,
}

impl BuildCommands {
    pub fn from_config(config: &crate::config::DeployConfig) -> Self {
        Self {
            install: config.install_command.clone(),
            build: config.build_command.clone(),
            install_timeout: config.install_timeout,
            build_timeout: config.build_timeout,
        }
    }
}

pub async fn install_and_build(
    ws: &Workspace,
    commands: &BuildCommands,
    project_id: &str,
) -> Result<(), DeployError> {
    tracing::info!(project_id, "Installing dependencies...");
    let outcome = run_step(
        project_id,
        "install",
        &commands.install,
        &ws.source,
        commands.install_timeout,
    )
    .await;
    if !outcome.success() {
        return Err(DeployError::DependencyInstall {
            output: outcome.describe(commands.install_timeout),
        });
    }

    tracing::info!(project_id, "Building project...");
    let outcome = run_step(
        project_id,
        "build",
        &commands.build,
        &ws.source,
        commands.build_timeout,
    )
    .await;
    if !outcome.success() {
        return Err(DeployError::BuildFailed {
            output: outcome.describe(commands.build_timeout),
        });
    }

    tracing::info!(project_id, "Build completed successfully");
    Ok(())
}

async fn run_step(
    project_id: &str,
    step: &str,
    argv: &[String],
    cwd: &Path,
    timeout: Duration,
) -> CommandOutcome {
    let start = Instant::now();
    let outcome = run_command(argv, cwd, timeout).await;
    let duration_ms = start.elapsed().as_millis() as u64;
    crate::metrics::step_duration(step, duration_ms);

    if outcome.success() {
        tracing::info!(project_id, step, duration_ms, "Step passed");
    } else {
        tracing::warn!(project_id, step, duration_ms, outcome = ?outcome, "Step failed");
    }
    outcome
}

/// Link the build's entry file and asset directory into the project root.
///
/// Purely a serving convenience: failures are logged and ignored.
pub async fn link_entry_points(ws: &Workspace, project_id: &str) {
    for (link, target) in [("index.html", "dist/index.html"), ("assets", "dist/assets")] {
        if let Err(e) = replace_symlink(&ws.root, link, target).await {
            tracing::warn!(project_id, link, "Could not create symlink: {e}");
        }
    }
}

async fn replace_symlink(root: &Path, link: &str, target: &str) -> std::io::Result<()> {
    let link_path = root.join(link);
    if tokio::fs::symlink_metadata(&link_path).await.is_ok() {
        tokio::fs::remove_file(&link_path).await?;
    }
    #[cfg(unix)]
    {
        tokio::fs::symlink(target, &link_path).await
    }
    #[cfg(not(unix))]
    {
        let _ = target;
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "symlinks are only created on unix",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::sh;

    fn commands(install: &str, build: &str) -> BuildCommands {
        BuildCommands {
            install: sh(install),
            build: sh(build),
            install_timeout: Duration::from_secs(5),
            build_timeout: Duration::from_secs(5),
        }
    }

    async fn workspace() -> (tempfile::TempDir, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::for_project(dir.path(), "abc123");
        tokio::fs::create_dir_all(&ws.source).await.unwrap();
        tokio::fs::create_dir_all(&ws.output).await.unwrap();
        (dir, ws)
    }

    #[tokio::test]
    async fn both_steps_run_in_source() {
        let (_dir, ws) = workspace().await;
        let cmds = commands("touch installed", "test -f installed && touch ../dist/built");
        install_and_build(&ws, &cmds, "abc123").await.unwrap();
        assert!(ws.source.join("installed").exists());
        assert!(ws.output.join("built").exists());
    }

    #[tokio::test]
    async fn install_failure_skips_build() {
        let (_dir, ws) = workspace().await;
        let cmds = commands("echo 'npm ERR! 404' >&2; exit 1", "touch ../dist/built");
        let err = install_and_build(&ws, &cmds, "abc123").await.unwrap_err();
        match err {
            DeployError::DependencyInstall { output } => assert!(output.contains("npm ERR! 404")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!ws.output.join("built").exists());
    }

    #[tokio::test]
    async fn build_failure_carries_output() {
        let (_dir, ws) = workspace().await;
        let cmds = commands("true", "echo 'error during build'; exit 2");
        let err = install_and_build(&ws, &cmds, "abc123").await.unwrap_err();
        match err {
            DeployError::BuildFailed { output } => {
                assert!(output.contains("exited with status 2"));
                assert!(output.contains("error during build"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn build_timeout_is_a_build_failure() {
        let (_dir, ws) = workspace().await;
        let mut cmds = commands("true", "echo transforming; sleep 30");
        cmds.build_timeout = Duration::from_millis(300);
        let err = install_and_build(&ws, &cmds, "abc123").await.unwrap_err();
        match err {
            DeployError::BuildFailed { output } => {
                assert!(output.contains("timed out"));
                assert!(output.contains("transforming"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn entry_points_are_linked_idempotently() {
        let (_dir, ws) = workspace().await;
        tokio::fs::create_dir_all(ws.output.join("assets")).await.unwrap();
        tokio::fs::write(ws.output.join("index.html"), "<h1>Hi</h1>")
            .await
            .unwrap();

        link_entry_points(&ws, "abc123").await;
        link_entry_points(&ws, "abc123").await;

        assert_eq!(
            tokio::fs::read_to_string(ws.root.join("index.html"))
                .await
                .unwrap(),
            "<h1>Hi</h1>"
        );
        assert!(ws.root.join("assets").is_dir());
    }

    #[tokio::test]
    async fn missing_build_output_does_not_panic() {
        let (_dir, ws) = workspace().await;
        // Dangling links are still created; nothing here is fatal.
        link_entry_points(&ws, "abc123").await;
    }
}
