//! Turns a job payload into a `source` tree on disk.

use std::path::Path;
use std::time::Duration;

use base64::Engine;

use crate::error::DeployError;
use crate::models::job::{FileEntry, ProjectPayload, ZipData};
use crate::services::process::{run_command, CommandOutcome};
use crate::services::workspace::Workspace;

const EXTRACT_TIMEOUT: Duration = Duration::from_secs(120);
const OWNERSHIP_TIMEOUT: Duration = Duration::from_secs(60);

/// Recreate the workspace directories and write the payload into `source`.
///
/// Any previous `source` tree is discarded so the result holds exactly the
/// submitted files.
pub async fn materialize(
    ws: &Workspace,
    project_id: &str,
    payload: &ProjectPayload,
    temp_dir: &Path,
    fix_ownership: bool,
) -> Result<(), DeployError> {
    prepare_directories(ws, fix_ownership).await?;

    match payload {
        ProjectPayload::Files(files) => write_files(&ws.source, files).await,
        ProjectPayload::Archive(zip) => extract_archive(ws, project_id, zip, temp_dir).await,
    }
}

async fn prepare_directories(ws: &Workspace, fix_ownership: bool) -> Result<(), DeployError> {
    if tokio::fs::try_exists(&ws.source).await.unwrap_or(false) {
        tokio::fs::remove_dir_all(&ws.source)
            .await
            .map_err(|e| dir_error(&ws.source, e))?;
    }
    for dir in [&ws.root, &ws.source, &ws.output] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| dir_error(dir, e))?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&ws.root, std::fs::Permissions::from_mode(0o755))
            .await
            .map_err(|e| dir_error(&ws.root, e))?;
    }

    if fix_ownership {
        take_ownership(&ws.root).await?;
    }

    tracing::debug!(root = %ws.root.display(), "Created project directories");
    Ok(())
}

fn dir_error(dir: &Path, e: std::io::Error) -> DeployError {
    DeployError::Materialization(format!(
        "Failed to create directories at {}: {e}",
        dir.display()
    ))
}

/// Hand the whole tree to the service user in one pass.
async fn take_ownership(root: &Path) -> Result<(), DeployError> {
    // SAFETY: plain getters with no preconditions.
    let (uid, gid) = unsafe { (libc::geteuid(), libc::getegid()) };
    let argv = vec![
        "sudo".to_string(),
        "-n".to_string(),
        "chown".to_string(),
        "-R".to_string(),
        format!("{uid}:{gid}"),
        root.display().to_string(),
    ];
    let outcome = run_command(&argv, root, OWNERSHIP_TIMEOUT).await;
    if outcome.success() {
        Ok(())
    } else {
        Err(DeployError::Materialization(format!(
            "Failed to fix ownership of {}: {}",
            root.display(),
            outcome.describe(OWNERSHIP_TIMEOUT)
        )))
    }
}

async fn write_files(source: &Path, files: &[FileEntry]) -> Result<(), DeployError> {
    for file in files {
        let path = source.join(&file.path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DeployError::Materialization(format!("Failed to write files: {}: {e}", file.path))
            })?;
        }
        tokio::fs::write(&path, file.content.as_bytes())
            .await
            .map_err(|e| {
                DeployError::Materialization(format!("Failed to write files: {}: {e}", file.path))
            })?;
        tracing::debug!(path = %file.path, "Written file");
    }
    tracing::info!(count = files.len(), "Wrote project files");
    Ok(())
}

/// Accepts bare base64 or any `data:<mime>;base64,` URL.
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>, DeployError> {
    let encoded = match data_url.strip_prefix("data:") {
        Some(rest) => match rest.split_once(',') {
            Some((_, data)) => data,
            None => {
                return Err(DeployError::Materialization(
                    "Failed to extract zip: malformed data URL".to_string(),
                ))
            }
        },
        None => data_url,
    };
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(DeployError::Materialization(
            "Failed to extract zip: empty archive payload".to_string(),
        ));
    }
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| DeployError::Materialization(format!("Failed to extract zip: {e}")))
}

async fn extract_archive(
    ws: &Workspace,
    project_id: &str,
    zip: &ZipData,
    temp_dir: &Path,
) -> Result<(), DeployError> {
    let bytes = decode_data_url(&zip.data_url)?;

    tokio::fs::create_dir_all(temp_dir).await.map_err(|e| {
        DeployError::Materialization(format!("Failed to extract zip: temp dir: {e}"))
    })?;
    let archive_path = temp_dir.join(format!("{project_id}-{}.zip", uuid::Uuid::new_v4()));

    let result = unpack(&archive_path, &bytes, &ws.source).await;

    // The decoded archive never outlives the step.
    if let Err(e) = tokio::fs::remove_file(&archive_path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %archive_path.display(), "Failed to remove temp archive: {e}");
        }
    }

    if result.is_ok() {
        tracing::info!(project_id, "Extracted project files from zip");
    }
    result
}

async fn unpack(archive_path: &Path, bytes: &[u8], source: &Path) -> Result<(), DeployError> {
    tokio::fs::write(archive_path, bytes)
        .await
        .map_err(|e| DeployError::Materialization(format!("Failed to extract zip: {e}")))?;

    let argv = vec![
        "unzip".to_string(),
        "-q".to_string(),
        "-o".to_string(),
        archive_path.display().to_string(),
        "-d".to_string(),
        source.display().to_string(),
    ];
    match run_command(&argv, source, EXTRACT_TIMEOUT).await {
        CommandOutcome::Exited { code: 0, .. } => Ok(()),
        outcome => Err(DeployError::Materialization(format!(
            "Failed to extract zip: {}",
            outcome.describe(EXTRACT_TIMEOUT)
        ))),
    }
}
