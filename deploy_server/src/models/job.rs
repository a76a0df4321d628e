//! Deployment jobs as submitted by the intake layer.

use std::path::{Component, Path};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static PROJECT_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap());

/// Wire body of `POST /deploy`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    pub project_id: Option<String>,
    pub files: Option<Vec<FileEntry>>,
    pub zip_data: Option<ZipData>,
    pub timestamp: Option<String>,
    #[serde(default)]
    pub retries: u32,
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZipData {
    /// Base64 zip archive, optionally wrapped in a `data:` URL.
    pub data_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectPayload {
    Files(Vec<FileEntry>),
    Archive(ZipData),
}

/// A validated job, consumed exactly once by the deployer.
///
/// `retries` and `max_retries` are carried for the caller's bookkeeping;
/// the deployer never re-enqueues.
#[derive(Debug, Clone)]
pub struct DeploymentJob {
    pub project_id: String,
    pub payload: ProjectPayload,
    pub retries: u32,
    pub max_retries: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobRejected {
    #[error("Missing projectId and either files or zipData")]
    MissingFields,
    #[error("Invalid projectId: {0}")]
    InvalidProjectId(String),
    #[error("Invalid file path: {0}")]
    InvalidPath(String),
}

impl DeploymentJob {
    pub fn from_request(req: DeployRequest) -> Result<Self, JobRejected> {
        let project_id = req
            .project_id
            .filter(|id| !id.is_empty())
            .ok_or(JobRejected::MissingFields)?;

        // An archive wins when both are present.
        let payload = match (req.zip_data, req.files) {
            (Some(zip), _) => ProjectPayload::Archive(zip),
            (None, Some(files)) => ProjectPayload::Files(files),
            (None, None) => return Err(JobRejected::MissingFields),
        };

        validate_project_id(&project_id)?;
        if let ProjectPayload::Files(files) = &payload {
            for file in files {
                validate_relative_path(&file.path)?;
            }
        }

        Ok(Self {
            project_id,
            payload,
            retries: req.retries,
            max_retries: req.max_retries.unwrap_or(3),
        })
    }
}

/// Project ids end up in filesystem paths and proxy rules.
pub fn validate_project_id(project_id: &str) -> Result<(), JobRejected> {
    if PROJECT_ID_REGEX.is_match(project_id) {
        Ok(())
    } else {
        Err(JobRejected::InvalidProjectId(project_id.to_string()))
    }
}

/// File entries must stay inside the `source` subtree.
pub fn validate_relative_path(path: &str) -> Result<(), JobRejected> {
    let parsed = Path::new(path);
    let mut has_normal = false;
    for component in parsed.components() {
        match component {
            Component::Normal(_) => has_normal = true,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(JobRejected::InvalidPath(path.to_string()));
            }
        }
    }
    if has_normal {
        Ok(())
    } else {
        Err(JobRejected::InvalidPath(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files_request(id: &str, paths: &[&str]) -> DeployRequest {
        DeployRequest {
            project_id: Some(id.to_string()),
            files: Some(
                paths
                    .iter()
                    .map(|p| FileEntry {
                        path: p.to_string(),
                        content: String::new(),
                    })
                    .collect(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn parses_wire_body() {
        let req: DeployRequest = serde_json::from_value(serde_json::json!({
            "projectId": "abc123",
            "files": [{"path": "index.html", "content": "<h1>Hi</h1>"}],
            "timestamp": "2024-01-01T00:00:00Z",
            "retries": 1,
            "maxRetries": 3
        }))
        .unwrap();
        let job = DeploymentJob::from_request(req).unwrap();
        assert_eq!(job.project_id, "abc123");
        assert_eq!(job.retries, 1);
        assert_eq!(job.max_retries, 3);
        assert_eq!(
            job.payload,
            ProjectPayload::Files(vec![FileEntry {
                path: "index.html".to_string(),
                content: "<h1>Hi</h1>".to_string(),
            }])
        );
    }

    #[test]
    fn archive_takes_precedence_over_files() {
        let mut req = files_request("abc123", &["index.html"]);
        req.zip_data = Some(ZipData {
            data_url: "data:application/zip;base64,AAAA".to_string(),
        });
        let job = DeploymentJob::from_request(req).unwrap();
        assert!(matches!(job.payload, ProjectPayload::Archive(_)));
    }

    #[test]
    fn rejects_missing_fields() {
        let req = DeployRequest {
            project_id: Some("abc123".to_string()),
            ..Default::default()
        };
        assert_eq!(
            DeploymentJob::from_request(req).unwrap_err(),
            JobRejected::MissingFields
        );

        let mut req = files_request("x", &["a.js"]);
        req.project_id = None;
        assert_eq!(
            DeploymentJob::from_request(req).unwrap_err(),
            JobRejected::MissingFields
        );
    }

    #[test]
    fn rejects_project_ids_unsafe_for_paths() {
        for id in ["../etc", "a b", "abc;rm", "a/b", &"x".repeat(65)] {
            let err = DeploymentJob::from_request(files_request(id, &["a.js"])).unwrap_err();
            assert!(matches!(err, JobRejected::InvalidProjectId(_)), "{id}");
        }
        assert!(validate_project_id("V1StGXR8_Z5j").is_ok());
    }

    #[test]
    fn rejects_paths_escaping_the_source_tree() {
        for path in ["../x.js", "/etc/passwd", "src/../../x", "", "."] {
            assert!(validate_relative_path(path).is_err(), "{path}");
        }
        for path in ["index.html", "src/App.jsx", "./public/logo.svg"] {
            assert!(validate_relative_path(path).is_ok(), "{path}");
        }
    }
}
