//! Publish step: exposes a build through an nginx location rule.
//!
//! The rule is staged, enabled and then validated against the full proxy
//! configuration. The live proxy is only reloaded when validation passes;
//! otherwise the previous rule (if any) is put back so a working route is
//! never replaced by a broken one. Failures here never fail the job.

use std::path::{Path, PathBuf};

use crate::config::{DeployConfig, ProxyConfig};
use crate::services::process::run_command;

/// Extensions served with long-lived cache headers.
pub const CACHED_EXTENSIONS: &str = "js|css|png|jpg|jpeg|gif|ico|svg|woff|woff2|ttf|eot";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    /// The build exists but the route is not (newly) live.
    Warning(String),
}

impl PublishOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            PublishOutcome::Published => "published",
            PublishOutcome::Warning(_) => "warning",
        }
    }
}

pub fn site_name(project_id: &str) -> String {
    format!("project-{project_id}")
}

/// Location block mapping `/creation/<id>/` onto the build output.
pub fn route_rule(project_id: &str, output_dir: &Path) -> String {
    let base = DeployConfig::base_path(project_id);
    let alias = output_dir.display();
    format!(
        r#"location {base} {{
    alias {alias}/;
    try_files $uri $uri/ {base}index.html;

    add_header X-Frame-Options SAMEORIGIN;
    add_header X-Content-Type-Options nosniff;
    add_header X-XSS-Protection "1; mode=block";

    location ~* \.({CACHED_EXTENSIONS})$ {{
        expires 1y;
        add_header Cache-Control "public, immutable";
    }}
}}
"#
    )
}

pub async fn publish(proxy: &ProxyConfig, project_id: &str, output_dir: &Path) -> PublishOutcome {
    match try_publish(proxy, project_id, output_dir).await {
        Ok(()) => {
            tracing::info!(project_id, "Nginx configuration updated");
            PublishOutcome::Published
        }
        Err(reason) => {
            tracing::warn!(project_id, "Nginx configuration failed: {reason}");
            PublishOutcome::Warning(reason)
        }
    }
}

async fn try_publish(
    proxy: &ProxyConfig,
    project_id: &str,
    output_dir: &Path,
) -> Result<(), String> {
    let name = site_name(project_id);
    let available = proxy.sites_available.join(&name);
    let enabled = proxy.sites_enabled.join(&name);

    let previous = match tokio::fs::read_to_string(&available).await {
        Ok(content) => Some(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(format!("reading {}: {e}", available.display())),
    };
    let was_enabled = tokio::fs::symlink_metadata(&enabled).await.is_ok();

    write_atomically(&available, &route_rule(project_id, output_dir))
        .await
        .map_err(|e| format!("writing {}: {e}", available.display()))?;

    if let Err(e) = enable_site(&available, &enabled).await {
        rollback(&available, &enabled, previous.as_deref(), was_enabled).await;
        return Err(format!("enabling {}: {e}", enabled.display()));
    }

    let test = run_command(&proxy.test_command, &proxy.sites_available, proxy.command_timeout).await;
    if !test.success() {
        rollback(&available, &enabled, previous.as_deref(), was_enabled).await;
        return Err(format!(
            "config test failed, route not reloaded: {}",
            test.describe(proxy.command_timeout)
        ));
    }

    let reload = run_command(
        &proxy.reload_command,
        &proxy.sites_available,
        proxy.command_timeout,
    )
    .await;
    if !reload.success() {
        return Err(format!(
            "reload failed: {}",
            reload.describe(proxy.command_timeout)
        ));
    }

    Ok(())
}

async fn write_atomically(path: &Path, content: &str) -> std::io::Result<()> {
    let staging = staging_path(path);
    tokio::fs::write(&staging, content).await?;
    tokio::fs::rename(&staging, path).await
}

fn staging_path(path: &Path) -> PathBuf {
    let mut staged = path.as_os_str().to_owned();
    staged.push(".staging");
    PathBuf::from(staged)
}

async fn enable_site(available: &Path, enabled: &Path) -> std::io::Result<()> {
    if tokio::fs::symlink_metadata(enabled).await.is_ok() {
        tokio::fs::remove_file(enabled).await?;
    }
    #[cfg(unix)]
    {
        tokio::fs::symlink(available, enabled).await
    }
    #[cfg(not(unix))]
    {
        tokio::fs::copy(available, enabled).await.map(|_| ())
    }
}

/// Put the proxy's site files back the way they were before this attempt.
async fn rollback(available: &Path, enabled: &Path, previous: Option<&str>, was_enabled: bool) {
    let restored = match previous {
        Some(content) => write_atomically(available, content).await,
        None => tokio::fs::remove_file(available).await,
    };
    if let Err(e) = restored {
        tracing::error!(path = %available.display(), "Failed to restore site config: {e}");
    }
    if !was_enabled {
        if let Err(e) = tokio::fs::remove_file(enabled).await {
            tracing::error!(path = %enabled.display(), "Failed to remove site link: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::sh;
    use std::time::Duration;

    fn proxy(root: &Path, test: &str, reload: &str) -> ProxyConfig {
        std::fs::create_dir_all(root.join("available")).unwrap();
        std::fs::create_dir_all(root.join("enabled")).unwrap();
        ProxyConfig {
            sites_available: root.join("available"),
            sites_enabled: root.join("enabled"),
            test_command: sh(test),
            reload_command: sh(reload),
            command_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn rule_routes_the_project_path() {
        let rule = route_rule("abc123", Path::new("/srv/projects/abc123/dist"));
        assert!(rule.starts_with("location /creation/abc123/ {"));
        assert!(rule.contains("alias /srv/projects/abc123/dist/;"));
        assert!(rule.contains("try_files $uri $uri/ /creation/abc123/index.html;"));
        assert!(rule.contains("X-Content-Type-Options nosniff"));
        assert!(rule.contains(r"location ~* \.(js|css|png"));
        assert!(rule.contains("expires 1y;"));
    }

    #[tokio::test]
    async fn publishes_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("reloaded");
        let proxy = proxy(
            dir.path(),
            "true",
            &format!("touch {}", marker.display()),
        );

        let outcome = publish(&proxy, "abc123", Path::new("/srv/abc123/dist")).await;

        assert_eq!(outcome, PublishOutcome::Published);
        let available = proxy.sites_available.join("project-abc123");
        let enabled = proxy.sites_enabled.join("project-abc123");
        assert_eq!(
            std::fs::read_to_string(&enabled).unwrap(),
            std::fs::read_to_string(&available).unwrap()
        );
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn failed_config_test_leaves_no_route_and_skips_reload() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("reloaded");
        let proxy = proxy(
            dir.path(),
            "echo 'emerg: bad directive' >&2; exit 1",
            &format!("touch {}", marker.display()),
        );

        let outcome = publish(&proxy, "abc123", Path::new("/srv/abc123/dist")).await;

        match outcome {
            PublishOutcome::Warning(reason) => assert!(reason.contains("bad directive")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!proxy.sites_available.join("project-abc123").exists());
        assert!(std::fs::symlink_metadata(proxy.sites_enabled.join("project-abc123")).is_err());
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn failed_config_test_restores_the_previous_route() {
        let dir = tempfile::tempdir().unwrap();
        let proxy = proxy(dir.path(), "exit 1", "true");
        let available = proxy.sites_available.join("project-abc123");
        let enabled = proxy.sites_enabled.join("project-abc123");
        std::fs::write(&available, "location /creation/abc123/ { working; }").unwrap();
        std::os::unix::fs::symlink(&available, &enabled).unwrap();

        let outcome = publish(&proxy, "abc123", Path::new("/srv/abc123/dist")).await;

        assert!(matches!(outcome, PublishOutcome::Warning(_)));
        assert_eq!(
            std::fs::read_to_string(&enabled).unwrap(),
            "location /creation/abc123/ { working; }"
        );
    }

    #[tokio::test]
    async fn reload_failure_is_only_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let proxy = proxy(dir.path(), "true", "exit 1");
        let outcome = publish(&proxy, "abc123", Path::new("/srv/abc123/dist")).await;
        assert_eq!(outcome.label(), "warning");
    }

    #[tokio::test]
    async fn missing_config_directory_is_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let proxy = ProxyConfig {
            sites_available: dir.path().join("nope"),
            sites_enabled: dir.path().join("nope-either"),
            test_command: sh("true"),
            reload_command: sh("true"),
            command_timeout: Duration::from_secs(5),
        };
        let outcome = publish(&proxy, "abc123", Path::new("/srv/abc123/dist")).await;
        assert!(matches!(outcome, PublishOutcome::Warning(_)));
    }
}
