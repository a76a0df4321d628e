//! Deployment service configuration, loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct DeployConfig {
    /// Shared secret expected as the bearer token on job intake.
    pub deployment_secret: String,
    /// Directory holding one workspace per project.
    pub projects_root: PathBuf,
    /// Scratch directory for decoded archive payloads.
    pub temp_dir: PathBuf,
    /// Public origin that published projects are served from.
    pub public_base_url: String,
    /// Dependency install command, run inside the `source` subtree.
    pub install_command: Vec<String>,
    /// Build command, run inside the `source` subtree.
    pub build_command: Vec<String>,
    pub install_timeout: Duration,
    pub build_timeout: Duration,
    /// Hand the whole workspace to the service user after creating it.
    pub fix_ownership: bool,
    pub proxy: ProxyConfig,
    pub screenshot: ScreenshotConfig,
    /// CORS origins, defaulting to the local editor; empty allows any origin.
    pub allowed_origins: Vec<String>,
}

/// Reverse-proxy wiring for published projects.
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    pub sites_available: PathBuf,
    pub sites_enabled: PathBuf,
    /// Validates the full proxy configuration (e.g. `nginx -t`).
    pub test_command: Vec<String>,
    /// Reloads the live proxy once validation passed.
    pub reload_command: Vec<String>,
    pub command_timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct ScreenshotConfig {
    pub api_url: String,
    /// Without a key every capture falls back to the placeholder.
    pub api_key: Option<String>,
    /// Unit of the attempt-proportional backoff.
    pub backoff_unit: Duration,
    /// Pause between projects during a bulk thumbnail refresh.
    pub refresh_pause: Duration,
}

impl DeployConfig {
    pub fn from_env() -> Self {
        let deployment_secret =
            std::env::var("DEPLOYMENT_SECRET").unwrap_or_else(|_| "dev-secret".to_string());
        let projects_root = env_path("PROJECTS_ROOT", "/var/www/vibeapp/projects");
        let temp_dir = std::env::var("DEPLOY_TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir());
        let public_base_url = std::env::var("PROJECT_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());
        let install_command = env_command("DEPLOY_INSTALL_CMD", "npm install --include=dev");
        let build_command = env_command("DEPLOY_BUILD_CMD", "npm run build");
        let install_timeout = Duration::from_secs(env_parse("DEPLOY_INSTALL_TIMEOUT_SECS", 120));
        let build_timeout = Duration::from_secs(env_parse("DEPLOY_BUILD_TIMEOUT_SECS", 180));
        let fix_ownership = env_parse("DEPLOY_FIX_OWNERSHIP", false);

        let proxy = ProxyConfig {
            sites_available: env_path("NGINX_SITES_AVAILABLE", "/etc/nginx/sites-available"),
            sites_enabled: env_path("NGINX_SITES_ENABLED", "/etc/nginx/sites-enabled"),
            test_command: env_command("NGINX_TEST_CMD", "sudo nginx -t"),
            reload_command: env_command("NGINX_RELOAD_CMD", "sudo systemctl reload nginx"),
            command_timeout: Duration::from_secs(env_parse("NGINX_CMD_TIMEOUT_SECS", 30)),
        };

        let screenshot = ScreenshotConfig {
            api_url: std::env::var("FIRECRAWL_API_URL")
                .unwrap_or_else(|_| "https://api.firecrawl.dev".to_string()),
            api_key: std::env::var("FIRECRAWL_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            backoff_unit: Duration::from_millis(env_parse("SCREENSHOT_BACKOFF_MS", 3000)),
            refresh_pause: Duration::from_millis(env_parse("THUMBNAIL_REFRESH_PAUSE_MS", 3000)),
        };

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_else(|_| vec!["http://localhost:5173".to_string()]);

        if std::env::var("DEPLOYMENT_SECRET").is_err() {
            tracing::warn!("DEPLOYMENT_SECRET not set -- using the development secret");
        }
        if screenshot.api_key.is_none() {
            tracing::warn!("FIRECRAWL_API_KEY not set -- thumbnails will be placeholders");
        }

        Self {
            deployment_secret,
            projects_root,
            temp_dir,
            public_base_url,
            install_command,
            build_command,
            install_timeout,
            build_timeout,
            fix_ownership,
            proxy,
            screenshot,
            allowed_origins,
        }
    }

    /// Public path segment a project is served under.
    pub fn base_path(project_id: &str) -> String {
        format!("/creation/{project_id}/")
    }

    /// Public address of a deployed project.
    pub fn public_url(&self, project_id: &str) -> String {
        format!(
            "{}/creation/{project_id}",
            self.public_base_url.trim_end_matches('/')
        )
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Commands are kept as argument vectors and never handed to a shell.
fn env_command(key: &str, default: &str) -> Vec<String> {
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    split_command(&raw)
}

pub fn split_command(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}
