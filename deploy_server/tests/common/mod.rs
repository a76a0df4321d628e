//! Shared fixtures for router tests: a scratch-directory config with `sh`
//! standing in for the bundler and nginx, and an in-memory project store.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use site_deploy::config::{DeployConfig, ProxyConfig, ScreenshotConfig};
use site_deploy::routes::{deploy_router, AppState};
use site_deploy::services::deployer::Deployer;
use site_deploy::services::project_store::MemoryProjectStore;

pub const SECRET: &str = "test-secret";

pub fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

pub fn test_config(root: &Path) -> DeployConfig {
    std::fs::create_dir_all(root.join("sites-available")).unwrap();
    std::fs::create_dir_all(root.join("sites-enabled")).unwrap();
    DeployConfig {
        deployment_secret: SECRET.to_string(),
        projects_root: root.join("projects"),
        temp_dir: root.join("tmp"),
        public_base_url: "http://sites.test".to_string(),
        install_command: sh("true"),
        build_command: sh("mkdir -p ../dist/assets && cp index.html ../dist/index.html"),
        install_timeout: Duration::from_secs(10),
        build_timeout: Duration::from_secs(10),
        fix_ownership: false,
        proxy: ProxyConfig {
            sites_available: root.join("sites-available"),
            sites_enabled: root.join("sites-enabled"),
            test_command: sh("true"),
            reload_command: sh("true"),
            command_timeout: Duration::from_secs(5),
        },
        screenshot: ScreenshotConfig {
            api_url: "http://127.0.0.1:9".to_string(),
            api_key: None,
            backoff_unit: Duration::ZERO,
            refresh_pause: Duration::ZERO,
        },
        allowed_origins: Vec::new(),
    }
}

/// Router plus a handle on its store for seeding and inspection.
pub fn build_test_app(config: DeployConfig) -> (Router, Arc<MemoryProjectStore>) {
    let store = Arc::new(MemoryProjectStore::new());
    let deployer = Deployer::new(store.clone(), Arc::new(config));
    (deploy_router(AppState::new(deployer)), store)
}
