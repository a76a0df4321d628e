//! Manifest and bundler configuration for a materialized project.

use crate::config::DeployConfig;
use crate::error::DeployError;
use crate::services::workspace::Workspace;

pub const MANIFEST_FILE: &str = "package.json";
pub const BUNDLER_CONFIG_FILE: &str = "vite.config.js";

/// Hostnames the dev server answers to: the sandbox platforms' wildcard
/// domains plus loopback.
pub const ALLOWED_HOSTS: &[&str] = &[
    ".e2b.app",
    ".e2b.dev",
    ".vercel.run",
    "localhost",
    "127.0.0.1",
];

pub const DEV_SERVER_PORT: u16 = 5173;

/// Minimal React + Vite manifest for projects that ship without one.
pub fn default_manifest(project_id: &str) -> serde_json::Value {
    serde_json::json!({
        "name": format!("project-{project_id}"),
        "version": "1.0.0",
        "type": "module",
        "scripts": {
            "dev": "vite",
            "build": "vite build",
            "preview": "vite preview"
        },
        "dependencies": {
            "react": "^18.2.0",
            "react-dom": "^18.2.0"
        },
        "devDependencies": {
            "@types/react": "^18.2.66",
            "@types/react-dom": "^18.2.22",
            "@vitejs/plugin-react": "^4.2.1",
            "vite": "^5.2.0"
        }
    })
}

/// Canonical `vite.config.js` for a project.
pub fn bundler_config(project_id: &str, out_dir: &str) -> String {
    let hosts = ALLOWED_HOSTS
        .iter()
        .map(|h| format!("'{h}'"))
        .collect::<Vec<_>>()
        .join(", ");
    let base = DeployConfig::base_path(project_id);
    format!(
        r#"import {{ defineConfig }} from 'vite'
import react from '@vitejs/plugin-react'

export default defineConfig({{
  plugins: [react()],
  build: {{
    outDir: '{out_dir}',
    emptyOutDir: true
  }},
  base: '{base}',
  server: {{
    host: '0.0.0.0',
    port: {DEV_SERVER_PORT},
    strictPort: true,
    hmr: false,
    allowedHosts: [{hosts}]
  }}
}})
"#
    )
}

/// Write the manifest if missing and always overwrite the bundler config.
///
/// A user-supplied bundler config is discarded so every project builds to
/// the same output layout and base path.
pub async fn synthesize(ws: &Workspace, project_id: &str) -> Result<(), DeployError> {
    let manifest_path = ws.source.join(MANIFEST_FILE);
    if !tokio::fs::try_exists(&manifest_path).await.unwrap_or(false) {
        let manifest = serde_json::to_string_pretty(&default_manifest(project_id))
            .map_err(|e| DeployError::ConfigWrite(format!("{MANIFEST_FILE}: {e}")))?;
        tokio::fs::write(&manifest_path, manifest)
            .await
            .map_err(|e| DeployError::ConfigWrite(format!("{MANIFEST_FILE}: {e}")))?;
        tracing::info!(project_id, "Created default package.json");
    }

    let config_path = ws.source.join(BUNDLER_CONFIG_FILE);
    tokio::fs::write(
        &config_path,
        bundler_config(project_id, ws.output_from_source()),
    )
    .await
    .map_err(|e| DeployError::ConfigWrite(format!("{BUNDLER_CONFIG_FILE}: {e}")))?;
    tracing::info!(project_id, "Wrote vite.config.js");

    Ok(())
}
