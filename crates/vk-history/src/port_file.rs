use std::path::{Path, PathBuf};

use tokio::fs;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3000/api";

/// Where a running server records the port it bound.
pub fn port_file_path(temp_dir: &Path) -> PathBuf {
    temp_dir.join("vibe-kanban").join("vibe-kanban.port")
}

/// Port of the most recently started server, if its port file is readable.
pub async fn read_port_file(temp_dir: &Path) -> Option<u16> {
    let path = port_file_path(temp_dir);
    let contents = match fs::read_to_string(&path).await {
        Ok(contents) => contents,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "no port file");
            return None;
        }
    };
    match contents.trim().parse() {
        Ok(port) => Some(port),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "ignoring malformed port file");
            None
        }
    }
}

/// An explicit URL wins; otherwise a discovered port; otherwise the default.
pub async fn resolve_base_url(explicit: Option<String>, temp_dir: &Path) -> String {
    if let Some(url) = explicit {
        return url;
    }
    match read_port_file(temp_dir).await {
        Some(port) => {
            tracing::debug!(port, "using port from port file");
            format!("http://127.0.0.1:{port}/api")
        }
        None => DEFAULT_API_URL.to_string(),
    }
}
