//! Per-project working directories under the project root.

use std::path::{Path, PathBuf};

use ccgw_core::path_guard::{resolve_within_base, validate_within_base};
use tracing::{error, info};

/// Validated `<root>/<project_id>`. `project_id` must be a single path
/// component. The directory is created when a session is admitted.
pub fn project_directory(root: &Path, project_id: &str) -> ccgw_core::Result<PathBuf> {
    validate_within_base(project_id, root, false)
}

/// Remove a project directory. Missing directories are ignored and errors
/// are logged. Returns whether a directory was removed.
pub async fn cleanup_project_directory(root: &Path, project_id: &str) -> ccgw_core::Result<bool> {
    let path = validate_within_base(project_id, root, false)?;
    if path == resolve_within_base(".", root)? {
        return Err(ccgw_core::Error::InvalidPath(
            "refusing to remove the project root".into(),
        ));
    }

    match tokio::fs::remove_dir_all(&path).await {
        Ok(()) => {
            info!(path = %path.display(), "Project directory cleaned up");
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to cleanup project directory");
            Ok(false)
        }
    }
}
