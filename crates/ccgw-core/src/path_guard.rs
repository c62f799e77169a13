//! Path containment for project directories.
//!
//! User-supplied paths are confined to a base directory in two layers: a
//! lexical check on the raw input, and a containment check on the resolved
//! path after following symlinks. Neither layer is sufficient alone.

use std::path::{Component, Path, PathBuf};

use tracing::warn;

use crate::error::{Error, Result};

/// Resolve `path` against `base` and verify the result stays inside `base`.
///
/// Relative inputs are joined onto `base`; absolute inputs are taken as is.
/// Symlinks along the existing part of the path are resolved before the
/// containment check, so a link pointing outside `base` is rejected.
pub fn resolve_within_base(path: &str, base: &Path) -> Result<PathBuf> {
    if path.trim().is_empty() {
        return Err(Error::InvalidPath("path is required".into()));
    }
    if path.contains('\0') {
        return Err(Error::InvalidPath("null byte detected".into()));
    }

    let base = resolve_lenient(&std::path::absolute(base)?)?;
    let candidate = Path::new(path);
    let candidate = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    };
    let resolved = resolve_lenient(&candidate)?;

    if !resolved.starts_with(&base) {
        warn!(
            path,
            resolved = %resolved.display(),
            base = %base.display(),
            "Path traversal attempt detected"
        );
        return Err(Error::InvalidPath("path traversal detected".into()));
    }

    Ok(resolved)
}

/// Validate `path` within `base` without touching the filesystem.
///
/// With `allow_subpaths = false` the input must be a bare directory name: no
/// absolute paths and no separators.
pub fn validate_within_base(path: &str, base: &Path, allow_subpaths: bool) -> Result<PathBuf> {
    if !allow_subpaths {
        if Path::new(path).is_absolute() {
            return Err(Error::InvalidPath("absolute paths are not allowed".into()));
        }
        if path.chars().any(std::path::is_separator) {
            return Err(Error::InvalidPath("path separators are not allowed".into()));
        }
    }
    resolve_within_base(path, base)
}

/// Validate `path` within `base` and create the directory. Creation is
/// idempotent.
pub fn ensure_directory_within_base(
    path: &str,
    base: &Path,
    allow_subpaths: bool,
) -> Result<PathBuf> {
    let resolved = validate_within_base(path, base, allow_subpaths)?;
    std::fs::create_dir_all(&resolved)?;
    Ok(resolved)
}

/// Resolve symlinks for every existing prefix of `path` and normalize the
/// missing tail lexically. `path` must be absolute.
fn resolve_lenient(path: &Path) -> Result<PathBuf> {
    let mut resolved = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(name) => {
                resolved.push(name);
                match std::fs::canonicalize(&resolved) {
                    Ok(real) => resolved = real,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        return Err(Error::InvalidPath(format!(
                            "path validation failed: {e}"
                        )));
                    }
                }
            }
        }
    }

    Ok(resolved)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn base() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().canonicalize().unwrap();
        (dir, real)
    }

    #[test]
    fn rejects_empty_and_null_byte() {
        let (_dir, base) = base();
        assert!(matches!(
            resolve_within_base("", &base),
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            resolve_within_base("   ", &base),
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            resolve_within_base("a\0b", &base),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn rejects_parent_traversal() {
        assert!(matches!(
            resolve_within_base("../../etc/passwd", Path::new("/tmp/projects")),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn resolves_relative_subpath() {
        let (_dir, base) = base();
        let resolved = resolve_within_base("sub/dir", &base).unwrap();
        assert_eq!(resolved, base.join("sub").join("dir"));
    }

    #[test]
    fn inner_dot_dot_that_stays_inside_is_allowed() {
        let (_dir, base) = base();
        let resolved = resolve_within_base("a/../b", &base).unwrap();
        assert_eq!(resolved, base.join("b"));
    }

    #[test]
    fn base_itself_is_allowed() {
        let (_dir, base) = base();
        assert_eq!(resolve_within_base(".", &base).unwrap(), base);
    }

    #[test]
    fn absolute_path_outside_base_is_rejected() {
        let (_dir, base) = base();
        assert!(resolve_within_base("/etc", &base).is_err());
    }

    #[test]
    fn sibling_with_common_prefix_is_rejected() {
        let (_dir, base) = base();
        let sibling = format!("{}-evil", base.display());
        assert!(resolve_within_base(&sibling, &base).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_is_rejected() {
        let (_dir, base) = base();
        let (_outside_dir, outside) = self::base();
        std::os::unix::fs::symlink(&outside, base.join("link")).unwrap();

        assert!(matches!(
            resolve_within_base("link/secret", &base),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn ensure_directory_rejects_separators_without_subpaths() {
        let (_dir, base) = base();
        assert!(matches!(
            ensure_directory_within_base("a/b", &base, false),
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            ensure_directory_within_base("/abs", &base, false),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn validation_does_not_create_directories() {
        let (_dir, base) = base();
        let path = validate_within_base("proj123", &base, false).unwrap();
        assert_eq!(path, base.join("proj123"));
        assert!(!path.exists());
        assert!(validate_within_base("../up", &base, false).is_err());
    }

    #[test]
    fn ensure_directory_creates_bare_name_idempotently() {
        let (_dir, base) = base();
        let created = ensure_directory_within_base("proj123", &base, false).unwrap();
        assert!(created.is_dir());
        assert_eq!(created, base.join("proj123"));

        let again = ensure_directory_within_base("proj123", &base, false).unwrap();
        assert_eq!(again, created);
    }

    #[test]
    fn ensure_directory_allows_nested_when_permitted() {
        let (_dir, base) = base();
        let created = ensure_directory_within_base("a/b", &base, true).unwrap();
        assert!(created.is_dir());
    }

    #[test]
    fn ensure_directory_rejects_dot_dot_name() {
        let (_dir, base) = base();
        assert!(ensure_directory_within_base("..", &base, false).is_err());
    }
}
