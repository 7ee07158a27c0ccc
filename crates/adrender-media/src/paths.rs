//! Path safety checks for client-supplied local paths.
//!
//! Any path accepted from a client must be absolute, rooted under one of
//! the configured allowed directories, and free of parent-directory
//! traversal segments. Checks run before the resolver ever touches the
//! filesystem.

use std::path::{Component, Path, PathBuf};

use crate::error::{MediaError, MediaResult};

/// Validate a client-supplied local path against the allowed roots.
///
/// Returns the path as a `PathBuf` on success.
pub fn verify_allowed_path(value: &str, allowed_roots: &[PathBuf]) -> MediaResult<PathBuf> {
    let path = Path::new(value);

    if !path.is_absolute() {
        return Err(MediaError::security_violation(format!(
            "path is not absolute: {value}"
        )));
    }

    if path
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(MediaError::security_violation(format!(
            "path contains a parent-directory segment: {value}"
        )));
    }

    if !allowed_roots.iter().any(|root| path.starts_with(root)) {
        return Err(MediaError::security_violation(format!(
            "path is outside the allowed directories: {value}"
        )));
    }

    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roots() -> Vec<PathBuf> {
        vec![PathBuf::from("/data/uploads"), PathBuf::from("/data/outputs")]
    }

    #[test]
    fn test_accepts_path_under_allowed_root() {
        let path = verify_allowed_path("/data/uploads/clip.mp4", &roots()).unwrap();
        assert_eq!(path, PathBuf::from("/data/uploads/clip.mp4"));
    }

    #[test]
    fn test_rejects_relative_path() {
        assert!(verify_allowed_path("uploads/clip.mp4", &roots()).is_err());
    }

    #[test]
    fn test_rejects_traversal() {
        assert!(verify_allowed_path("/data/uploads/../../etc/passwd", &roots()).is_err());
    }

    #[test]
    fn test_rejects_path_outside_roots() {
        assert!(verify_allowed_path("/etc/passwd", &roots()).is_err());
        assert!(verify_allowed_path("/data/other/clip.mp4", &roots()).is_err());
    }
}
