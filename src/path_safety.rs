use std::path::{Path, PathBuf};

use crate::error::{DeployerError, Result};

/// Normalizes a user-supplied path and ensures it stays within `root`.
///
/// The manifest loader calls this for every template path a `config.yaml`
/// names, so a crafted `template: ../../../../etc/passwd` can't read outside
/// the project tree it was loaded from.
pub fn normalize_under_root(root: &Path, candidate: &Path) -> Result<PathBuf> {
    if candidate.is_absolute() {
        return Err(DeployerError::Load(format!(
            "absolute paths are not allowed: {}",
            candidate.display()
        )));
    }

    let root_canon = root
        .canonicalize()
        .map_err(|err| DeployerError::Load(format!("failed to canonicalize {}: {err}", root.display())))?;
    let joined = root_canon.join(candidate);
    let canon = joined
        .canonicalize()
        .map_err(|err| DeployerError::Load(format!("failed to canonicalize {}: {err}", joined.display())))?;

    if !canon.starts_with(&root_canon) {
        return Err(DeployerError::Load(format!(
            "path escapes root ({}): {}",
            root_canon.display(),
            canon.display()
        )));
    }

    Ok(canon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn rejects_absolute_paths() {
        let root = tempfile::tempdir().unwrap();
        let err = normalize_under_root(root.path(), Path::new("/etc/passwd")).unwrap_err();
        assert!(matches!(err, DeployerError::Load(_)));
    }

    #[test]
    fn rejects_paths_that_escape_root() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("sub")).unwrap();
        let escape = Path::new("sub/../../outside");
        let _ = fs::write(root.path().join("sub/marker"), "x");
        let err = normalize_under_root(root.path(), escape);
        assert!(err.is_err());
    }

    #[test]
    fn accepts_paths_within_root() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("template.json"), "{}").unwrap();
        let resolved = normalize_under_root(root.path(), Path::new("template.json")).unwrap();
        assert!(resolved.starts_with(root.path().canonicalize().unwrap()));
    }
}
