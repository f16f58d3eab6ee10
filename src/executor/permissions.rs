//! Op::ChmodRecursive.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::{ProvisionError, Result};

/// Set `mode` on `path` (following a symlink) and, when `path` is a real
/// directory, on every entry beneath it. Symlinks inside the tree are not
/// followed. Returns how many modes actually changed.
pub fn chmod_recursive(path: &Path, mode: u32) -> Result<usize> {
    let mut changed = usize::from(set_mode(path, mode)?);

    let is_real_dir = fs::symlink_metadata(path)
        .map(|meta| meta.is_dir())
        .unwrap_or(false);
    if !is_real_dir {
        return Ok(changed);
    }

    for entry in WalkDir::new(path).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| {
            let at = e.path().map(Path::to_path_buf).unwrap_or_else(|| path.to_path_buf());
            ProvisionError::fs("walking", at, e.into())
        })?;
        if entry.file_type().is_symlink() {
            continue;
        }
        if set_mode(entry.path(), mode)? {
            changed += 1;
        }
    }
    Ok(changed)
}

fn set_mode(path: &Path, mode: u32) -> Result<bool> {
    let meta = fs::metadata(path).map_err(|e| ProvisionError::fs("chmod", path, e))?;
    if meta.permissions().mode() & 0o7777 == mode {
        return Ok(false);
    }
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| ProvisionError::fs("chmod", path, e))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mode_of(path: &Path) -> u32 {
        fs::metadata(path).unwrap().permissions().mode() & 0o7777
    }

    #[test]
    fn test_chmod_recursive_applies_to_tree() {
        let temp = TempDir::new().unwrap();
        let files = temp.path().join("files");
        fs::create_dir_all(files.join("styles")).unwrap();
        fs::write(files.join("styles/a.css"), "").unwrap();

        let changed = chmod_recursive(&files, 0o777).unwrap();

        assert_eq!(changed, 3);
        assert_eq!(mode_of(&files), 0o777);
        assert_eq!(mode_of(&files.join("styles")), 0o777);
        assert_eq!(mode_of(&files.join("styles/a.css")), 0o777);
    }

    #[test]
    fn test_chmod_recursive_idempotent() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("settings.php");
        fs::write(&file, "<?php").unwrap();

        assert_eq!(chmod_recursive(&file, 0o644).unwrap() + chmod_recursive(&file, 0o755).unwrap(), 2);
        assert_eq!(chmod_recursive(&file, 0o755).unwrap(), 0);
    }

    #[test]
    fn test_chmod_follows_top_level_symlink_only() {
        let temp = TempDir::new().unwrap();
        let shared = temp.path().join("shared/files");
        fs::create_dir_all(&shared).unwrap();
        fs::write(shared.join("keep.txt"), "").unwrap();
        fs::set_permissions(shared.join("keep.txt"), fs::Permissions::from_mode(0o600)).unwrap();
        let link = temp.path().join("files");
        std::os::unix::fs::symlink(&shared, &link).unwrap();

        chmod_recursive(&link, 0o775).unwrap();

        assert_eq!(mode_of(&shared), 0o775);
        assert_eq!(mode_of(&shared.join("keep.txt")), 0o600);
    }

    #[test]
    fn test_chmod_missing_path() {
        let temp = TempDir::new().unwrap();
        let err = chmod_recursive(&temp.path().join("missing"), 0o777).unwrap_err();
        assert!(matches!(err, ProvisionError::Filesystem { .. }));
    }
}
