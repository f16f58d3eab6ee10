//! File handlers: Op::PlaceTemplate, Op::Mirror, Op::Relink.
//!
//! Each handler returns how many filesystem mutations it made, so callers can
//! tell a fresh tree from one that already matched.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{ProvisionError, Result};

/// Copy a template file to `dst`.
///
/// With `overwrite == false` an existing destination is left alone. With
/// `overwrite == true` it is rewritten only when its content differs.
pub fn place_template(src: &Path, dst: &Path, overwrite: bool, append: Option<&str>) -> Result<bool> {
    if !src.is_file() {
        return Err(ProvisionError::BundleMissing {
            path: src.to_path_buf(),
        });
    }
    let exists = dst.exists() || dst.is_symlink();
    if exists && !overwrite {
        return Ok(false);
    }

    let mut content = fs::read(src).map_err(|e| ProvisionError::fs("reading", src, e))?;
    if let Some(line) = append {
        if !content.is_empty() && !content.ends_with(b"\n") {
            content.push(b'\n');
        }
        content.extend_from_slice(line.as_bytes());
        content.push(b'\n');
    }

    if exists {
        if let Ok(current) = fs::read(dst) {
            if current == content {
                return Ok(false);
            }
        }
    }

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| ProvisionError::fs("creating", parent, e))?;
    }
    fs::write(dst, &content).map_err(|e| ProvisionError::fs("writing", dst, e))?;
    Ok(true)
}

/// Copy the tree at `src` into `dst`, preserving symlinks.
///
/// Files already identical in `dst` are not touched and extra files in `dst`
/// are kept.
pub fn mirror(src: &Path, dst: &Path) -> Result<usize> {
    if !src.is_dir() {
        return Err(ProvisionError::BundleMissing {
            path: src.to_path_buf(),
        });
    }

    let mut mutations = 0;
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| src.to_path_buf());
            ProvisionError::fs("walking", path, e.into())
        })?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map(PathBuf::from)
            .unwrap_or_default();
        let target = dst.join(&relative);
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            let link_target = fs::read_link(entry.path())
                .map_err(|e| ProvisionError::fs("reading link", entry.path(), e))?;
            if relink(&link_target, &target)? {
                mutations += 1;
            }
        } else if file_type.is_dir() {
            if !target.is_dir() {
                fs::create_dir_all(&target)
                    .map_err(|e| ProvisionError::fs("creating", &target, e))?;
                mutations += 1;
            }
        } else if copy_if_changed(entry.path(), &target)? {
            mutations += 1;
        }
    }
    Ok(mutations)
}

fn copy_if_changed(src: &Path, dst: &Path) -> Result<bool> {
    let content = fs::read(src).map_err(|e| ProvisionError::fs("reading", src, e))?;
    if let Ok(current) = fs::read(dst) {
        if current == content {
            return Ok(false);
        }
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| ProvisionError::fs("creating", parent, e))?;
    }
    fs::copy(src, dst).map_err(|e| ProvisionError::fs("copying", src, e))?;
    Ok(true)
}

/// Point `link` at `target`, replacing any file, directory or symlink there.
///
/// A symlink that already points at `target` is left alone. The directory
/// holding `link` must already exist: links go into trees something else
/// produced, and a missing parent means that producer failed.
pub fn relink(target: &Path, link: &Path) -> Result<bool> {
    if link.is_symlink() {
        if let Ok(current) = fs::read_link(link) {
            if current == target {
                return Ok(false);
            }
        }
    }

    if let Some(parent) = link.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.is_dir() {
            return Err(ProvisionError::fs(
                "linking",
                link,
                io::Error::new(io::ErrorKind::NotFound, "parent directory does not exist"),
            ));
        }
    }
    remove_node(link)?;
    std::os::unix::fs::symlink(target, link).map_err(|e| ProvisionError::fs("linking", link, e))?;
    Ok(true)
}

/// Remove whatever is at `path`. Missing paths are fine.
fn remove_node(path: &Path) -> Result<()> {
    let Ok(meta) = fs::symlink_metadata(path) else {
        return Ok(());
    };
    let removed = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    removed.map_err(|e| ProvisionError::fs("removing", path, e))
}

/// Relative path from directory `from` to `to`. Both must be expressed from
/// the same base (both absolute, or both relative to one directory).
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<_> = from.components().collect();
    let to: Vec<_> = to.components().collect();
    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut path = PathBuf::new();
    for _ in common..from.len() {
        path.push("..");
    }
    for component in &to[common..] {
        path.push(component.as_os_str());
    }
    if path.as_os_str().is_empty() {
        path.push(".");
    }
    path
}
