//! Directory creation for Op::Dirs.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ProvisionError;

/// Outcome of [`ensure_directories`]: how many were created and which failed.
#[derive(Debug, Default)]
pub struct DirectoryReport {
    pub created: usize,
    pub failures: Vec<ProvisionError>,
}

impl DirectoryReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Create every missing directory in `paths`.
///
/// A failing path does not stop the others; each failure is reported as
/// `DirectoryCreateFailed`.
pub fn ensure_directories(paths: &[PathBuf]) -> DirectoryReport {
    let mut report = DirectoryReport::default();
    for path in paths {
        match ensure_directory(path) {
            Ok(true) => report.created += 1,
            Ok(false) => {}
            Err(source) => {
                tracing::warn!(path = %path.display(), error = %source, "directory create failed");
                report.failures.push(ProvisionError::DirectoryCreateFailed {
                    path: path.clone(),
                    source,
                });
            }
        }
    }
    report
}

/// Returns whether the directory had to be created.
fn ensure_directory(path: &Path) -> std::io::Result<bool> {
    if path.is_dir() {
        return Ok(false);
    }
    fs::create_dir_all(path)?;
    Ok(true)
}
