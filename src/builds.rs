use std::fmt;
use std::fs;
use std::path::Path;

use time::OffsetDateTime;

use crate::error::{ProvisionError, Result};

/// Identifier of one build, `YYYY-MM-DD--HH-MM-SS`, naming `builds/<id>/public`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BuildId(String);

impl BuildId {
    /// A fresh id from the local clock (UTC when the offset is unknown).
    pub fn now() -> Self {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        Self::from_datetime(now)
    }

    pub fn from_datetime(at: OffsetDateTime) -> Self {
        BuildId(format!(
            "{:04}-{:02}-{:02}--{:02}-{:02}-{:02}",
            at.year(),
            at.month() as u8,
            at.day(),
            at.hour(),
            at.minute(),
            at.second()
        ))
    }

    /// Accept an id recorded in the config. Anything usable as a single
    /// path component is kept so older records still name their directory.
    pub fn from_config(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw == "." || raw == ".." || raw.contains('/') {
            return None;
        }
        Some(BuildId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_timestamped(&self) -> bool {
        let bytes = self.0.as_bytes();
        if bytes.len() != 20 {
            return false;
        }
        bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 | 10 | 11 | 14 | 17 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build directories present under `builds_dir`, oldest first.
pub fn list_builds(builds_dir: &Path) -> Result<Vec<BuildId>> {
    if !builds_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut builds = Vec::new();
    for entry in
        fs::read_dir(builds_dir).map_err(|e| ProvisionError::fs("reading", builds_dir, e))?
    {
        let entry = entry.map_err(|e| ProvisionError::fs("reading", builds_dir, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|part| part.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        if let Some(id) = BuildId::from_config(name) {
            builds.push(id);
        }
    }
    builds.sort();
    Ok(builds)
}
