//! Declarative provisioning steps.
//!
//! Bundle variants describe WHAT their tree needs as data ([`Step`]s made of
//! [`Op`]s); the executor in [`crate::executor`] decides HOW and counts what
//! actually changed on disk.
//!
//! # Example
//!
//! ```rust
//! use drudock::component::{dirs, relink, BundleState, Step};
//!
//! let step = Step::new(
//!     BundleState::Scaffolded,
//!     vec![
//!         dirs(["app/repository", "app/shared/files"]),
//!         relink("app/www", "repository"),
//!     ],
//! );
//! assert_eq!(step.ops.len(), 2);
//! ```

use std::fmt;
use std::path::PathBuf;

use crate::process::{CommandSpec, FailurePolicy};

/// Bundle installation states, in the order they are reached.
///
/// Each [`Step`] moves the tree into one of these states. A step may be
/// skipped when what it would produce is already on disk; the state still
/// counts as reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum BundleState {
    NotStarted = 0,
    /// Codebase cloned, created or found in place.
    Fetched = 1,
    /// Directory layout created.
    Scaffolded = 2,
    /// Bundle template files copied in.
    TemplatesPlaced = 3,
    /// Build artifact and web root symlinks pointed at their targets.
    LinksRewired = 4,
    /// Writable paths opened up per the tier's permission profile.
    PermissionsSet = 5,
    Done = 6,
}

impl fmt::Display for BundleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BundleState::NotStarted => "NotStarted",
            BundleState::Fetched => "Fetched",
            BundleState::Scaffolded => "Scaffolded",
            BundleState::TemplatesPlaced => "TemplatesPlaced",
            BundleState::LinksRewired => "LinksRewired",
            BundleState::PermissionsSet => "PermissionsSet",
            BundleState::Done => "Done",
        };
        f.write_str(name)
    }
}

/// A single filesystem or process operation. Paths are absolute or relative
/// to the process working directory; symlink targets are stored verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Create each directory (and parents) that does not exist yet.
    Dirs(Vec<PathBuf>),

    /// Copy a bundle template file into the tree. With `append`, the line is
    /// added after the template content and the result is compared as a whole.
    PlaceTemplate {
        src: PathBuf,
        dst: PathBuf,
        overwrite: bool,
        append: Option<String>,
    },

    /// Copy a template directory tree, adding or refreshing files but never
    /// deleting extras in the destination.
    Mirror { src: PathBuf, dst: PathBuf },

    /// Replace whatever is at `link` with a symlink to `target`.
    Relink { link: PathBuf, target: PathBuf },

    /// Set `mode` on `path` and, for a real directory, everything under it.
    ChmodRecursive { path: PathBuf, mode: u32 },

    /// Run an external command.
    Command {
        spec: CommandSpec,
        policy: FailurePolicy,
    },
}

impl Op {
    /// Short description for logs and failure reports.
    pub fn describe(&self) -> String {
        match self {
            Op::Dirs(paths) => format!("create {} directories", paths.len()),
            Op::PlaceTemplate { dst, .. } => format!("place {}", dst.display()),
            Op::Mirror { dst, .. } => format!("mirror into {}", dst.display()),
            Op::Relink { link, target } => {
                format!("link {} -> {}", link.display(), target.display())
            }
            Op::ChmodRecursive { path, mode } => format!("chmod {mode:o} {}", path.display()),
            Op::Command { spec, .. } => format!("run `{spec}`"),
        }
    }
}

/// The ops that move a tree into `state`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub state: BundleState,
    pub ops: Vec<Op>,
    /// Why the step is already satisfied, if it is.
    pub skip_reason: Option<String>,
    /// Stop at the first failed op; later ops and steps depend on it.
    pub halt_on_failure: bool,
}

impl Step {
    pub fn new(state: BundleState, ops: Vec<Op>) -> Self {
        Self {
            state,
            ops,
            skip_reason: None,
            halt_on_failure: false,
        }
    }

    pub fn skipped(state: BundleState, reason: impl Into<String>) -> Self {
        Self {
            state,
            ops: Vec::new(),
            skip_reason: Some(reason.into()),
            halt_on_failure: false,
        }
    }

    pub fn halting(mut self) -> Self {
        self.halt_on_failure = true;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper functions for readable variant plans
// ─────────────────────────────────────────────────────────────────────────────

pub fn dirs(paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Op {
    Op::Dirs(paths.into_iter().map(Into::into).collect())
}

/// Copy a template, replacing an existing file whose content differs.
pub fn place(src: impl Into<PathBuf>, dst: impl Into<PathBuf>) -> Op {
    Op::PlaceTemplate {
        src: src.into(),
        dst: dst.into(),
        overwrite: true,
        append: None,
    }
}

/// Copy a template only when the destination does not exist yet.
pub fn place_new(src: impl Into<PathBuf>, dst: impl Into<PathBuf>) -> Op {
    Op::PlaceTemplate {
        src: src.into(),
        dst: dst.into(),
        overwrite: false,
        append: None,
    }
}

pub fn place_with_line(
    src: impl Into<PathBuf>,
    dst: impl Into<PathBuf>,
    line: impl Into<String>,
) -> Op {
    Op::PlaceTemplate {
        src: src.into(),
        dst: dst.into(),
        overwrite: true,
        append: Some(line.into()),
    }
}

pub fn mirror(src: impl Into<PathBuf>, dst: impl Into<PathBuf>) -> Op {
    Op::Mirror {
        src: src.into(),
        dst: dst.into(),
    }
}

pub fn relink(link: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Op {
    Op::Relink {
        link: link.into(),
        target: target.into(),
    }
}

pub fn chmod(path: impl Into<PathBuf>, mode: u32) -> Op {
    Op::ChmodRecursive {
        path: path.into(),
        mode,
    }
}

pub fn command(spec: CommandSpec, policy: FailurePolicy) -> Op {
    Op::Command { spec, policy }
}
