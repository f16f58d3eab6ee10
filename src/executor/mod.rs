//! Op executor: interprets [`Op`] values against the real filesystem.
//!
//! Every handler is idempotent. Re-applying the same ops to a tree they
//! already produced reports zero mutations.
//!
//! # Usage
//!
//! ```rust,ignore
//! use drudock::component::{dirs, relink};
//! use drudock::executor::Scaffolder;
//!
//! let scaffolder = Scaffolder::new(&runner, &console);
//! let report = scaffolder.apply(&[dirs(["app/repository"]), relink("app/www", "repository")])?;
//! assert!(report.is_clean());
//! ```

pub mod directories;
pub mod files;
pub mod permissions;

use crate::component::{Op, Step};
use crate::console::Console;
use crate::error::{ProvisionError, Result};
use crate::process::ProcessRunner;

/// What applying a batch of ops changed and what went wrong along the way.
#[derive(Debug, Default)]
pub struct ScaffoldReport {
    pub mutations: usize,
    pub failures: Vec<ProvisionError>,
    /// A halting step hit a failure; its remaining ops were not applied.
    pub halted: bool,
}

impl ScaffoldReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn merge(&mut self, other: ScaffoldReport) {
        self.mutations += other.mutations;
        self.failures.extend(other.failures);
        self.halted |= other.halted;
    }
}

/// Applies ops best-effort: filesystem failures and fail-soft command
/// failures are recorded and the next op runs. Anything the runner itself
/// returns as an error (a `FailFast` failure, a timeout, a cancellation) ends
/// the batch.
pub struct Scaffolder<'a> {
    runner: &'a dyn ProcessRunner,
    console: &'a Console,
}

impl<'a> Scaffolder<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, console: &'a Console) -> Self {
        Self { runner, console }
    }

    pub fn apply(&self, ops: &[Op]) -> Result<ScaffoldReport> {
        self.apply_ops(ops, false)
    }

    pub fn apply_step(&self, step: &Step) -> Result<ScaffoldReport> {
        if let Some(reason) = &step.skip_reason {
            tracing::info!(state = %step.state, %reason, "skipping");
            return Ok(ScaffoldReport::default());
        }
        let report = self.apply_ops(&step.ops, step.halt_on_failure)?;
        if report.halted {
            tracing::warn!(state = %step.state, "step halted; later steps not applied");
        }
        Ok(report)
    }

    fn apply_ops(&self, ops: &[Op], halt_on_failure: bool) -> Result<ScaffoldReport> {
        let mut report = ScaffoldReport::default();
        for op in ops {
            tracing::debug!(op = %op.describe(), "applying");
            let (changed, failures) = match op {
                Op::Command { spec, policy } => {
                    let output = self.runner.run(spec, *policy)?;
                    if output.success {
                        (1, Vec::new())
                    } else {
                        (0, vec![output.to_error()])
                    }
                }
                _ => apply_fs_op(op),
            };

            report.mutations += changed;
            let failed = !failures.is_empty();
            for err in failures {
                self.console.warning(&err.to_string());
                report.failures.push(err);
            }
            if failed && halt_on_failure {
                report.halted = true;
                break;
            }
        }
        Ok(report)
    }
}

/// Mutations made and failures hit. Only `Dirs` can fail more than once.
fn apply_fs_op(op: &Op) -> (usize, Vec<ProvisionError>) {
    let applied = match op {
        Op::Dirs(paths) => {
            let report = directories::ensure_directories(paths);
            return (report.created, report.failures);
        }
        Op::PlaceTemplate {
            src,
            dst,
            overwrite,
            append,
        } => files::place_template(src, dst, *overwrite, append.as_deref()).map(usize::from),
        Op::Mirror { src, dst } => files::mirror(src, dst),
        Op::Relink { link, target } => files::relink(target, link).map(usize::from),
        Op::ChmodRecursive { path, mode } => permissions::chmod_recursive(path, *mode),
        Op::Command { .. } => Ok(0),
    };
    match applied {
        Ok(changed) => (changed, Vec::new()),
        Err(err) => (0, vec![err]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{chmod, command, dirs, mirror, place, relink, BundleState};
    use crate::process::testing::FakeRunner;
    use crate::process::{CommandSpec, FailurePolicy};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn temp_dirs() -> (TempDir, PathBuf, PathBuf) {
        let temp = TempDir::new().unwrap();
        let bundle = temp.path().join("bundle");
        let app = temp.path().join("app");
        fs::create_dir_all(&bundle).unwrap();
        (temp, bundle, app)
    }

    #[test]
    fn test_apply_then_reapply_is_zero_mutations() {
        let (_temp, bundle, app) = temp_dirs();
        fs::write(bundle.join("robots.txt"), "User-agent: *").unwrap();
        fs::write(bundle.join("index.php"), "<?php").unwrap();
        let ops = vec![
            dirs([app.join("repository"), app.join("shared/files")]),
            place(bundle.join("robots.txt"), app.join("repository/robots.txt")),
            mirror(&bundle, app.join("mirror")),
            relink(app.join("www"), "repository"),
            chmod(app.join("shared/files"), 0o777),
        ];
        let runner = FakeRunner::new();
        let console = Console::quiet();
        let scaffolder = Scaffolder::new(&runner, &console);

        let first = scaffolder.apply(&ops).unwrap();
        assert!(first.is_clean());
        assert!(first.mutations > 0);

        let second = scaffolder.apply(&ops).unwrap();
        assert!(second.is_clean());
        assert_eq!(second.mutations, 0);
    }

    #[test]
    fn test_failures_are_recorded_and_later_ops_run() {
        let (_temp, bundle, app) = temp_dirs();
        let ops = vec![
            place(bundle.join("missing.txt"), app.join("missing.txt")),
            dirs([app.join("repository")]),
        ];
        let runner = FakeRunner::new();
        let console = Console::quiet();

        let report = Scaffolder::new(&runner, &console).apply(&ops).unwrap();

        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            report.failures[0],
            ProvisionError::BundleMissing { .. }
        ));
        assert!(app.join("repository").is_dir());
    }

    #[test]
    fn test_dirs_reports_every_failure() {
        let (_temp, _bundle, app) = temp_dirs();
        fs::create_dir_all(&app).unwrap();
        fs::write(app.join("blocked"), "x").unwrap();
        let ops = vec![dirs([
            app.join("blocked/one"),
            app.join("fine"),
            app.join("blocked/two"),
        ])];
        let runner = FakeRunner::new();
        let console = Console::quiet();

        let report = Scaffolder::new(&runner, &console).apply(&ops).unwrap();

        assert_eq!(report.mutations, 1);
        assert_eq!(report.failures.len(), 2);
        assert!(report
            .failures
            .iter()
            .all(|f| matches!(f, ProvisionError::DirectoryCreateFailed { .. })));
        assert!(app.join("fine").is_dir());
    }

    #[test]
    fn test_halting_step_stops_at_failed_command() {
        let (_temp, _bundle, app) = temp_dirs();
        let runner = FakeRunner::new().respond("drush make", 1, "");
        let console = Console::quiet();
        let step = Step::new(
            BundleState::LinksRewired,
            vec![
                command(CommandSpec::new("drush").arg("make"), FailurePolicy::FailSoft),
                dirs([app.join("after")]),
            ],
        )
        .halting();

        let report = Scaffolder::new(&runner, &console).apply_step(&step).unwrap();

        assert!(report.halted);
        assert_eq!(report.failures.len(), 1);
        assert!(!app.join("after").exists());
    }

    #[test]
    fn test_fail_soft_command_is_recorded() {
        let runner = FakeRunner::new().respond("drush make", 1, "");
        let console = Console::quiet();
        let ops = vec![command(
            CommandSpec::new("drush").arg("make"),
            FailurePolicy::FailSoft,
        )];

        let report = Scaffolder::new(&runner, &console).apply(&ops).unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.mutations, 0);
    }

    #[test]
    fn test_fail_fast_command_aborts() {
        let runner = FakeRunner::new().respond("composer", 2, "");
        let console = Console::quiet();
        let ops = vec![
            command(CommandSpec::new("composer"), FailurePolicy::FailFast),
            dirs(["never-created"]),
        ];

        let err = Scaffolder::new(&runner, &console).apply(&ops).unwrap_err();

        assert!(matches!(err, ProvisionError::ProcessFailed { .. }));
    }

    #[test]
    fn test_skipped_step_runs_nothing() {
        let runner = FakeRunner::new();
        let console = Console::quiet();
        let step = Step::skipped(BundleState::Scaffolded, "already there");

        let report = Scaffolder::new(&runner, &console).apply_step(&step).unwrap();

        assert_eq!(report.mutations, 0);
        assert!(runner.calls().is_empty());
    }
}
