use std::cell::RefCell;
use std::time::Duration;

use super::{settle, CommandSpec, FailurePolicy, MarkerHit, ProcessOutput, ProcessRunner};
use crate::error::{ProvisionError, Result};

struct Script {
    needle: String,
    exit_code: i32,
    stdout: String,
}

/// Records every command and answers from scripted responses.
///
/// A command matches a script when its rendered form contains the script's
/// needle; the first match wins. Unmatched commands succeed with no output.
#[derive(Default)]
pub(crate) struct FakeRunner {
    scripts: RefCell<Vec<Script>>,
    calls: RefCell<Vec<String>>,
    marker_timeout: RefCell<bool>,
    on_run: RefCell<Option<Box<dyn Fn(&CommandSpec)>>>,
}

impl FakeRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(self, needle: &str, exit_code: i32, stdout: &str) -> Self {
        self.scripts.borrow_mut().push(Script {
            needle: needle.to_string(),
            exit_code,
            stdout: stdout.to_string(),
        });
        self
    }

    /// Make `run_until_marker` time out instead of seeing a marker.
    pub(crate) fn without_marker(self) -> Self {
        *self.marker_timeout.borrow_mut() = true;
        self
    }

    /// Side effect performed for each `run`, e.g. creating what a real tool would.
    pub(crate) fn on_run(self, hook: impl Fn(&CommandSpec) + 'static) -> Self {
        *self.on_run.borrow_mut() = Some(Box::new(hook));
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub(crate) fn position(&self, needle: &str) -> Option<usize> {
        self.calls.borrow().iter().position(|c| c.contains(needle))
    }

    pub(crate) fn count(&self, needle: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.contains(needle))
            .count()
    }
}

impl ProcessRunner for FakeRunner {
    fn run(&self, spec: &CommandSpec, policy: FailurePolicy) -> Result<ProcessOutput> {
        let command = spec.to_string();
        self.calls.borrow_mut().push(command.clone());
        if let Some(hook) = self.on_run.borrow().as_ref() {
            hook(spec);
        }
        let (exit_code, stdout) = self
            .scripts
            .borrow()
            .iter()
            .find(|s| command.contains(&s.needle))
            .map(|s| (s.exit_code, s.stdout.clone()))
            .unwrap_or((0, String::new()));
        settle(
            ProcessOutput {
                command,
                exit_code: Some(exit_code),
                stdout,
                stderr: String::new(),
                success: exit_code == 0,
            },
            policy,
        )
    }

    fn run_until_marker(
        &self,
        spec: &CommandSpec,
        markers: &[&str],
        timeout: Duration,
    ) -> Result<MarkerHit> {
        let command = spec.to_string();
        self.calls.borrow_mut().push(command.clone());
        if *self.marker_timeout.borrow() {
            return Err(ProvisionError::ProcessTimedOut { command, timeout });
        }
        Ok(MarkerHit {
            marker: markers.first().map(|m| m.to_string()).unwrap_or_default(),
            attempts: 1,
        })
    }
}
