//! Top-level commands the binary dispatches to.
//!
//! Each command takes its collaborators explicitly so the whole flow can run
//! against a fake runner and probe.

pub mod build;
pub mod redis;
pub mod restart;

use crate::cancel::CancelToken;
use crate::containers::readiness::ReadinessProbe;
use crate::process::ProcessRunner;
use crate::source::Prompt;

/// The outside world as seen by a command.
pub struct Services<'a> {
    pub runner: &'a dyn ProcessRunner,
    pub prompt: &'a dyn Prompt,
    pub probe: &'a dyn ReadinessProbe,
    pub cancel: CancelToken,
}
