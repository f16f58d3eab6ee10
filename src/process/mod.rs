//! External command execution.
//!
//! Every provisioning step that shells out goes through [`ProcessRunner`].
//! Commands are built as argument vectors ([`CommandSpec`]), never as
//! interpolated shell strings. Whether a non-zero exit is fatal is decided per
//! call with [`FailurePolicy`].

pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

use std::convert::Infallible;
use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use crate::cancel::{CancelToken, Deadline};
use crate::console::Console;
use crate::error::{ProvisionError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const BARRIER_RETRY_PAUSE: Duration = Duration::from_secs(1);
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(120);

/// A program plus its arguments and optional working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// Build from a configured prefix such as `docker compose`: the first
    /// word is the program, the rest become leading arguments.
    pub fn from_prefix(prefix: &str) -> Self {
        let mut words = prefix.split_whitespace();
        let program = words.next().unwrap_or("docker-compose");
        let mut spec = Self::new(program);
        spec.args.extend(words.map(str::to_string));
        spec
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(dir) = &self.cwd {
            write!(f, "(cd {}) ", quote(&dir.display().to_string()))?;
        }
        f.write_str(&quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// What a non-zero exit means for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Return `ProcessFailed`.
    FailFast,
    /// Log, return the output with `success == false`, let the flow continue.
    FailSoft,
}

impl FailurePolicy {
    pub fn fail_fast(fail_fast: bool) -> Self {
        if fail_fast {
            FailurePolicy::FailFast
        } else {
            FailurePolicy::FailSoft
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub command: String,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl ProcessOutput {
    pub fn combined(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            (out, "") => out.to_string(),
            ("", err) => err.to_string(),
            (out, err) => format!("{out}\n{err}"),
        }
    }

    /// `ProcessFailed` describing this run.
    pub fn to_error(&self) -> ProvisionError {
        ProvisionError::ProcessFailed {
            command: self.command.clone(),
            exit_code: self.exit_code,
            output: self.combined(),
        }
    }
}

/// The marker seen by [`ProcessRunner::run_until_marker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerHit {
    pub marker: String,
    pub attempts: u32,
}

pub trait ProcessRunner {
    /// Run to completion, streaming output to the console.
    fn run(&self, spec: &CommandSpec, policy: FailurePolicy) -> Result<ProcessOutput>;

    /// Run a long-lived command until one of `markers` appears in its output,
    /// then stop it. A run that exits without a marker is started again until
    /// `timeout` expires.
    fn run_until_marker(
        &self,
        spec: &CommandSpec,
        markers: &[&str],
        timeout: Duration,
    ) -> Result<MarkerHit>;

    /// Run fail-soft even after cancellation was requested. Used to stop
    /// containers on the way out.
    fn run_cleanup(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        self.run(spec, FailurePolicy::FailSoft)
    }
}

/// Runs real processes on the host.
pub struct SystemRunner {
    console: Console,
    timeout: Duration,
    cancel: CancelToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// How a watched child ended.
enum Watched<T> {
    /// Output pipes closed; the exit code once reaped.
    Exited(Option<i32>),
    /// A line matched and the child was stopped.
    Stopped(T),
}

#[derive(Default)]
struct Captured {
    stdout: String,
    stderr: String,
}

impl Captured {
    fn push(&mut self, stream: Stream, line: &str) {
        let buffer = match stream {
            Stream::Stdout => &mut self.stdout,
            Stream::Stderr => &mut self.stderr,
        };
        buffer.push_str(line);
        buffer.push('\n');
    }
}

impl SystemRunner {
    pub fn new(console: Console, timeout: Duration, cancel: CancelToken) -> Self {
        Self {
            console,
            timeout,
            cancel,
        }
    }

    fn spawn(&self, spec: &CommandSpec) -> Result<(Child, Receiver<(Stream, String)>)> {
        let command = spec.to_string();
        tracing::debug!(%command, "spawning");
        let mut child = spec
            .to_command()
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ProvisionError::ProcessSpawn {
                command: command.clone(),
                source,
            })?;

        let (tx, rx) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, Stream::Stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, Stream::Stderr, tx);
        }
        Ok((child, rx))
    }

    /// Pump output until the child closes its pipes, `on_line` picks a line,
    /// the deadline passes, or the operator cancels.
    fn watch<T>(
        &self,
        command: &str,
        child: &mut Child,
        rx: &Receiver<(Stream, String)>,
        (deadline, timeout): (Deadline, Duration),
        captured: &mut Captured,
        mut on_line: impl FnMut(&str) -> Option<T>,
    ) -> Result<Watched<T>> {
        loop {
            if self.cancel.is_cancelled() {
                stop(child);
                return Err(ProvisionError::Cancelled {
                    stage: format!("`{command}`"),
                });
            }
            if deadline.expired() {
                stop(child);
                return Err(ProvisionError::ProcessTimedOut {
                    command: command.to_string(),
                    timeout,
                });
            }

            match rx.recv_timeout(POLL_INTERVAL) {
                Ok((stream, line)) => {
                    self.console.stream_line(&line);
                    captured.push(stream, &line);
                    if let Some(hit) = on_line(&line) {
                        stop(child);
                        return Ok(Watched::Stopped(hit));
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let status = child.wait().map_err(|source| ProvisionError::ProcessSpawn {
            command: command.to_string(),
            source,
        })?;
        Ok(Watched::Exited(status.code()))
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec, policy: FailurePolicy) -> Result<ProcessOutput> {
        let command = spec.to_string();
        let (mut child, rx) = self.spawn(spec)?;
        let mut captured = Captured::default();
        let limit = (Deadline::after(self.timeout), self.timeout);

        let watched = self.watch(&command, &mut child, &rx, limit, &mut captured, |_| {
            None::<Infallible>
        })?;
        let exit_code = match watched {
            Watched::Exited(code) => code,
            Watched::Stopped(never) => match never {},
        };

        let output = ProcessOutput {
            command,
            exit_code,
            success: exit_code == Some(0),
            stdout: captured.stdout,
            stderr: captured.stderr,
        };
        settle(output, policy)
    }

    fn run_until_marker(
        &self,
        spec: &CommandSpec,
        markers: &[&str],
        timeout: Duration,
    ) -> Result<MarkerHit> {
        let command = spec.to_string();
        let limit = (Deadline::after(timeout), timeout);
        let mut attempts = 0;

        loop {
            attempts += 1;
            let (mut child, rx) = self.spawn(spec)?;
            let mut captured = Captured::default();
            let watched = self.watch(&command, &mut child, &rx, limit, &mut captured, |line| {
                markers
                    .iter()
                    .find(|m| line.contains(**m))
                    .map(|m| m.to_string())
            })?;
            match watched {
                Watched::Stopped(marker) => {
                    tracing::debug!(%command, %marker, attempts, "marker seen");
                    return Ok(MarkerHit { marker, attempts });
                }
                Watched::Exited(code) => {
                    tracing::info!(%command, ?code, attempts, "exited before marker; retrying");
                    if !self.cancel.sleep(BARRIER_RETRY_PAUSE) {
                        return Err(ProvisionError::Cancelled {
                            stage: format!("`{command}`"),
                        });
                    }
                }
            }
        }
    }

    fn run_cleanup(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        SystemRunner::new(self.console.clone(), CLEANUP_TIMEOUT, CancelToken::new())
            .run(spec, FailurePolicy::FailSoft)
    }
}

/// Apply the failure policy to a finished command.
pub(crate) fn settle(output: ProcessOutput, policy: FailurePolicy) -> Result<ProcessOutput> {
    if output.success {
        return Ok(output);
    }
    match policy {
        FailurePolicy::FailFast => Err(output.to_error()),
        FailurePolicy::FailSoft => {
            tracing::warn!(
                command = %output.command,
                exit_code = ?output.exit_code,
                "command failed; continuing"
            );
            Ok(output)
        }
    }
}

fn forward_lines<R: Read + Send + 'static>(
    reader: R,
    stream: Stream,
    tx: mpsc::Sender<(Stream, String)>,
) {
    thread::spawn(move || {
        let reader = BufReader::new(reader);
        for line in reader.lines().map_while(std::result::Result::ok) {
            if tx.send((stream, line)).is_err() {
                break;
            }
        }
    });
}

fn stop(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn runner() -> SystemRunner {
        SystemRunner::new(Console::quiet(), Duration::from_secs(10), CancelToken::new())
    }

    #[test]
    fn test_display_quotes_only_when_needed() {
        let spec = CommandSpec::new("drush")
            .args(["site-install", "standard", "--site-name=Docker Drupal"])
            .current_dir("app");
        assert_eq!(
            spec.to_string(),
            "(cd app) drush site-install standard '--site-name=Docker Drupal'"
        );
    }

    #[test]
    fn test_from_prefix_splits_program() {
        let spec = CommandSpec::from_prefix("docker compose").arg("up");
        assert_eq!(spec.program(), "docker");
        assert_eq!(spec.arguments(), ["compose", "up"]);
    }

    #[test]
    fn test_run_captures_stdout() {
        let output = runner()
            .run(
                &CommandSpec::new("sh").args(["-c", "echo hello; echo oops >&2"]),
                FailurePolicy::FailFast,
            )
            .unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "hello\n");
        assert_eq!(output.stderr, "oops\n");
    }

    #[test]
    fn test_fail_fast_raises_process_failed() {
        let err = runner()
            .run(
                &CommandSpec::new("sh").args(["-c", "echo broken; exit 1"]),
                FailurePolicy::FailFast,
            )
            .unwrap_err();
        match err {
            ProvisionError::ProcessFailed {
                exit_code, output, ..
            } => {
                assert_eq!(exit_code, Some(1));
                assert!(output.contains("broken"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_fail_soft_returns_unsuccessful_output() {
        let output = runner()
            .run(
                &CommandSpec::new("sh").args(["-c", "exit 1"]),
                FailurePolicy::FailSoft,
            )
            .unwrap();
        assert!(!output.success);
        assert_eq!(output.exit_code, Some(1));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let err = runner()
            .run(
                &CommandSpec::new("definitely_not_a_real_command_12345"),
                FailurePolicy::FailSoft,
            )
            .unwrap_err();
        assert!(matches!(err, ProvisionError::ProcessSpawn { .. }));
    }

    #[test]
    fn test_timeout_kills_child() {
        let runner =
            SystemRunner::new(Console::quiet(), Duration::from_millis(300), CancelToken::new());
        let started = Instant::now();
        let err = runner
            .run(&CommandSpec::new("sleep").arg("30"), FailurePolicy::FailSoft)
            .unwrap_err();
        assert!(matches!(err, ProvisionError::ProcessTimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_cancelled_runner_stops() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let runner = SystemRunner::new(Console::quiet(), Duration::from_secs(30), cancel);
        let err = runner
            .run(&CommandSpec::new("sleep").arg("30"), FailurePolicy::FailSoft)
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Cancelled { .. }));
    }

    #[test]
    fn test_run_until_marker_stops_long_running_child() {
        let spec = CommandSpec::new("sh").args([
            "-c",
            "echo starting; echo 'Synchronization complete'; sleep 30",
        ]);
        let started = Instant::now();
        let hit = runner()
            .run_until_marker(
                &spec,
                &["Synchronization complete", "finished propagating changes"],
                Duration::from_secs(10),
            )
            .unwrap();
        assert_eq!(hit.marker, "Synchronization complete");
        assert_eq!(hit.attempts, 1);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_huge_timeout_means_no_deadline() {
        let runner =
            SystemRunner::new(Console::quiet(), Duration::from_secs(u64::MAX), CancelToken::new());
        let output = runner
            .run(&CommandSpec::new("sh").args(["-c", "echo ok"]), FailurePolicy::FailFast)
            .unwrap();
        assert_eq!(output.stdout, "ok\n");

        let hit = runner
            .run_until_marker(
                &CommandSpec::new("sh").args(["-c", "echo ready"]),
                &["ready"],
                Duration::from_secs(u64::MAX),
            )
            .unwrap();
        assert_eq!(hit.marker, "ready");
    }

    #[test]
    fn test_run_until_marker_times_out() {
        let spec = CommandSpec::new("sh").args(["-c", "echo nothing here"]);
        let err = runner()
            .run_until_marker(&spec, &["never"], Duration::from_millis(500))
            .unwrap_err();
        assert!(matches!(err, ProvisionError::ProcessTimedOut { .. }));
    }
}
