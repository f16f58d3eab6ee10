//! Database readiness gate.
//!
//! The database counts as ready once the app's own account can log in to its
//! schema. A refused login (too many connections, access denied while the
//! entrypoint is still creating users, unknown database) or a closed socket
//! means it is not ready yet.

use std::fmt;
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use super::mysql::{self, Login};
use crate::cancel::{CancelToken, Deadline};
use crate::config::RequirementsTier;
use crate::error::{ProvisionError, Result};

pub const DEFAULT_DB_PORT: u16 = 3306;

/// Where and as whom the app will connect. The password never shows up in
/// messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl DbTarget {
    pub fn for_tier(tier: RequirementsTier, port: u16) -> Self {
        let (password, database) = match tier {
            RequirementsTier::Basic | RequirementsTier::Full => ("DEVPASSWORD", "dev_db"),
            RequirementsTier::Prod => ("DRUPALPASSENV", "prod"),
            RequirementsTier::Stage => ("DRUPALPASSENV", "stage"),
        };
        Self {
            host: "127.0.0.1".to_string(),
            port,
            user: "dev".to_string(),
            password: password.to_string(),
            database: database.to_string(),
        }
    }
}

impl fmt::Display for DbTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mysql://{}:***@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }
}

pub trait ReadinessProbe {
    /// One attempt. `true` only when the service is ready.
    fn probe(&self, target: &DbTarget) -> bool;
}

/// Logs in over TCP with the target's credentials.
pub struct MysqlProbe {
    timeout: Duration,
}

impl MysqlProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn try_login(&self, target: &DbTarget) -> std::io::Result<Login> {
        let addr: SocketAddr = format!("{}:{}", target.host, target.port)
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        let stream = TcpStream::connect_timeout(&addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        mysql::login(&stream, target)
    }
}

impl Default for MysqlProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl ReadinessProbe for MysqlProbe {
    fn probe(&self, target: &DbTarget) -> bool {
        match self.try_login(target) {
            Ok(Login::Accepted) => true,
            Ok(Login::Unverified) => {
                tracing::info!(%target, "server wants full authentication; password not verified");
                true
            }
            Ok(Login::Refused(message)) => {
                tracing::debug!(%target, %message, "login refused");
                false
            }
            Err(e) => {
                tracing::debug!(%target, error = %e, "probe failed");
                false
            }
        }
    }
}

/// How long and how often to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub interval: Duration,
    pub max_interval: Duration,
}

/// Poll `probe` until it succeeds. The pause doubles after each failure up to
/// `max_interval`. Returns the number of attempts made.
pub fn wait_ready(
    probe: &dyn ReadinessProbe,
    target: &DbTarget,
    policy: &WaitPolicy,
    cancel: &CancelToken,
) -> Result<u32> {
    let started = Instant::now();
    let deadline = Deadline::after(policy.timeout);
    let mut pause = policy.interval;
    let mut attempts = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        attempts += 1;
        if probe.probe(target) {
            tracing::info!(%target, attempts, "database ready");
            return Ok(attempts);
        }

        if deadline.expired() {
            return Err(ProvisionError::ReadinessTimeout {
                target: target.to_string(),
                attempts,
                waited: started.elapsed(),
            });
        }
        if !cancel.sleep(deadline.remaining_within(pause)) {
            return Err(cancelled());
        }
        pause = pause.saturating_mul(2).min(policy.max_interval);
    }
}

fn cancelled() -> ProvisionError {
    ProvisionError::Cancelled {
        stage: "database readiness wait".to_string(),
    }
}

/// Port from `docker port` output (`0.0.0.0:32768`), taken after the last `:`
/// of the last non-empty line.
pub fn parse_port(output: &str) -> Option<u16> {
    let line = output.lines().rev().find(|l| !l.trim().is_empty())?;
    line.trim().rsplit(':').next()?.parse().ok()
}
