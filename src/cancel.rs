use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const SLICE: Duration = Duration::from_millis(100);

/// Shared flag checked by every blocking wait. Set by SIGINT/SIGTERM.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early on cancellation. Returns `false`
    /// when cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Deadline::after(duration);
        loop {
            if self.is_cancelled() {
                return false;
            }
            if deadline.expired() {
                return true;
            }
            thread::sleep(deadline.remaining_within(SLICE));
        }
    }

    /// Route SIGINT and SIGTERM into this token instead of killing the process,
    /// so waits can stop their children and return `Cancelled`.
    pub fn install_signal_handlers(&self) -> std::io::Result<()> {
        for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
            signal_hook::flag::register(signal, Arc::clone(&self.flag))?;
        }
        Ok(())
    }
}

/// When a bounded wait gives up. A timeout too large to add to the current
/// instant means the wait has no deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(timeout),
        }
    }

    pub fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Time left before the deadline, at most `max`.
    pub fn remaining_within(&self, max: Duration) -> Duration {
        match self.at {
            Some(at) => max.min(at.saturating_duration_since(Instant::now())),
            None => max,
        }
    }
}
