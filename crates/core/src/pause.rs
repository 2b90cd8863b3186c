//! Cooperative pause/stop token and the retry strategy every wait loop uses.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::{ActionError, ActionResult};
use crate::logger;
use crate::settings::RetrySettings;
use crate::sleep;

/// Granularity of pause polling and of sliced sleeps.
pub const PAUSE_POLL: Duration = Duration::from_millis(100);

/// Shared pause/stop flags, cloned into every workflow and primitive call.
///
/// Pausing never interrupts an in-flight primitive; it blocks before the next one.
#[derive(Debug, Clone, Default)]
pub struct PauseToken {
    paused: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl PauseToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the pause flag, returning the new state.
    pub fn toggle(&self) -> bool {
        let now = !self.paused.fetch_xor(true, Ordering::AcqRel);
        logger::info(if now { "paused" } else { "resumed" });
        now
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn request_stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Block while paused. Fails once a stop has been requested.
    pub fn checkpoint(&self) -> ActionResult {
        loop {
            if self.is_stopped() {
                return Err(ActionError::Stopped);
            }
            if !self.is_paused() {
                return Ok(());
            }
            thread::sleep(PAUSE_POLL);
        }
    }

    /// Sleep `duration` in slices; time spent paused does not count.
    pub fn sleep(&self, duration: Duration) -> ActionResult {
        let mut remaining = duration;
        self.checkpoint()?;
        while !remaining.is_zero() {
            let step = remaining.min(PAUSE_POLL);
            thread::sleep(step);
            remaining -= step;
            self.checkpoint()?;
        }
        Ok(())
    }
}

/// Poll-forever-with-backoff, cancellable through the [`PauseToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Duration,
    /// None means no ceiling.
    pub max_attempts: Option<u32>,
    pub log_every: u32,
}

impl RetryPolicy {
    pub fn forever(backoff: Duration) -> Self {
        Self { backoff, max_attempts: None, log_every: 20 }
    }

    pub fn attempts(max: u32, backoff: Duration) -> Self {
        Self { backoff, max_attempts: Some(max), log_every: 20 }
    }

    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }

    /// Whether the `attempt`-th miss deserves a progress line.
    pub fn should_log(&self, attempt: u32) -> bool {
        self.log_every > 0 && attempt > 0 && attempt % self.log_every == 0
    }

    pub fn delay(&self) -> Duration {
        sleep::jittered(self.backoff, 0.1)
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(s: RetrySettings) -> Self {
        Self {
            backoff: Duration::from_millis(s.backoff_ms),
            max_attempts: s.max_attempts,
            log_every: s.log_every,
        }
    }
}
