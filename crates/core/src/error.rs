//! Error types for action primitives and the signal channel.

use std::path::PathBuf;
use thiserror::Error;

use crate::vision::Element;

/// Why an action primitive could not proceed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// The target window no longer exists or reports no client area.
    #[error("window is gone or has no client area")]
    WindowGone,

    /// A computed screen point falls outside the display.
    #[error("point ({x}, {y}) is outside the display")]
    OutOfBounds { x: i32, y: i32 },

    /// A bounded wait ran out of attempts.
    #[error("{0} not found")]
    NotFound(Element),

    /// Slot index outside the pet window.
    #[error("no slot with index {0}")]
    InvalidSlot(usize),

    /// The disconnect watchdog took the instance out of play.
    #[error("instance disconnected")]
    Disconnected,

    /// Operator requested shutdown.
    #[error("stopped by operator")]
    Stopped,
}

impl ActionError {
    /// Errors that end the current workflow instead of skipping one step.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ActionError::WindowGone | ActionError::Disconnected | ActionError::Stopped)
    }
}

/// Failures while consuming a signal file.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed signal file {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

pub type ActionResult<T = ()> = Result<T, ActionError>;
