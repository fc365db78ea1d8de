//! Server lifecycle states.
//!
//! ```text
//! Created ──bind──▶ Listening ──accept loop──▶ Serving ──signal/cancel──▶ ShuttingDown ──▶ Stopped
//!    │                                            │
//!    └────────────bind failed─────────────────────┴──accept failed──────────────────────▶ Stopped
//! ```
//!
//! `Stopped` is terminal. Only forward transitions are possible.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Where a server is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ServerState {
    /// Configured, socket not yet bound.
    Created = 0,
    /// Listen socket bound.
    Listening = 1,
    /// Accept loop running.
    Serving = 2,
    /// No longer accepting; draining in-flight requests.
    ShuttingDown = 3,
    /// Terminal.
    Stopped = 4,
}

impl ServerState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Listening,
            2 => Self::Serving,
            3 => Self::ShuttingDown,
            _ => Self::Stopped,
        }
    }

    /// Returns the state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Listening => "listening",
            Self::Serving => "serving",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, atomically updated [`ServerState`].
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    /// Creates a cell in [`ServerState::Created`].
    #[must_use]
    pub fn new() -> Self {
        Self(AtomicU8::new(ServerState::Created as u8))
    }

    /// Returns the current state.
    #[must_use]
    pub fn get(&self) -> ServerState {
        ServerState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves from `from` to `to`. Returns `false` if the current state
    /// was not `from` or `to` would go backwards.
    pub fn transition(&self, from: ServerState, to: ServerState) -> bool {
        if to <= from {
            return false;
        }

        let moved = self
            .0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if moved {
            tracing::debug!(from = %from, to = %to, "server state changed");
        }
        moved
    }

    /// Moves to [`ServerState::Stopped`] from any state.
    pub fn stop(&self) {
        let prev = ServerState::from_u8(self.0.swap(ServerState::Stopped as u8, Ordering::AcqRel));
        if prev != ServerState::Stopped {
            tracing::debug!(from = %prev, to = %ServerState::Stopped, "server state changed");
        }
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
