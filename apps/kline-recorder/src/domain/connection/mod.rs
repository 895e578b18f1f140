//! Feed connection lifecycle states.

use std::fmt;

use serde::Serialize;

/// Lifecycle state of the upstream feed connection.
///
/// ```text
/// Disconnected ──► Connecting ──► Connected
///      ▲               │              │
///      └───────────────┴──────────────┘
///
/// any ──► Closing ──► Terminated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No socket; waiting to (re)connect.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Socket open, frames flowing.
    Connected,
    /// Shutdown requested, closing the socket.
    Closing,
    /// Task has exited.
    Terminated,
}

impl ConnectionState {
    /// Lowercase label used in logs, metrics and the health endpoint.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
            Self::Terminated => "terminated",
        }
    }

    /// Numeric code exported on the connection state gauge.
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
            Self::Closing => 3,
            Self::Terminated => 4,
        }
    }

    /// Whether the state machine permits moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Terminated, _) => false,
            (Self::Closing, next) => matches!(next, Self::Terminated),
            (_, Self::Closing) => true,
            (Self::Disconnected, Self::Connecting)
            | (Self::Connecting, Self::Connected | Self::Disconnected)
            | (Self::Connected, Self::Disconnected) => true,
            _ => false,
        }
    }

    /// Whether the task has stopped for good.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
