//! Backoff Policy Port
//!
//! Strategy mapping a reconnect attempt number to a delay.

use std::time::Duration;

/// Reconnect delay strategy.
pub trait BackoffPolicy: Send + Sync {
    /// Delay before reconnect attempt `attempt` (0-based).
    fn delay(&self, attempt: u32) -> Duration;
}
