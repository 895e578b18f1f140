//! Write Throttling
//!
//! Per-symbol admission control for persisted observations. The feed emits
//! kline updates roughly once per second per symbol; the gate caps persisted
//! samples to one per symbol per window.
//!
//! # Design
//!
//! Admission is judged against the wall-clock arrival time of the last
//! admitted update, not the event time carried by the update. The state is
//! owned by the ingestion task and mutated only from it.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use super::market::Symbol;

/// Default minimum spacing between persisted observations for a symbol.
pub const DEFAULT_THROTTLE_WINDOW: Duration = Duration::from_secs(10);

// =============================================================================
// Throttle State
// =============================================================================

/// Last admission time per symbol.
#[derive(Debug, Default, Clone)]
pub struct ThrottleState {
    last_admitted_at: HashMap<Symbol, DateTime<Utc>>,
}

impl ThrottleState {
    /// Create empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wall-clock time of the last admission for `symbol`.
    #[must_use]
    pub fn last_admitted_at(&self, symbol: &Symbol) -> Option<DateTime<Utc>> {
        self.last_admitted_at.get(symbol).copied()
    }

    /// Number of symbols with at least one admission.
    #[must_use]
    pub fn len(&self) -> usize {
        self.last_admitted_at.len()
    }

    /// Whether no symbol has been admitted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_admitted_at.is_empty()
    }

    fn set(&mut self, symbol: &Symbol, now: DateTime<Utc>) {
        if let Some(slot) = self.last_admitted_at.get_mut(symbol) {
            *slot = now;
        } else {
            self.last_admitted_at.insert(symbol.clone(), now);
        }
    }
}

// =============================================================================
// Throttle Gate
// =============================================================================

/// Result of offering an update to the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleOutcome {
    /// Persist the update.
    Admitted,
    /// Drop the update; the symbol was admitted too recently.
    Rejected {
        /// Time left until the symbol becomes admissible again.
        retry_in: Duration,
    },
}

impl ThrottleOutcome {
    /// Whether the update was admitted.
    #[must_use]
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

/// Per-symbol write-rate gate.
///
/// # Example
///
/// ```rust
/// use chrono::{TimeDelta, Utc};
/// use kline_recorder::domain::market::Symbol;
/// use kline_recorder::domain::throttle::ThrottleGate;
///
/// let mut gate = ThrottleGate::default();
/// let btc = Symbol::parse("BTCUSDT").unwrap();
/// let t0 = Utc::now();
///
/// assert!(gate.offer(&btc, t0).is_admitted());
/// assert!(!gate.offer(&btc, t0 + TimeDelta::seconds(3)).is_admitted());
/// assert!(gate.offer(&btc, t0 + TimeDelta::seconds(10)).is_admitted());
/// ```
#[derive(Debug, Clone)]
pub struct ThrottleGate {
    window: TimeDelta,
    state: ThrottleState,
}

impl Default for ThrottleGate {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_WINDOW)
    }
}

impl ThrottleGate {
    /// Create a gate with empty state.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self::with_state(window, ThrottleState::new())
    }

    /// Create a gate over existing state.
    #[must_use]
    pub fn with_state(window: Duration, state: ThrottleState) -> Self {
        Self {
            window: TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX),
            state,
        }
    }

    /// Configured window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window.to_std().unwrap_or(Duration::MAX)
    }

    /// Read-only view of the state.
    #[must_use]
    pub const fn state(&self) -> &ThrottleState {
        &self.state
    }

    /// Whether an update for `symbol` arriving at `now` may be persisted.
    #[must_use]
    pub fn admit(&self, symbol: &Symbol, now: DateTime<Utc>) -> bool {
        self.state
            .last_admitted_at(symbol)
            .is_none_or(|last| now.signed_duration_since(last) >= self.window)
    }

    /// Record an admission. Call only after [`Self::admit`] returned `true`.
    pub fn record(&mut self, symbol: &Symbol, now: DateTime<Utc>) {
        self.state.set(symbol, now);
    }

    /// Admit-and-record in one step.
    pub fn offer(&mut self, symbol: &Symbol, now: DateTime<Utc>) -> ThrottleOutcome {
        if self.admit(symbol, now) {
            self.record(symbol, now);
            return ThrottleOutcome::Admitted;
        }

        let elapsed = self
            .state
            .last_admitted_at(symbol)
            .map_or(TimeDelta::zero(), |last| now.signed_duration_since(last));
        let retry_in = (self.window - elapsed).to_std().unwrap_or(Duration::ZERO);
        ThrottleOutcome::Rejected { retry_in }
    }
}
