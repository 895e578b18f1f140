//! Ingestion Pipeline
//!
//! Decode, throttle and persist a single feed frame. One pipeline instance is
//! owned by the stream connection task and driven sequentially; nothing here
//! is shared across tasks except the store.

use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::{Clock, SeriesStore};
use crate::domain::feed::MessageDecoder;
use crate::domain::market::Symbol;
use crate::domain::throttle::{ThrottleGate, ThrottleState};

/// What happened to one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Observation appended to the store.
    Stored(Symbol),
    /// Update dropped by the throttle gate.
    Throttled(Symbol),
    /// Frame could not be decoded.
    DecodeFailed,
    /// Update admitted but the append failed.
    StoreFailed(Symbol),
}

impl IngestOutcome {
    /// Label used in metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stored(_) => "stored",
            Self::Throttled(_) => "throttled",
            Self::DecodeFailed => "decode_failed",
            Self::StoreFailed(_) => "store_failed",
        }
    }

    /// Symbol the frame referred to, when it decoded.
    #[must_use]
    pub const fn symbol(&self) -> Option<&Symbol> {
        match self {
            Self::Stored(s) | Self::Throttled(s) | Self::StoreFailed(s) => Some(s),
            Self::DecodeFailed => None,
        }
    }
}

/// Frame-to-store pipeline: decoder, throttle gate, store.
pub struct IngestPipeline {
    decoder: MessageDecoder,
    gate: ThrottleGate,
    store: Arc<dyn SeriesStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for IngestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestPipeline")
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl IngestPipeline {
    /// Create a pipeline over existing throttle state.
    #[must_use]
    pub fn new(
        store: Arc<dyn SeriesStore>,
        clock: Arc<dyn Clock>,
        window: Duration,
        state: ThrottleState,
    ) -> Self {
        Self {
            decoder: MessageDecoder::new(),
            gate: ThrottleGate::with_state(window, state),
            store,
            clock,
        }
    }

    /// Throttle gate, for inspection.
    #[must_use]
    pub const fn gate(&self) -> &ThrottleGate {
        &self.gate
    }

    /// Process one raw text frame. Failures are logged and reported in the
    /// outcome, never propagated.
    pub fn process_frame(&mut self, raw: &str) -> IngestOutcome {
        let update = match self.decoder.decode(raw) {
            Ok(update) => update,
            Err(e) => {
                tracing::warn!(error = %e, frame_len = raw.len(), "Discarding undecodable frame");
                return IngestOutcome::DecodeFailed;
            }
        };

        let now = self.clock.now();
        if !self.gate.admit(&update.symbol, now) {
            tracing::trace!(symbol = %update.symbol, "Update throttled");
            return IngestOutcome::Throttled(update.symbol);
        }
        // Recorded before the append; a failed write still consumes the window.
        self.gate.record(&update.symbol, now);

        match self.store.append(&update.to_observation()) {
            Ok(()) => {
                tracing::info!(
                    symbol = %update.symbol,
                    close = update.close,
                    event_time = %update.event_time,
                    "Recorded observation"
                );
                IngestOutcome::Stored(update.symbol)
            }
            Err(e) => {
                tracing::error!(symbol = %update.symbol, error = %e, "Failed to persist observation");
                IngestOutcome::StoreFailed(update.symbol)
            }
        }
    }
}
