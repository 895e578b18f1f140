//! Series Store Port (Driven Port)
//!
//! Append-only, per-symbol ordered storage of observations.

use chrono::{DateTime, Utc};

use crate::domain::market::{Observation, Symbol};

/// Durable per-symbol time-series store.
///
/// Calls are synchronous; async callers move them onto the blocking pool.
/// A single writer appends while any number of readers query.
pub trait SeriesStore: Send + Sync {
    /// Append one observation, creating the symbol's series if needed.
    ///
    /// Series provisioning and the insert happen atomically; readers see the
    /// whole observation or nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend rejects the write.
    fn append(&self, observation: &Observation) -> Result<(), StorageError>;

    /// The most recently appended observation for `symbol`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be read.
    fn latest(&self, symbol: &Symbol) -> Result<Option<Observation>, StorageError>;

    /// Observations with `start <= time <= end`, ascending by time then
    /// append order. Either bound may be open.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be read.
    fn range(
        &self,
        symbol: &Symbol,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Observation>, StorageError>;

    /// Number of stored observations for `symbol`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be read.
    fn count(&self, symbol: &Symbol) -> Result<u64, StorageError>;

    /// Whether a series has been provisioned for `symbol`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be read.
    fn has_series(&self, symbol: &Symbol) -> Result<bool, StorageError>;

    /// Reachability probe.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend is unavailable.
    fn ping(&self) -> Result<(), StorageError>;
}

/// Storage failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    /// Could not open or initialize the store.
    #[error("failed to open store: {0}")]
    Open(String),

    /// Backend I/O or query failure.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Stored row could not be mapped back to an observation.
    #[error("corrupt row for {symbol}: {message}")]
    CorruptRow {
        /// Symbol column value.
        symbol: String,
        /// What was wrong with the row.
        message: String,
    },

    /// Observation violates the stored-data invariants.
    #[error("invalid observation: {0}")]
    InvalidObservation(String),
}
