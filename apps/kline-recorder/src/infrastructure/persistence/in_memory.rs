//! In-Memory Series Store
//!
//! Non-durable [`SeriesStore`] for tests and ephemeral runs.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::application::ports::{SeriesStore, StorageError};
use crate::domain::market::{Observation, Symbol};

/// Series held in process memory, one vector per symbol in append order.
#[derive(Debug, Default)]
pub struct InMemorySeriesStore {
    series: RwLock<HashMap<Symbol, Vec<Observation>>>,
}

impl InMemorySeriesStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SeriesStore for InMemorySeriesStore {
    fn append(&self, observation: &Observation) -> Result<(), StorageError> {
        if !observation.is_valid() {
            return Err(StorageError::InvalidObservation(format!(
                "{} at {}",
                observation.symbol,
                observation.time_ms()
            )));
        }
        self.series
            .write()
            .entry(observation.symbol.clone())
            .or_default()
            .push(observation.clone());
        Ok(())
    }

    fn latest(&self, symbol: &Symbol) -> Result<Option<Observation>, StorageError> {
        Ok(self
            .series
            .read()
            .get(symbol)
            .and_then(|series| series.last().cloned()))
    }

    fn range(
        &self,
        symbol: &Symbol,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Observation>, StorageError> {
        let mut matching: Vec<Observation> = self
            .series
            .read()
            .get(symbol)
            .map(|series| {
                series
                    .iter()
                    .filter(|o| start.is_none_or(|s| o.time >= s))
                    .filter(|o| end.is_none_or(|e| o.time <= e))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        // Stable sort keeps append order among equal timestamps.
        matching.sort_by_key(|o| o.time);
        Ok(matching)
    }

    fn count(&self, symbol: &Symbol) -> Result<u64, StorageError> {
        let len = self.series.read().get(symbol).map_or(0, Vec::len);
        Ok(u64::try_from(len).unwrap_or(u64::MAX))
    }

    fn has_series(&self, symbol: &Symbol) -> Result<bool, StorageError> {
        Ok(self.series.read().contains_key(symbol))
    }

    fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
