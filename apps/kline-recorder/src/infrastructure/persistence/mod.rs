//! Series Store Adapters
//!
//! SQLite for durable recording, memory for tests and throwaway runs.

mod in_memory;
mod sqlite;

use std::sync::Arc;

pub use in_memory::InMemorySeriesStore;
pub use sqlite::SqliteSeriesStore;

use crate::application::ports::{SeriesStore, StorageError};
use crate::infrastructure::config::StorageLocation;

/// Open the store selected by configuration.
///
/// # Errors
///
/// Returns [`StorageError::Open`] if the SQLite file cannot be opened.
pub fn open_store(location: &StorageLocation) -> Result<Arc<dyn SeriesStore>, StorageError> {
    match location {
        StorageLocation::File(path) => Ok(Arc::new(SqliteSeriesStore::open(path)?)),
        StorageLocation::Memory => Ok(Arc::new(InMemorySeriesStore::new())),
    }
}
