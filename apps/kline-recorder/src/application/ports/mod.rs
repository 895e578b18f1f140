//! Port Interfaces
//!
//! Contracts between the ingestion and query services and the outside
//! world, following the hexagonal layout.
//!
//! ## Driven Ports (Outbound)
//!
//! - `SeriesStore`: append-only per-symbol time-series persistence
//! - `HistoricalFetcher`: upstream historical bars
//! - `BackoffPolicy`: reconnect delay strategy
//! - `Clock`: wall-clock source for throttling

mod backoff_port;
mod clock_port;
mod historical_fetcher_port;
mod series_store_port;

pub use backoff_port::BackoffPolicy;
pub use clock_port::{Clock, ManualClock, SystemClock};
pub use historical_fetcher_port::{HistoricalFetcher, UpstreamFetchError};
pub use series_store_port::{SeriesStore, StorageError};
