//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `IngestPipeline`: decode, throttle and persist feed frames
//! - `QueryService`: read-side queries and upstream history

mod ingest;
mod query;

pub use ingest::{IngestOutcome, IngestPipeline};
pub use query::{DatabaseStatus, QueryError, QueryService, SeriesStatus, StatusReport};
