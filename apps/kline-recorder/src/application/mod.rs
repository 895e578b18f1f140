//! Application Layer - Use cases and port definitions.
//!
//! Ingestion and query services plus the port interfaces they drive.

/// Port interfaces for storage, upstream history, backoff and time.
pub mod ports;

/// Ingestion and query services.
pub mod services;
