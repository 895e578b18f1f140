//! Domain Layer - Core market data types and ingestion rules.
//!
//! Pure types with no I/O: symbols, intervals, observations, stream frame
//! decoding, the per-symbol write throttle and the feed connection state machine.

/// Symbols, intervals, updates and observations.
pub mod market;

/// Per-symbol write-rate throttling.
pub mod throttle;

/// Kline stream frame decoding.
pub mod feed;

/// Feed connection lifecycle.
pub mod connection;
