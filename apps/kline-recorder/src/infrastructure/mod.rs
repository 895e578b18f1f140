//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the application ports, plus the HTTP surface
//! and process-level concerns (configuration, metrics, tracing).

/// Binance WebSocket feed and REST history adapters.
pub mod binance;

/// Series store backends.
pub mod persistence;

/// HTTP query API.
pub mod http;

/// Environment configuration.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tracing subscriber and OpenTelemetry export.
pub mod telemetry;
