//! Configuration Module
//!
//! Environment-driven configuration for the recorder.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_SYMBOLS, FeedSettings, IN_MEMORY_DB_PATH, ReconnectSettings,
    RecorderConfig, ServerSettings, StorageLocation, UpstreamSettings,
};
