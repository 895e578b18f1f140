//! Binance Adapters
//!
//! - `stream`: combined-stream WebSocket connection
//! - `reconnect`: backoff policies
//! - `rest`: historical klines over REST

pub mod reconnect;
pub mod rest;
pub mod stream;

pub use reconnect::{ExponentialBackoff, FixedDelay};
pub use rest::BinanceKlineFetcher;
pub use stream::{
    FeedSnapshot, FeedState, StreamConnection, StreamConnectionConfig, StreamError,
    combined_stream_url,
};
