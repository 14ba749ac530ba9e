//! Configuration Module
//!
//! Client configuration and per-stream settings.

mod settings;

pub use settings::{
    AlpacaConfig, ConfigError, DATA_BASE_URL, DATA_STREAM_URL, DEFAULT_TIMEOUT, DataFeed,
    LIVE_BASE_URL, PAPER_BASE_URL, StreamSettings,
};
