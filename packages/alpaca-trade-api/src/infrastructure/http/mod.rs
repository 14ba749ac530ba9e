//! Alpaca REST Adapters
//!
//! - [`client`]: reqwest transport shared by both APIs
//! - [`data`]: market data accessors over the pagination engine
//! - [`trading`]: trading API resources
//! - [`types`]: resource types

pub mod client;
pub mod data;
pub mod trading;
pub mod types;

pub use client::HttpClient;
pub use data::{
    CorporateActionQuery, HistoricalQuery, MarketDataClient, NewsQuery, OptionChainQuery,
};
pub use trading::TradingClient;
pub use types::*;
