//! Alpaca WebSocket Adapters
//!
//! Streaming clients for Alpaca's two WebSocket endpoints:
//!
//! - **Market data**: stock trades, quotes, bars, statuses (`MessagePack` codec)
//! - **Trading**: order and account updates (JSON codec)
//!
//! Both share one connection driver ([`connection`]) and one observer
//! registry ([`dispatcher`]).

pub mod auth;
pub mod codec;
pub mod connection;
pub mod dispatcher;
pub mod market_data;
pub mod messages;
pub mod reconnect;
pub mod trading;

pub use auth::{AuthError, Credentials};
pub use codec::{CodecError, JsonCodec, MsgPackCodec};
pub use connection::StreamError;
pub use dispatcher::{EventDispatcher, EventKind, ObserverToken, StreamEvent};
pub use market_data::MarketDataStream;
pub use messages::*;
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use trading::{ACCOUNT_UPDATES, TRADE_UPDATES, TradingStream};
