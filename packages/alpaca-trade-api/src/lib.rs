#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Alpaca Trade API - Brokerage Client Library
//!
//! REST access to the trading and market data APIs, lazily paginated
//! historical data, and self-healing streaming clients for market data
//! (`MessagePack`) and trade/account updates (JSON).
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Connection states, subscription sets, page limits
//!   - `streaming`: Lifecycle states and state change events
//!   - `subscription`: Desired channel/symbol sets and deltas
//!   - `pagination`: Limit normalization per endpoint
//!
//! - **Application**: Port definitions and the pagination engine
//!   - `ports`: The data transport seam and its error type
//!   - `services`: Cursor pagination and multi-symbol fan-out
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `alpaca`: Streaming connections, codecs, dispatcher
//!   - `http`: reqwest clients for trading and market data
//!   - `config`: Configuration and environment loading
//!   - `metrics`, `telemetry`: Instrumentation
//!
//! # Data Flow
//!
//! ```text
//!                    +-------------+     +------------+
//! stream.data  <---->| Connection  |---->| Dispatcher |---> observers
//! paper-api/stream <>|  (driver)   |     +------------+
//!                    +-------------+
//!
//!                    +-------------+     +------------+
//! data.alpaca  <-----| HttpClient  |<----| paginate / |<--- DataStream<T>
//!                    +-------------+     |  fan_out   |
//!                                        +------------+
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Streaming, subscription and pagination state without I/O.
pub mod domain;

/// Application layer - Ports and the pagination engine.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::pagination::{EndpointLimits, LimitError, Limits, PageLimits};
pub use domain::streaming::{ConnectionState, StateChange};
pub use domain::subscription::{Channel, SubscriptionDelta, SubscriptionSet, SubscriptionSnapshot};

// Pagination engine
pub use application::ports::{ApiError, DataTransport, QueryParams};
pub use application::services::{
    DataError, DataStream, PageRequest, SymbolItem, fan_out, join_symbols, keyed_pages, paginate,
};

// Configuration
pub use infrastructure::config::{AlpacaConfig, ConfigError, DataFeed, StreamSettings};

// Streaming clients
pub use infrastructure::alpaca::{
    AuthError, Credentials, EventKind, MarketDataStream, ObserverToken, ReconnectConfig,
    StreamError, StreamEvent, TradingStream,
};

// REST clients
pub use infrastructure::http::{
    CorporateActionQuery, HistoricalQuery, HttpClient, MarketDataClient, NewsQuery,
    OptionChainQuery, TradingClient,
};

// Metrics
pub use infrastructure::metrics::describe_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, init as init_telemetry};
