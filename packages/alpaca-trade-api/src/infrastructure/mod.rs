//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the ports defined in the application layer,
//! plus the streaming clients.

/// Alpaca WebSocket clients (market data, trade updates).
pub mod alpaca;

/// Configuration and environment loading.
pub mod config;

/// Alpaca REST clients (trading API, market data API).
pub mod http;

/// Metrics facade instrumentation.
pub mod metrics;

/// Tracing subscriber setup.
pub mod telemetry;
