//! Application Layer - Use cases and port definitions.
//!
//! The pagination engine and the multi-symbol fan-out iterator live here,
//! written against the [`ports::DataTransport`] port so they can be driven by
//! the reqwest adapter or by a test double.

/// Port interfaces for external systems.
pub mod ports;

/// Pagination and fan-out services.
pub mod services;
