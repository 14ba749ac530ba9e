//! Domain Layer - Streaming and pagination state with no I/O.
//!
//! Everything here is plain data plus the rules that govern it. The
//! infrastructure layer drives these types; nothing in this layer opens a
//! socket or sends a request.

/// Connection lifecycle states and change notifications.
pub mod streaming;

/// Desired subscription sets per channel.
pub mod subscription;

/// Per-page and total limit normalization.
pub mod pagination;
