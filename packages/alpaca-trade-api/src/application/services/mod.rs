//! Application Services
//!
//! - [`pagination`]: cursor-driven fetch-and-flatten over one result array
//! - [`fan_out`]: the same engine over pages keyed by symbol
//!
//! Both produce a [`DataStream`]: a lazy, single-pass sequence that performs
//! one request per page, never prefetches, and ends with the first error.

pub mod fan_out;
pub mod pagination;

use futures::stream::BoxStream;
use thiserror::Error;

use super::ports::ApiError;
use crate::domain::pagination::LimitError;

pub use fan_out::{SymbolItem, fan_out, join_symbols, keyed_pages};
pub use pagination::{PageRequest, paginate};

/// Lazy sequence of items from a paginated endpoint.
pub type DataStream<T> = BoxStream<'static, Result<T, DataError>>;

/// Errors produced while building or consuming a paginated sequence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    /// Limits were rejected before any request.
    #[error(transparent)]
    InvalidLimit(#[from] LimitError),

    /// A multi-symbol query had no symbols.
    #[error("symbols must be a non-empty list of non-empty strings")]
    EmptySymbols,

    /// A page request failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// An item could not be decoded into the requested type.
    #[error("failed to decode `{key}` item: {message}")]
    Decode {
        /// Result key being read.
        key: String,
        /// Decoder message.
        message: String,
    },

    /// The page did not have the expected shape under the result key.
    #[error("unexpected page shape: `{key}` is not {expected}")]
    UnexpectedShape {
        /// Result key being read.
        key: String,
        /// Expected JSON type.
        expected: &'static str,
    },

    /// The caller cancelled the sequence.
    #[error("pagination cancelled")]
    Cancelled,
}
