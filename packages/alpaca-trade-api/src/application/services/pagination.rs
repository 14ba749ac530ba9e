//! Pagination Engine
//!
//! Turns one logical "fetch up to N items" query into a lazy stream of
//! items, hiding the `page_token` / `next_page_token` mechanics.
//!
//! # Algorithm
//!
//! 1. Normalize limits (see [`PageLimits`]); negative values fail before any I/O.
//! 2. Ask [`PageLimits::next_request_limit`] for the next `limit`.
//! 3. GET the page with `limit` and the current `page_token`.
//! 4. Buffer the page's items and hand them out one at a time.
//! 5. Advance `received` and the cursor.
//! 6. Stop when the cursor is absent or the total cap is reached.
//!
//! The next page is requested only after every buffered item has been
//! consumed. Cancellation is checked before each item is yielded and while a
//! request is in flight; dropping the stream abandons it as well.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{DataError, DataStream};
use crate::application::ports::{DataTransport, QueryParams};
use crate::domain::pagination::{EndpointLimits, Limits, PageLimits};

/// Turns one decoded page into items. Receives the page body and the result key.
pub(crate) type Extractor<T> = Box<dyn Fn(Value, &str) -> Result<Vec<T>, DataError> + Send + Sync>;

// =============================================================================
// Page Request
// =============================================================================

/// A logical paginated query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    path: String,
    result_key: String,
    params: QueryParams,
    limits: Limits,
    endpoint: EndpointLimits,
}

impl PageRequest {
    /// Query `path`, reading items from `result_key` of every page.
    ///
    /// Defaults to the historical data endpoint limits and no caller caps.
    #[must_use]
    pub fn new(path: impl Into<String>, result_key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            result_key: result_key.into(),
            params: Vec::new(),
            limits: Limits::none(),
            endpoint: EndpointLimits::DATA,
        }
    }

    /// Add a query parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Add a query parameter when a value is present.
    #[must_use]
    pub fn param_opt<V: ToString>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.param(key, value),
            None => self,
        }
    }

    /// Set the caller's total and page limits.
    #[must_use]
    pub const fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the endpoint's server maximum and default total.
    #[must_use]
    pub const fn endpoint(mut self, endpoint: EndpointLimits) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Key holding the items in each page.
    #[must_use]
    pub fn result_key(&self) -> &str {
        &self.result_key
    }

    /// Query parameters other than `limit` and `page_token`.
    #[must_use]
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

// =============================================================================
// Entry Points
// =============================================================================

/// Stream every item under the request's result key across all pages.
///
/// # Errors
///
/// Returns [`DataError::InvalidLimit`] synchronously if a limit is negative;
/// no request is made in that case.
pub fn paginate<T>(
    transport: Arc<dyn DataTransport>,
    request: PageRequest,
    cancel: CancellationToken,
) -> Result<DataStream<T>, DataError>
where
    T: DeserializeOwned + Send + 'static,
{
    drive(transport, request, cancel, Box::new(extract_array::<T>))
}

/// Shared driver for single-array and keyed page shapes.
pub(crate) fn drive<T>(
    transport: Arc<dyn DataTransport>,
    request: PageRequest,
    cancel: CancellationToken,
    extract: Extractor<T>,
) -> Result<DataStream<T>, DataError>
where
    T: Send + 'static,
{
    let limits = PageLimits::normalize(request.limits, request.endpoint)?;

    let cursor = Cursor {
        transport,
        path: request.path,
        key: request.result_key,
        params: request.params,
        limits,
        extract,
        cancel,
        buffer: VecDeque::new(),
        page_token: None,
        received: 0,
        pages: 0,
        exhausted: false,
        done: false,
    };

    Ok(stream::unfold(cursor, |mut cursor| async move {
        if cursor.done {
            return None;
        }
        loop {
            if cursor.cancel.is_cancelled() {
                cursor.done = true;
                return Some((Err(DataError::Cancelled), cursor));
            }
            if let Some(item) = cursor.buffer.pop_front() {
                return Some((Ok(item), cursor));
            }
            if cursor.exhausted {
                return None;
            }
            if let Err(err) = cursor.fetch_next_page().await {
                tracing::warn!(path = %cursor.path, error = %err, "Pagination stopped");
                cursor.done = true;
                return Some((Err(err), cursor));
            }
        }
    })
    .boxed())
}

// =============================================================================
// Cursor
// =============================================================================

struct Cursor<T> {
    transport: Arc<dyn DataTransport>,
    path: String,
    key: String,
    params: QueryParams,
    limits: PageLimits,
    extract: Extractor<T>,
    cancel: CancellationToken,
    buffer: VecDeque<T>,
    page_token: Option<String>,
    received: u64,
    pages: u64,
    /// No further page will be requested.
    exhausted: bool,
    /// A terminal error or cancellation has been yielded.
    done: bool,
}

impl<T> Cursor<T> {
    async fn fetch_next_page(&mut self) -> Result<(), DataError> {
        let Some(limit) = self.limits.next_request_limit(self.received) else {
            self.exhausted = true;
            return Ok(());
        };

        let mut query = self.params.clone();
        query.push(("limit".to_string(), limit.to_string()));
        if let Some(token) = &self.page_token {
            query.push(("page_token".to_string(), token.clone()));
        }

        let page = tokio::select! {
            () = self.cancel.cancelled() => return Err(DataError::Cancelled),
            result = self.transport.get_json(&self.path, &query) => result?,
        };

        let next_token = page
            .get("next_page_token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(str::to_owned);

        let items = (self.extract)(page, &self.key)?;
        let count = u64::try_from(items.len()).unwrap_or(u64::MAX);

        self.pages += 1;
        self.received += count;
        self.buffer.extend(items);
        self.page_token = next_token;

        tracing::debug!(
            path = %self.path,
            page = self.pages,
            limit,
            items = count,
            received = self.received,
            has_next = self.page_token.is_some(),
            "Fetched page"
        );

        if self.page_token.is_none() || self.limits.is_satisfied(self.received) {
            self.exhausted = true;
        }
        Ok(())
    }
}

// =============================================================================
// Extraction
// =============================================================================

/// Decode one item, naming the result key on failure.
pub(crate) fn decode_item<T: DeserializeOwned>(key: &str, item: Value) -> Result<T, DataError> {
    serde_json::from_value(item).map_err(|e| DataError::Decode {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn extract_array<T: DeserializeOwned>(mut page: Value, key: &str) -> Result<Vec<T>, DataError> {
    match page.get_mut(key).map(Value::take) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| decode_item(key, item))
            .collect(),
        Some(_) => Err(DataError::UnexpectedShape {
            key: key.to_string(),
            expected: "an array",
        }),
    }
}

// =============================================================================
// Tests
// =============================================================================
