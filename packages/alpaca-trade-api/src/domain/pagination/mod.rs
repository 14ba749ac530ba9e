//! Pagination Limits
//!
//! Normalization of the two independent caps on a paginated query:
//!
//! - `page` - items per request, capped at the endpoint's server maximum
//! - `total` - items across all pages, `0` meaning unbounded
//!
//! Every request limit produced here satisfies
//! `limit <= min(page, server max)` and, when bounded,
//! `limit <= total - received`.

use serde::{Deserialize, Serialize};

// =============================================================================
// Endpoint Maxima
// =============================================================================

/// Server page maximum for stock, crypto and option historical data.
pub const DATA_MAX_LIMIT: u32 = 10_000;

/// Server page maximum for news.
pub const NEWS_MAX_LIMIT: u32 = 50;

/// Server page maximum for the v1beta1 snapshot and corporate action endpoints.
pub const BETA_MAX_LIMIT: u32 = 1_000;

/// Per-endpoint paging constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointLimits {
    /// Largest `limit` the server accepts for one page.
    pub max_page: u32,
    /// Total applied when the caller gives none (`0` = unbounded).
    pub default_total: u64,
}

impl EndpointLimits {
    /// Historical bars, trades and quotes.
    pub const DATA: Self = Self {
        max_page: DATA_MAX_LIMIT,
        default_total: 0,
    };

    /// News articles.
    pub const NEWS: Self = Self {
        max_page: NEWS_MAX_LIMIT,
        default_total: 10,
    };

    /// Option chain snapshots.
    pub const OPTION_CHAIN: Self = Self {
        max_page: BETA_MAX_LIMIT,
        default_total: 10_000,
    };

    /// Corporate actions.
    pub const CORPORATE_ACTIONS: Self = Self {
        max_page: BETA_MAX_LIMIT,
        default_total: 10_000,
    };
}

// =============================================================================
// Caller Limits
// =============================================================================

/// Limits as supplied by a caller, before validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum items overall. `None` uses the endpoint default; `Some(0)` is unbounded.
    pub total: Option<i64>,
    /// Maximum items per request. `None` or `Some(0)` uses the server maximum.
    pub page: Option<i64>,
}

impl Limits {
    /// No caps beyond the endpoint's own.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            total: None,
            page: None,
        }
    }

    /// Cap the overall item count.
    #[must_use]
    pub const fn total(mut self, total: i64) -> Self {
        self.total = Some(total);
        self
    }

    /// Cap the per-request item count.
    #[must_use]
    pub const fn page(mut self, page: i64) -> Self {
        self.page = Some(page);
        self
    }
}

/// Invalid caller limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LimitError {
    /// Total limit below zero.
    #[error("negative total limit: {0}")]
    NegativeTotal(i64),

    /// Page limit below zero.
    #[error("negative page limit: {0}")]
    NegativePage(i64),
}

// =============================================================================
// Normalized Limits
// =============================================================================

/// Validated limits for one paginated sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    page: u32,
    total: u64,
}

impl PageLimits {
    /// Validate and normalize caller limits against an endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`LimitError`] if either limit is negative.
    pub fn normalize(limits: Limits, endpoint: EndpointLimits) -> Result<Self, LimitError> {
        let total = match limits.total {
            Some(total) if total < 0 => return Err(LimitError::NegativeTotal(total)),
            Some(total) => total.unsigned_abs(),
            None => endpoint.default_total,
        };

        let page = match limits.page {
            Some(page) if page < 0 => return Err(LimitError::NegativePage(page)),
            Some(0) | None => endpoint.max_page,
            Some(page) => u32::try_from(page)
                .unwrap_or(u32::MAX)
                .min(endpoint.max_page),
        };

        Ok(Self { page, total })
    }

    /// Effective page size.
    #[must_use]
    pub const fn page(&self) -> u32 {
        self.page
    }

    /// Effective total, `0` when unbounded.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Check whether a total cap applies.
    #[must_use]
    pub const fn is_bounded(&self) -> bool {
        self.total != 0
    }

    /// Check whether `received` items satisfy the total cap.
    #[must_use]
    pub const fn is_satisfied(&self, received: u64) -> bool {
        self.is_bounded() && received >= self.total
    }

    /// Limit for the next request, or `None` when no request should be made.
    ///
    /// The final page of a bounded sequence asks for exactly the remainder.
    #[must_use]
    pub fn next_request_limit(&self, received: u64) -> Option<u32> {
        if !self.is_bounded() {
            return Some(self.page);
        }
        let remaining = self.total.saturating_sub(received);
        if remaining == 0 {
            return None;
        }
        Some(u32::try_from(remaining).map_or(self.page, |r| r.min(self.page)))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test]
    fn defaults_use_server_maximum_and_unbounded_total() {
        let limits = PageLimits::normalize(Limits::none(), EndpointLimits::DATA).unwrap();
        assert_eq!(limits.page(), DATA_MAX_LIMIT);
        assert!(!limits.is_bounded());
        assert_eq!(limits.next_request_limit(123_456), Some(DATA_MAX_LIMIT));
    }

    #[test]
    fn news_default_total_is_ten() {
        let limits = PageLimits::normalize(Limits::none(), EndpointLimits::NEWS).unwrap();
        assert_eq!(limits.total(), 10);
        assert_eq!(limits.next_request_limit(0), Some(10));
    }

    #[test]
    fn explicit_zero_total_is_unbounded() {
        let limits = PageLimits::normalize(Limits::none().total(0), EndpointLimits::NEWS).unwrap();
        assert!(!limits.is_bounded());
        assert_eq!(limits.next_request_limit(0), Some(NEWS_MAX_LIMIT));
    }

    #[test]
    fn page_limit_clamped_to_server_max() {
        let limits =
            PageLimits::normalize(Limits::none().page(50_000), EndpointLimits::DATA).unwrap();
        assert_eq!(limits.page(), DATA_MAX_LIMIT);
    }

    #[test_case(Limits::none().total(-1), LimitError::NegativeTotal(-1))]
    #[test_case(Limits::none().page(-5), LimitError::NegativePage(-5))]
    fn negative_limits_rejected(limits: Limits, expected: LimitError) {
        assert_eq!(
            PageLimits::normalize(limits, EndpointLimits::DATA),
            Err(expected)
        );
    }

    #[test_case(0, Some(10))]
    #[test_case(10, Some(10))]
    #[test_case(20, Some(5))]
    #[test_case(25, None)]
    #[test_case(30, None)]
    fn last_page_requests_exact_remainder(received: u64, expected: Option<u32>) {
        let limits =
            PageLimits::normalize(Limits::none().total(25).page(10), EndpointLimits::DATA).unwrap();
        assert_eq!(limits.next_request_limit(received), expected);
    }

    #[test]
    fn satisfied_only_when_bounded() {
        let bounded =
            PageLimits::normalize(Limits::none().total(5), EndpointLimits::DATA).unwrap();
        assert!(!bounded.is_satisfied(4));
        assert!(bounded.is_satisfied(5));

        let unbounded = PageLimits::normalize(Limits::none(), EndpointLimits::DATA).unwrap();
        assert!(!unbounded.is_satisfied(u64::MAX));
    }

    proptest! {
        #[test]
        fn request_limit_never_exceeds_caps(
            total in 0i64..100_000,
            page in 0i64..100_000,
            received in 0u64..100_000,
        ) {
            let limits = PageLimits::normalize(
                Limits::none().total(total).page(page),
                EndpointLimits::DATA,
            ).unwrap();

            if let Some(limit) = limits.next_request_limit(received) {
                prop_assert!(limit > 0);
                prop_assert!(limit <= DATA_MAX_LIMIT);
                if page > 0 {
                    prop_assert!(i64::from(limit) <= page);
                }
                if limits.is_bounded() {
                    prop_assert!(u64::from(limit) <= limits.total() - received);
                }
            } else {
                prop_assert!(limits.is_satisfied(received));
            }
        }
    }
}
