//! Trading REST Resources
//!
//! Account, orders, positions, assets, clock, calendar and watchlists.
//! Every call is a single request; failures come back as [`ApiError`]
//! without retry.

use reqwest::Method;

use super::client::HttpClient;
use super::types::{
    Account, Asset, AssetQuery, Calendar, CalendarQuery, Clock, NewOrder, Order,
    OrderCancellation, OrderQuery, Position, PositionClosure, ReplaceOrder, Watchlist,
    WatchlistBody,
};
use crate::application::ports::{ApiError, QueryParams};
use crate::infrastructure::config::AlpacaConfig;

/// Trading API client.
#[derive(Debug, Clone)]
pub struct TradingClient {
    http: HttpClient,
}

impl TradingClient {
    /// Client for the configured trading API (`{base_url}/{api_version}`).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &AlpacaConfig) -> Result<Self, ApiError> {
        let http = HttpClient::new(config.trading_api_url(), &config.credentials, config.timeout)?;
        Ok(Self { http })
    }

    /// Client over an existing HTTP client rooted at the versioned API.
    #[must_use]
    pub const fn with_http(http: HttpClient) -> Self {
        Self { http }
    }

    // =========================================================================
    // Account
    // =========================================================================

    /// Fetch the account.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_account(&self) -> Result<Account, ApiError> {
        self.http.get("/account", &QueryParams::new()).await
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// List orders.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_orders(&self, query: &OrderQuery) -> Result<Vec<Order>, ApiError> {
        self.http.get("/orders", &query.to_params()).await
    }

    /// Fetch one order by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_order(&self, order_id: &str) -> Result<Order, ApiError> {
        self.http.get(&format!("/orders/{order_id}"), &QueryParams::new()).await
    }

    /// Fetch one order by client order ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_order_by_client_id(&self, client_order_id: &str) -> Result<Order, ApiError> {
        let query = vec![("client_order_id".to_string(), client_order_id.to_string())];
        self.http.get("/orders:by_client_order_id", &query).await
    }

    /// Submit an order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the order is rejected.
    pub async fn create_order(&self, order: &NewOrder) -> Result<Order, ApiError> {
        tracing::info!(
            symbol = %order.symbol,
            side = ?order.side,
            order_type = ?order.order_type,
            client_order_id = ?order.client_order_id,
            "Submitting order"
        );
        self.http.send(Method::POST, "/orders", order).await
    }

    /// Replace an open order; the response is the new order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the replace is rejected.
    pub async fn replace_order(&self, order_id: &str, changes: &ReplaceOrder) -> Result<Order, ApiError> {
        self.http
            .send(Method::PATCH, &format!("/orders/{order_id}"), changes)
            .await
    }

    /// Cancel one order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn cancel_order(&self, order_id: &str) -> Result<(), ApiError> {
        self.http
            .delete::<serde_json::Value>(&format!("/orders/{order_id}"))
            .await
            .map(drop)
    }

    /// Cancel every open order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn cancel_all_orders(&self) -> Result<Vec<OrderCancellation>, ApiError> {
        let cancelled: Option<Vec<OrderCancellation>> = self.http.delete("/orders").await?;
        Ok(cancelled.unwrap_or_default())
    }

    // =========================================================================
    // Positions
    // =========================================================================

    /// List open positions.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_positions(&self) -> Result<Vec<Position>, ApiError> {
        self.http.get("/positions", &QueryParams::new()).await
    }

    /// Fetch the position in `symbol`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_position(&self, symbol: &str) -> Result<Position, ApiError> {
        self.http.get(&format!("/positions/{symbol}"), &QueryParams::new()).await
    }

    /// Close the position in `symbol`; returns the closing order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn close_position(&self, symbol: &str) -> Result<Order, ApiError> {
        self.http.delete(&format!("/positions/{symbol}")).await
    }

    /// Close every position.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn close_all_positions(&self) -> Result<Vec<PositionClosure>, ApiError> {
        let closed: Option<Vec<PositionClosure>> = self.http.delete("/positions").await?;
        Ok(closed.unwrap_or_default())
    }

    // =========================================================================
    // Assets, Clock, Calendar
    // =========================================================================

    /// List assets.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_assets(&self, query: &AssetQuery) -> Result<Vec<Asset>, ApiError> {
        self.http.get("/assets", &query.to_params()).await
    }

    /// Fetch one asset by symbol or ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_asset(&self, symbol: &str) -> Result<Asset, ApiError> {
        self.http.get(&format!("/assets/{symbol}"), &QueryParams::new()).await
    }

    /// Fetch the market clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_clock(&self) -> Result<Clock, ApiError> {
        self.http.get("/clock", &QueryParams::new()).await
    }

    /// Fetch market days in a range.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_calendar(&self, query: CalendarQuery) -> Result<Vec<Calendar>, ApiError> {
        self.http.get("/calendar", &query.to_params()).await
    }

    // =========================================================================
    // Watchlists
    // =========================================================================

    /// List watchlists (without their assets).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_watchlists(&self) -> Result<Vec<Watchlist>, ApiError> {
        self.http.get("/watchlists", &QueryParams::new()).await
    }

    /// Fetch one watchlist with its assets.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_watchlist(&self, id: &str) -> Result<Watchlist, ApiError> {
        self.http.get(&format!("/watchlists/{id}"), &QueryParams::new()).await
    }

    /// Create a watchlist.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn create_watchlist(&self, name: &str, symbols: &[&str]) -> Result<Watchlist, ApiError> {
        let body = WatchlistBody {
            name,
            symbols: symbols.iter().map(ToString::to_string).collect(),
        };
        self.http.send(Method::POST, "/watchlists", &body).await
    }

    /// Replace a watchlist's name and symbols.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn update_watchlist(
        &self,
        id: &str,
        name: &str,
        symbols: &[&str],
    ) -> Result<Watchlist, ApiError> {
        let body = WatchlistBody {
            name,
            symbols: symbols.iter().map(ToString::to_string).collect(),
        };
        self.http
            .send(Method::PUT, &format!("/watchlists/{id}"), &body)
            .await
    }

    /// Append one symbol to a watchlist.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn add_to_watchlist(&self, id: &str, symbol: &str) -> Result<Watchlist, ApiError> {
        let body = serde_json::json!({ "symbol": symbol });
        self.http
            .send(Method::POST, &format!("/watchlists/{id}"), &body)
            .await
    }

    /// Remove one symbol from a watchlist.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn remove_from_watchlist(&self, id: &str, symbol: &str) -> Result<Watchlist, ApiError> {
        self.http.delete(&format!("/watchlists/{id}/{symbol}")).await
    }

    /// Delete a watchlist.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn delete_watchlist(&self, id: &str) -> Result<(), ApiError> {
        self.http
            .delete::<serde_json::Value>(&format!("/watchlists/{id}"))
            .await
            .map(drop)
    }
}
