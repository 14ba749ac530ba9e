//! Market Data REST Accessors
//!
//! Historical stocks, crypto and options data, news, corporate actions and
//! the option chain, served lazily through the pagination engine, plus the
//! non-paged latest, order book and snapshot endpoints.
//!
//! Single-symbol responses omit the symbol from each record; these
//! accessors fill it in, as they do for multi-symbol responses where the
//! symbol is the response key.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use futures::{StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::client::HttpClient;
use super::types::{
    Adjustment, CorporateAction, CorporateActionKind, NewsArticle, OptionSnapshot, Orderbook,
    Snapshot, Sort, TimeFrame, push,
};
use crate::application::ports::{ApiError, DataTransport, QueryParams};
use crate::application::services::fan_out::decode_keyed;
use crate::application::services::pagination::decode_item;
use crate::application::services::{
    DataError, DataStream, PageRequest, SymbolItem, fan_out, join_symbols, keyed_pages, paginate,
};
use crate::domain::pagination::{EndpointLimits, Limits};
use crate::infrastructure::alpaca::messages::{Bar, Quote, Trade};
use crate::infrastructure::config::{AlpacaConfig, DataFeed};

/// Records that carry their own symbol field.
trait WithSymbol {
    fn set_symbol(&mut self, symbol: String);
}

macro_rules! with_symbol {
    ($($ty:ty),*) => {
        $(impl WithSymbol for $ty {
            fn set_symbol(&mut self, symbol: String) {
                self.symbol = symbol;
            }
        })*
    };
}

with_symbol!(Trade, Quote, Bar, Snapshot, OptionSnapshot, Orderbook);

fn tagged<T: WithSymbol>(entry: SymbolItem<T>) -> T {
    let SymbolItem { symbol, mut item } = entry;
    item.set_symbol(symbol);
    item
}

// =============================================================================
// Queries
// =============================================================================

/// Filters shared by historical trades, quotes and bars.
#[derive(Debug, Clone, Default)]
pub struct HistoricalQuery {
    /// Inclusive start.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive end.
    pub end: Option<DateTime<Utc>>,
    /// Total and per-page caps.
    pub limits: Limits,
    /// Feed override; the client's feed when unset. Ignored for crypto.
    pub feed: Option<DataFeed>,
    /// Sort order.
    pub sort: Option<Sort>,
    /// Bar adjustment. Bars only.
    pub adjustment: Option<Adjustment>,
    /// Cancels the sequence when triggered.
    pub cancel: CancellationToken,
}

impl HistoricalQuery {
    /// Empty query: all data, server defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to `[start, end]`.
    #[must_use]
    pub const fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    /// Set total and page caps.
    #[must_use]
    pub const fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the sort order.
    #[must_use]
    pub const fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Attach a cancellation token.
    #[must_use]
    pub fn cancel_with(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Filters for the news endpoint.
#[derive(Debug, Clone, Default)]
pub struct NewsQuery {
    /// Related symbols; all news when empty.
    pub symbols: Vec<String>,
    /// Inclusive start.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive end.
    pub end: Option<DateTime<Utc>>,
    /// Sort by update time.
    pub sort: Option<Sort>,
    /// Include article bodies.
    pub include_content: Option<bool>,
    /// Skip articles without a body.
    pub exclude_contentless: Option<bool>,
    /// Total and per-page caps; total defaults to 10.
    pub limits: Limits,
    /// Cancels the sequence when triggered.
    pub cancel: CancellationToken,
}

/// Filters for the option chain endpoint.
#[derive(Debug, Clone, Default)]
pub struct OptionChainQuery {
    /// `indicative` or `opra`; the client's option feed when unset.
    pub feed: Option<String>,
    /// `call` or `put`.
    pub contract_type: Option<String>,
    /// Minimum strike.
    pub strike_price_gte: Option<String>,
    /// Maximum strike.
    pub strike_price_lte: Option<String>,
    /// Exact expiration.
    pub expiration_date: Option<NaiveDate>,
    /// Earliest expiration.
    pub expiration_date_gte: Option<NaiveDate>,
    /// Latest expiration.
    pub expiration_date_lte: Option<NaiveDate>,
    /// Option root symbol.
    pub root_symbol: Option<String>,
    /// Total and per-page caps; total defaults to 10000.
    pub limits: Limits,
    /// Cancels the sequence when triggered.
    pub cancel: CancellationToken,
}

/// Filters for the corporate actions endpoint.
#[derive(Debug, Clone, Default)]
pub struct CorporateActionQuery {
    /// Categories to include; all when empty.
    pub types: Vec<CorporateActionKind>,
    /// Inclusive start date.
    pub start: Option<NaiveDate>,
    /// Inclusive end date.
    pub end: Option<NaiveDate>,
    /// Sort order.
    pub sort: Option<Sort>,
    /// Total and per-page caps; total defaults to 10000.
    pub limits: Limits,
    /// Cancels the sequence when triggered.
    pub cancel: CancellationToken,
}

// =============================================================================
// Client
// =============================================================================

/// Market data REST client.
#[derive(Clone)]
pub struct MarketDataClient {
    transport: Arc<dyn DataTransport>,
    feed: DataFeed,
    option_feed: String,
}

impl MarketDataClient {
    /// Client for the configured data API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &AlpacaConfig) -> Result<Self, ApiError> {
        let http = HttpClient::new(&config.data_base_url, &config.credentials, config.timeout)?;
        Ok(Self {
            transport: Arc::new(http),
            feed: config.feed,
            option_feed: config.option_feed.clone(),
        })
    }

    /// Client over any transport.
    #[must_use]
    pub fn with_transport(transport: Arc<dyn DataTransport>, feed: DataFeed) -> Self {
        Self {
            transport,
            feed,
            option_feed: "indicative".to_string(),
        }
    }

    fn historical(path: String, key: &str, query: &HistoricalQuery) -> PageRequest {
        PageRequest::new(path, key)
            .param_opt("start", query.start.map(|t| t.to_rfc3339()))
            .param_opt("end", query.end.map(|t| t.to_rfc3339()))
            .param_opt("sort", query.sort.map(Sort::as_str))
            .limits(query.limits)
    }

    fn stock(&self, path: String, key: &str, query: &HistoricalQuery) -> PageRequest {
        Self::historical(path, key, query)
            .param("feed", query.feed.unwrap_or(self.feed).as_str())
    }

    fn single<T>(
        &self,
        symbol: &str,
        request: PageRequest,
        cancel: &CancellationToken,
    ) -> Result<DataStream<T>, DataError>
    where
        T: DeserializeOwned + WithSymbol + Send + 'static,
    {
        let symbol = symbol.to_string();
        Ok(paginate::<T>(Arc::clone(&self.transport), request, cancel.clone())?
            .map_ok(move |mut item| {
                item.set_symbol(symbol.clone());
                item
            })
            .boxed())
    }

    fn multi<T, I, S>(
        &self,
        symbols: I,
        request: PageRequest,
        cancel: &CancellationToken,
    ) -> Result<DataStream<T>, DataError>
    where
        T: DeserializeOwned + WithSymbol + Send + 'static,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(fan_out::<T, _, _>(Arc::clone(&self.transport), symbols, request, cancel.clone())?
            .map_ok(tagged)
            .boxed())
    }

    // -------------------------------------------------------------------------
    // Stocks
    // -------------------------------------------------------------------------

    /// Historical trades for one symbol.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidLimit`] for negative limits.
    pub fn trades(
        &self,
        symbol: &str,
        query: &HistoricalQuery,
    ) -> Result<DataStream<Trade>, DataError> {
        let request = self.stock(format!("/v2/stocks/{symbol}/trades"), "trades", query);
        self.single(symbol, request, &query.cancel)
    }

    /// Historical quotes for one symbol.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidLimit`] for negative limits.
    pub fn quotes(
        &self,
        symbol: &str,
        query: &HistoricalQuery,
    ) -> Result<DataStream<Quote>, DataError> {
        let request = self.stock(format!("/v2/stocks/{symbol}/quotes"), "quotes", query);
        self.single(symbol, request, &query.cancel)
    }

    /// Historical bars for one symbol.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidLimit`] for negative limits.
    pub fn bars(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        query: &HistoricalQuery,
    ) -> Result<DataStream<Bar>, DataError> {
        let request = self
            .stock(format!("/v2/stocks/{symbol}/bars"), "bars", query)
            .param("timeframe", timeframe)
            .param_opt("adjustment", query.adjustment.map(Adjustment::as_str));
        self.single(symbol, request, &query.cancel)
    }

    /// Historical trades for several symbols, merged in response order.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptySymbols`] or [`DataError::InvalidLimit`]
    /// before any request.
    pub fn multi_trades<I, S>(
        &self,
        symbols: I,
        query: &HistoricalQuery,
    ) -> Result<DataStream<Trade>, DataError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let request = self.stock("/v2/stocks/trades".to_string(), "trades", query);
        self.multi(symbols, request, &query.cancel)
    }

    /// Historical quotes for several symbols, merged in response order.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptySymbols`] or [`DataError::InvalidLimit`]
    /// before any request.
    pub fn multi_quotes<I, S>(
        &self,
        symbols: I,
        query: &HistoricalQuery,
    ) -> Result<DataStream<Quote>, DataError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let request = self.stock("/v2/stocks/quotes".to_string(), "quotes", query);
        self.multi(symbols, request, &query.cancel)
    }

    /// Historical bars for several symbols, merged in response order.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptySymbols`] or [`DataError::InvalidLimit`]
    /// before any request.
    pub fn multi_bars<I, S>(
        &self,
        symbols: I,
        timeframe: TimeFrame,
        query: &HistoricalQuery,
    ) -> Result<DataStream<Bar>, DataError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let request = self
            .stock("/v2/stocks/bars".to_string(), "bars", query)
            .param("timeframe", timeframe)
            .param_opt("adjustment", query.adjustment.map(Adjustment::as_str));
        self.multi(symbols, request, &query.cancel)
    }

    // -------------------------------------------------------------------------
    // Crypto
    // -------------------------------------------------------------------------

    /// Historical crypto trades, e.g. for `BTC/USD`.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptySymbols`] or [`DataError::InvalidLimit`]
    /// before any request.
    pub fn crypto_trades<I, S>(
        &self,
        symbols: I,
        query: &HistoricalQuery,
    ) -> Result<DataStream<Trade>, DataError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let request = Self::historical("/v1beta3/crypto/us/trades".to_string(), "trades", query);
        self.multi(symbols, request, &query.cancel)
    }

    /// Historical crypto quotes.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptySymbols`] or [`DataError::InvalidLimit`]
    /// before any request.
    pub fn crypto_quotes<I, S>(
        &self,
        symbols: I,
        query: &HistoricalQuery,
    ) -> Result<DataStream<Quote>, DataError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let request = Self::historical("/v1beta3/crypto/us/quotes".to_string(), "quotes", query);
        self.multi(symbols, request, &query.cancel)
    }

    /// Historical crypto bars.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptySymbols`] or [`DataError::InvalidLimit`]
    /// before any request.
    pub fn crypto_bars<I, S>(
        &self,
        symbols: I,
        timeframe: TimeFrame,
        query: &HistoricalQuery,
    ) -> Result<DataStream<Bar>, DataError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let request = Self::historical("/v1beta3/crypto/us/bars".to_string(), "bars", query)
            .param("timeframe", timeframe);
        self.multi(symbols, request, &query.cancel)
    }

    // -------------------------------------------------------------------------
    // Options
    // -------------------------------------------------------------------------

    /// Historical option trades by contract symbol.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptySymbols`] or [`DataError::InvalidLimit`]
    /// before any request.
    pub fn option_trades<I, S>(
        &self,
        symbols: I,
        query: &HistoricalQuery,
    ) -> Result<DataStream<Trade>, DataError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let request = Self::historical("/v1beta1/options/trades".to_string(), "trades", query);
        self.multi(symbols, request, &query.cancel)
    }

    /// Historical option bars by contract symbol.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptySymbols`] or [`DataError::InvalidLimit`]
    /// before any request.
    pub fn option_bars<I, S>(
        &self,
        symbols: I,
        timeframe: TimeFrame,
        query: &HistoricalQuery,
    ) -> Result<DataStream<Bar>, DataError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let request = Self::historical("/v1beta1/options/bars".to_string(), "bars", query)
            .param("timeframe", timeframe);
        self.multi(symbols, request, &query.cancel)
    }

    /// Snapshots of every contract on `underlying`, one item per contract.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidLimit`] for negative limits.
    pub fn option_chain(
        &self,
        underlying: &str,
        query: &OptionChainQuery,
    ) -> Result<DataStream<OptionSnapshot>, DataError> {
        let feed = query.feed.clone().unwrap_or_else(|| self.option_feed.clone());
        let request = PageRequest::new(format!("/v1beta1/options/snapshots/{underlying}"), "snapshots")
            .endpoint(EndpointLimits::OPTION_CHAIN)
            .limits(query.limits)
            .param("feed", feed)
            .param_opt("type", query.contract_type.as_deref())
            .param_opt("strike_price_gte", query.strike_price_gte.as_deref())
            .param_opt("strike_price_lte", query.strike_price_lte.as_deref())
            .param_opt("expiration_date", query.expiration_date)
            .param_opt("expiration_date_gte", query.expiration_date_gte)
            .param_opt("expiration_date_lte", query.expiration_date_lte)
            .param_opt("root_symbol", query.root_symbol.as_deref());

        Ok(keyed_pages::<OptionSnapshot>(Arc::clone(&self.transport), request, query.cancel.clone())?
            .map_ok(tagged)
            .boxed())
    }

    // -------------------------------------------------------------------------
    // News
    // -------------------------------------------------------------------------

    /// News articles, newest first unless sorted otherwise. Returns 10
    /// articles unless a total limit is given.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidLimit`] for negative limits.
    pub fn news(&self, query: &NewsQuery) -> Result<DataStream<NewsArticle>, DataError> {
        let symbols = (!query.symbols.is_empty()).then(|| query.symbols.join(","));
        let request = PageRequest::new("/v1beta1/news", "news")
            .endpoint(EndpointLimits::NEWS)
            .limits(query.limits)
            .param_opt("symbols", symbols)
            .param_opt("start", query.start.map(|t| t.to_rfc3339()))
            .param_opt("end", query.end.map(|t| t.to_rfc3339()))
            .param_opt("sort", query.sort.map(Sort::as_str))
            .param_opt("include_content", query.include_content)
            .param_opt("exclude_contentless", query.exclude_contentless);
        paginate(Arc::clone(&self.transport), request, query.cancel.clone())
    }

    // -------------------------------------------------------------------------
    // Corporate Actions
    // -------------------------------------------------------------------------

    /// Corporate actions affecting `symbols`, one item per action.
    ///
    /// Pages list actions by category; items keep that order and carry
    /// their category in [`CorporateAction::kind`]. The total cap counts
    /// actions across all categories.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptySymbols`] or [`DataError::InvalidLimit`]
    /// before any request.
    pub fn corporate_actions<I, S>(
        &self,
        symbols: I,
        query: &CorporateActionQuery,
    ) -> Result<DataStream<CorporateAction>, DataError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let types = (!query.types.is_empty()).then(|| {
            query
                .types
                .iter()
                .map(CorporateActionKind::as_str)
                .collect::<Vec<_>>()
                .join(",")
        });
        let request = PageRequest::new("/v1beta1/corporate-actions", "corporate_actions")
            .endpoint(EndpointLimits::CORPORATE_ACTIONS)
            .limits(query.limits)
            .param_opt("types", types)
            .param_opt("start", query.start)
            .param_opt("end", query.end)
            .param_opt("sort", query.sort.map(Sort::as_str));

        Ok(fan_out::<CorporateAction, _, _>(
            Arc::clone(&self.transport),
            symbols,
            request,
            query.cancel.clone(),
        )?
        .map_ok(|SymbolItem { symbol, mut item }| {
            item.kind = CorporateActionKind::from(symbol.as_str());
            item
        })
        .boxed())
    }

    // -------------------------------------------------------------------------
    // Latest & Snapshots (not paged)
    // -------------------------------------------------------------------------

    async fn get(&self, path: &str, query: &QueryParams) -> Result<Value, DataError> {
        Ok(self.transport.get_json(path, query).await?)
    }

    fn feed_param(&self) -> QueryParams {
        vec![("feed".to_string(), self.feed.as_str().to_string())]
    }

    async fn latest_one<T>(&self, symbol: &str, kind: &str, key: &str) -> Result<T, DataError>
    where
        T: DeserializeOwned + WithSymbol,
    {
        let mut page = self
            .get(&format!("/v2/stocks/{symbol}/{kind}/latest"), &self.feed_param())
            .await?;
        let mut item: T = decode_item(key, page.get_mut(key).map(Value::take).unwrap_or_default())?;
        item.set_symbol(symbol.to_string());
        Ok(item)
    }

    fn option_feed_param(&self) -> QueryParams {
        vec![("feed".to_string(), self.option_feed.clone())]
    }

    /// GET `path` for `symbols` and decode `{ <key>: { <symbol>: item } }`.
    async fn by_symbol<T, I, S>(
        &self,
        path: &str,
        mut query: QueryParams,
        symbols: I,
        key: &str,
    ) -> Result<Vec<T>, DataError>
    where
        T: DeserializeOwned + WithSymbol,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        push(&mut query, "symbols", Some(join_symbols(symbols)?));
        let mut page = self.get(path, &query).await?;
        let by_symbol = page.get_mut(key).map(Value::take).unwrap_or_default();
        keyed(by_symbol, key)
    }

    async fn latest_many<T, I, S>(&self, symbols: I, kind: &str) -> Result<Vec<T>, DataError>
    where
        T: DeserializeOwned + WithSymbol,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let path = format!("/v2/stocks/{kind}/latest");
        self.by_symbol(&path, self.feed_param(), symbols, kind).await
    }

    /// Latest trade for one symbol.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body does not decode.
    pub async fn latest_trade(&self, symbol: &str) -> Result<Trade, DataError> {
        self.latest_one(symbol, "trades", "trade").await
    }

    /// Latest trades for several symbols, in response order.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptySymbols`] before any request, or an error if
    /// the request fails or the body does not decode.
    pub async fn latest_trades<I, S>(&self, symbols: I) -> Result<Vec<Trade>, DataError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.latest_many(symbols, "trades").await
    }

    /// Latest quote for one symbol.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body does not decode.
    pub async fn latest_quote(&self, symbol: &str) -> Result<Quote, DataError> {
        self.latest_one(symbol, "quotes", "quote").await
    }

    /// Latest quotes for several symbols, in response order.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptySymbols`] before any request, or an error if
    /// the request fails or the body does not decode.
    pub async fn latest_quotes<I, S>(&self, symbols: I) -> Result<Vec<Quote>, DataError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.latest_many(symbols, "quotes").await
    }

    /// Latest minute bar for one symbol.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body does not decode.
    pub async fn latest_bar(&self, symbol: &str) -> Result<Bar, DataError> {
        self.latest_one(symbol, "bars", "bar").await
    }

    /// Latest minute bars for several symbols, in response order.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptySymbols`] before any request, or an error if
    /// the request fails or the body does not decode.
    pub async fn latest_bars<I, S>(&self, symbols: I) -> Result<Vec<Bar>, DataError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.latest_many(symbols, "bars").await
    }

    /// Snapshot for one symbol.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body does not decode.
    pub async fn snapshot(&self, symbol: &str) -> Result<Snapshot, DataError> {
        let page = self
            .get(&format!("/v2/stocks/{symbol}/snapshot"), &self.feed_param())
            .await?;
        let mut snapshot: Snapshot = decode_item("snapshot", page)?;
        snapshot.symbol = symbol.to_string();
        Ok(snapshot)
    }

    /// Snapshots for several symbols, in response order.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptySymbols`] before any request, or an error if
    /// the request fails or the body does not decode.
    pub async fn snapshots<I, S>(&self, symbols: I) -> Result<Vec<Snapshot>, DataError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut query = self.feed_param();
        push(&mut query, "symbols", Some(join_symbols(symbols)?));
        let page = self.get("/v2/stocks/snapshots", &query).await?;
        keyed(page, "snapshots")
    }

    // -------------------------------------------------------------------------
    // Latest crypto (not paged)
    // -------------------------------------------------------------------------

    /// Latest crypto trades, in response order.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptySymbols`] before any request, or an error if
    /// the request fails or the body does not decode.
    pub async fn latest_crypto_trades<I, S>(&self, symbols: I) -> Result<Vec<Trade>, DataError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.by_symbol("/v1beta3/crypto/us/latest/trades", Vec::new(), symbols, "trades")
            .await
    }

    /// Latest crypto quotes, in response order.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptySymbols`] before any request, or an error if
    /// the request fails or the body does not decode.
    pub async fn latest_crypto_quotes<I, S>(&self, symbols: I) -> Result<Vec<Quote>, DataError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.by_symbol("/v1beta3/crypto/us/latest/quotes", Vec::new(), symbols, "quotes")
            .await
    }

    /// Latest crypto minute bars, in response order.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptySymbols`] before any request, or an error if
    /// the request fails or the body does not decode.
    pub async fn latest_crypto_bars<I, S>(&self, symbols: I) -> Result<Vec<Bar>, DataError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.by_symbol("/v1beta3/crypto/us/latest/bars", Vec::new(), symbols, "bars")
            .await
    }

    /// Latest crypto order books, in response order.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptySymbols`] before any request, or an error if
    /// the request fails or the body does not decode.
    pub async fn latest_crypto_orderbooks<I, S>(
        &self,
        symbols: I,
    ) -> Result<Vec<Orderbook>, DataError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.by_symbol("/v1beta3/crypto/us/latest/orderbooks", Vec::new(), symbols, "orderbooks")
            .await
    }

    /// Crypto snapshots, in response order.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptySymbols`] before any request, or an error if
    /// the request fails or the body does not decode.
    pub async fn crypto_snapshots<I, S>(&self, symbols: I) -> Result<Vec<Snapshot>, DataError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.by_symbol("/v1beta3/crypto/us/snapshots", Vec::new(), symbols, "snapshots")
            .await
    }

    // -------------------------------------------------------------------------
    // Latest options (not paged)
    // -------------------------------------------------------------------------

    /// Latest option trades by contract symbol.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptySymbols`] before any request, or an error if
    /// the request fails or the body does not decode.
    pub async fn latest_option_trades<I, S>(&self, symbols: I) -> Result<Vec<Trade>, DataError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.by_symbol("/v1beta1/options/trades/latest", self.option_feed_param(), symbols, "trades")
            .await
    }

    /// Latest option quotes by contract symbol.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptySymbols`] before any request, or an error if
    /// the request fails or the body does not decode.
    pub async fn latest_option_quotes<I, S>(&self, symbols: I) -> Result<Vec<Quote>, DataError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.by_symbol("/v1beta1/options/quotes/latest", self.option_feed_param(), symbols, "quotes")
            .await
    }

    /// Snapshots of the given option contracts.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptySymbols`] before any request, or an error if
    /// the request fails or the body does not decode.
    pub async fn option_snapshots<I, S>(&self, symbols: I) -> Result<Vec<OptionSnapshot>, DataError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.by_symbol("/v1beta1/options/snapshots", self.option_feed_param(), symbols, "snapshots")
            .await
    }
}

fn keyed<T>(by_symbol: Value, key: &str) -> Result<Vec<T>, DataError>
where
    T: DeserializeOwned + WithSymbol,
{
    if by_symbol.is_null() {
        return Ok(Vec::new());
    }
    Ok(decode_keyed::<T>(by_symbol, key)?.into_iter().map(tagged).collect())
}

impl std::fmt::Debug for MarketDataClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataClient")
            .field("feed", &self.feed)
            .field("option_feed", &self.option_feed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockDataTransport;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn client(transport: MockDataTransport) -> MarketDataClient {
        MarketDataClient::with_transport(Arc::new(transport), DataFeed::Sip)
    }

    fn has(query: &QueryParams, key: &str, value: &str) -> bool {
        query.iter().any(|(k, v)| k == key && v == value)
    }

    #[tokio::test]
    async fn single_symbol_trades_get_symbol_filled() {
        let mut transport = MockDataTransport::new();
        transport.expect_get_json().times(1).returning(|path, query| {
            assert_eq!(path, "/v2/stocks/AAPL/trades");
            assert!(has(query, "feed", "sip"));
            Ok(json!({
                "trades": [{ "t": "2024-01-02T15:00:00Z", "x": "V", "p": 187.1, "s": 10, "i": 1, "z": "C" }],
                "symbol": "AAPL",
                "next_page_token": null
            }))
        });

        let trades: Vec<Trade> = client(transport)
            .trades("AAPL", &HistoricalQuery::new())
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].symbol, "AAPL");
    }

    #[tokio::test]
    async fn multi_bars_tag_items_with_response_keys() {
        let mut transport = MockDataTransport::new();
        transport.expect_get_json().times(1).returning(|path, query| {
            assert_eq!(path, "/v2/stocks/bars");
            assert!(has(query, "symbols", "MSFT,AAPL"));
            assert!(has(query, "timeframe", "1Day"));
            Ok(json!({
                "bars": {
                    "MSFT": [{ "t": "2024-01-02T05:00:00Z", "o": 1, "h": 2, "l": 1, "c": 2, "v": 10 }],
                    "AAPL": [{ "t": "2024-01-02T05:00:00Z", "o": 3, "h": 4, "l": 3, "c": 4, "v": 20 }]
                }
            }))
        });

        let bars: Vec<Bar> = client(transport)
            .multi_bars(["MSFT", "AAPL"], TimeFrame::DAY, &HistoricalQuery::new())
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let symbols: Vec<&str> = bars.iter().map(|b| b.symbol.as_str()).collect();
        assert_eq!(symbols, ["MSFT", "AAPL"]);
    }

    #[tokio::test]
    async fn news_defaults_to_ten_articles() {
        let mut transport = MockDataTransport::new();
        transport.expect_get_json().times(1).returning(|path, query| {
            assert_eq!(path, "/v1beta1/news");
            assert!(has(query, "limit", "10"));
            Ok(json!({ "news": [], "next_page_token": null }))
        });

        let articles: Vec<NewsArticle> = client(transport)
            .news(&NewsQuery::default())
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert!(articles.is_empty());
    }

    #[tokio::test]
    async fn latest_trades_preserve_response_order() {
        let mut transport = MockDataTransport::new();
        transport.expect_get_json().times(1).returning(|path, _| {
            assert_eq!(path, "/v2/stocks/trades/latest");
            Ok(json!({
                "trades": {
                    "TSLA": { "t": "2024-01-02T15:00:00Z", "p": 250, "s": 1 },
                    "AAPL": { "t": "2024-01-02T15:00:01Z", "p": 187, "s": 2 }
                }
            }))
        });

        let trades = client(transport).latest_trades(["AAPL", "TSLA"]).await.unwrap();
        let symbols: Vec<&str> = trades.iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(symbols, ["TSLA", "AAPL"]);
    }

    #[tokio::test]
    async fn latest_with_no_symbols_makes_no_request() {
        let mut transport = MockDataTransport::new();
        transport.expect_get_json().times(0);
        let none: [&str; 0] = [];
        let result = client(transport).latest_quotes(none).await;
        assert_eq!(result, Err(DataError::EmptySymbols));
    }

    #[tokio::test]
    async fn corporate_actions_are_tagged_and_capped_across_categories() {
        let mut transport = MockDataTransport::new();
        let mut seq = mockall::Sequence::new();
        transport
            .expect_get_json()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|path, query| {
                assert_eq!(path, "/v1beta1/corporate-actions");
                assert!(has(query, "symbols", "AAPL,TSLA"));
                assert!(has(query, "types", "cash_dividends,forward_splits"));
                assert!(has(query, "limit", "4"));
                Ok(json!({
                    "corporate_actions": {
                        "cash_dividends": [
                            { "symbol": "AAPL", "rate": 0.24, "ex_date": "2024-02-09" },
                            { "symbol": "AAPL", "rate": 0.24, "ex_date": "2024-05-10" }
                        ],
                        "forward_splits": [
                            { "symbol": "TSLA", "new_rate": 3, "old_rate": 1, "ex_date": "2022-08-25" }
                        ]
                    },
                    "next_page_token": "n1"
                }))
            });
        transport
            .expect_get_json()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, query| {
                assert!(has(query, "page_token", "n1"));
                assert!(has(query, "limit", "1"));
                Ok(json!({
                    "corporate_actions": {
                        "cash_dividends": [{ "symbol": "AAPL", "rate": 0.25, "ex_date": "2024-08-12" }]
                    },
                    "next_page_token": "n2"
                }))
            });

        let query = CorporateActionQuery {
            types: vec![CorporateActionKind::CashDividend, CorporateActionKind::ForwardSplit],
            limits: Limits::none().total(4),
            ..CorporateActionQuery::default()
        };
        let actions: Vec<CorporateAction> = client(transport)
            .corporate_actions(["AAPL", "TSLA"], &query)
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        let kinds: Vec<_> = actions.iter().map(|a| a.kind.clone()).collect();
        assert_eq!(
            kinds,
            [
                CorporateActionKind::CashDividend,
                CorporateActionKind::CashDividend,
                CorporateActionKind::ForwardSplit,
                CorporateActionKind::CashDividend,
            ]
        );
        assert_eq!(actions[2].details.get("new_rate"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn corporate_actions_page_at_beta_maximum() {
        let mut transport = MockDataTransport::new();
        transport.expect_get_json().times(1).returning(|_, query| {
            assert!(has(query, "limit", "1000"));
            assert!(!query.iter().any(|(k, _)| k == "types"));
            Ok(json!({ "corporate_actions": {}, "next_page_token": null }))
        });

        let actions: Vec<CorporateAction> = client(transport)
            .corporate_actions(["AAPL"], &CorporateActionQuery::default())
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert!(actions.is_empty());
    }

    #[tokio::test]
    async fn latest_crypto_orderbooks_are_keyed_by_pair() {
        let mut transport = MockDataTransport::new();
        transport.expect_get_json().times(1).returning(|path, query| {
            assert_eq!(path, "/v1beta3/crypto/us/latest/orderbooks");
            assert!(has(query, "symbols", "BTC/USD,ETH/USD"));
            assert!(!query.iter().any(|(k, _)| k == "feed"));
            Ok(json!({
                "orderbooks": {
                    "BTC/USD": {
                        "t": "2024-01-02T15:00:00Z",
                        "b": [{ "p": 42000.5, "s": 0.5 }],
                        "a": [{ "p": 42001, "s": 1.25 }]
                    },
                    "ETH/USD": { "t": "2024-01-02T15:00:00Z", "b": [], "a": [] }
                }
            }))
        });

        let books = client(transport)
            .latest_crypto_orderbooks(["BTC/USD", "ETH/USD"])
            .await
            .unwrap();
        assert_eq!(books.len(), 2);
        assert_eq!(books[0].symbol, "BTC/USD");
        assert_eq!(books[0].bids[0].price, Decimal::new(420_005, 1));
        assert_eq!(books[0].asks[0].size, Decimal::new(125, 2));
        assert!(books[1].bids.is_empty());
    }

    #[tokio::test]
    async fn latest_crypto_trades_use_v1beta3_path() {
        let mut transport = MockDataTransport::new();
        transport.expect_get_json().times(1).returning(|path, _| {
            assert_eq!(path, "/v1beta3/crypto/us/latest/trades");
            Ok(json!({
                "trades": { "BTC/USD": { "t": "2024-01-02T15:00:00Z", "p": 42000, "s": 0.1, "i": 9 } }
            }))
        });

        let trades = client(transport).latest_crypto_trades(["BTC/USD"]).await.unwrap();
        assert_eq!(trades[0].symbol, "BTC/USD");
    }

    #[tokio::test]
    async fn option_snapshots_send_option_feed() {
        let mut transport = MockDataTransport::new();
        transport.expect_get_json().times(1).returning(|path, query| {
            assert_eq!(path, "/v1beta1/options/snapshots");
            assert!(has(query, "feed", "indicative"));
            assert!(has(query, "symbols", "AAPL240119C00100000"));
            Ok(json!({
                "snapshots": {
                    "AAPL240119C00100000": { "impliedVolatility": 0.31, "greeks": null }
                }
            }))
        });

        let snapshots = client(transport)
            .option_snapshots(["AAPL240119C00100000"])
            .await
            .unwrap();
        assert_eq!(snapshots[0].symbol, "AAPL240119C00100000");
        assert_eq!(snapshots[0].implied_volatility, Some(Decimal::new(31, 2)));
    }

    #[tokio::test]
    async fn latest_option_quotes_use_options_path() {
        let mut transport = MockDataTransport::new();
        transport.expect_get_json().times(1).returning(|path, _| {
            assert_eq!(path, "/v1beta1/options/quotes/latest");
            Ok(json!({
                "quotes": {
                    "SPY240119P00400000": {
                        "t": "2024-01-02T15:00:00Z", "bp": 1.1, "bs": 5, "ap": 1.2, "as": 7
                    }
                }
            }))
        });

        let quotes = client(transport)
            .latest_option_quotes(["SPY240119P00400000"])
            .await
            .unwrap();
        assert_eq!(quotes[0].symbol, "SPY240119P00400000");
    }

    #[tokio::test]
    async fn snapshot_fills_symbol() {
        let mut transport = MockDataTransport::new();
        transport
            .expect_get_json()
            .returning(|_, _| Ok(json!({ "latestTrade": null, "dailyBar": null })));

        let snapshot = client(transport).snapshot("SPY").await.unwrap();
        assert_eq!(snapshot.symbol, "SPY");
        assert!(snapshot.latest_trade.is_none());
    }
}
