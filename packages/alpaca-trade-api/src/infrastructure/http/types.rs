//! REST Resource Types
//!
//! Trading API resources (orders, account, positions, assets, clock,
//! calendar, watchlists) and the market data types that only appear over
//! REST (snapshots, news, option snapshots, crypto order books, corporate
//! actions). Trades, quotes and bars share
//! their stream types in [`crate::infrastructure::alpaca::messages`].
//!
//! Numeric fields the API sends as strings decode into [`Decimal`].

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::application::ports::QueryParams;
use crate::infrastructure::alpaca::messages::{Bar, Quote, Trade};

// =============================================================================
// Orders
// =============================================================================

/// Buy or sell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    /// Buy.
    #[default]
    Buy,
    /// Sell.
    Sell,
}

/// Order type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Market.
    #[default]
    Market,
    /// Limit.
    Limit,
    /// Stop.
    Stop,
    /// Stop limit.
    StopLimit,
    /// Trailing stop.
    TrailingStop,
}

/// Time in force.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeInForce {
    /// Day.
    #[default]
    Day,
    /// Good til canceled.
    Gtc,
    /// Market on open.
    Opg,
    /// Market on close.
    Cls,
    /// Immediate or cancel.
    Ioc,
    /// Fill or kill.
    Fok,
}

/// Order status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Accepted and routed.
    #[default]
    New,
    /// Partially filled.
    PartiallyFilled,
    /// Filled.
    Filled,
    /// Done for the day.
    DoneForDay,
    /// Canceled.
    Canceled,
    /// Expired.
    Expired,
    /// Replaced.
    Replaced,
    /// Cancel pending.
    PendingCancel,
    /// Replace pending.
    PendingReplace,
    /// Not yet routed.
    PendingNew,
    /// Accepted.
    Accepted,
    /// Accepted for bidding.
    AcceptedForBidding,
    /// Stopped.
    Stopped,
    /// Rejected.
    Rejected,
    /// Suspended.
    Suspended,
    /// Calculated.
    Calculated,
    /// Held (bracket leg waiting on its parent).
    Held,
    /// Any status this client does not know.
    #[serde(other)]
    Unknown,
}

/// An order as returned by the trading API and the trade updates stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order ID.
    pub id: String,
    /// Client-assigned ID.
    #[serde(default)]
    pub client_order_id: String,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Submission time.
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    /// Fill time.
    #[serde(default)]
    pub filled_at: Option<DateTime<Utc>>,
    /// Cancel time.
    #[serde(default)]
    pub canceled_at: Option<DateTime<Utc>>,
    /// ID of the order that replaced this one.
    #[serde(default)]
    pub replaced_by: Option<String>,
    /// ID of the order this one replaced.
    #[serde(default)]
    pub replaces: Option<String>,
    /// Asset ID.
    #[serde(default)]
    pub asset_id: String,
    /// Symbol.
    pub symbol: String,
    /// Asset class.
    #[serde(default)]
    pub asset_class: String,
    /// Dollar amount for notional orders.
    #[serde(default)]
    pub notional: Option<Decimal>,
    /// Share quantity.
    #[serde(default)]
    pub qty: Option<Decimal>,
    /// Filled quantity.
    #[serde(default)]
    pub filled_qty: Decimal,
    /// Average fill price.
    #[serde(default)]
    pub filled_avg_price: Option<Decimal>,
    /// `simple`, `bracket`, `oco` or `oto`.
    #[serde(default)]
    pub order_class: String,
    /// Order type.
    #[serde(rename = "type", default)]
    pub order_type: OrderType,
    /// Side.
    #[serde(default)]
    pub side: OrderSide,
    /// Time in force.
    #[serde(default)]
    pub time_in_force: TimeInForce,
    /// Limit price.
    #[serde(default)]
    pub limit_price: Option<Decimal>,
    /// Stop price.
    #[serde(default)]
    pub stop_price: Option<Decimal>,
    /// Trailing stop in dollars.
    #[serde(default)]
    pub trail_price: Option<Decimal>,
    /// Trailing stop in percent.
    #[serde(default)]
    pub trail_percent: Option<Decimal>,
    /// Status.
    #[serde(default)]
    pub status: OrderStatus,
    /// Eligible for extended hours.
    #[serde(default)]
    pub extended_hours: bool,
    /// Bracket/OCO legs.
    #[serde(default)]
    pub legs: Option<Vec<Order>>,
}

/// Take-profit leg of a bracket order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TakeProfit {
    /// Limit price.
    pub limit_price: Decimal,
}

/// Stop-loss leg of a bracket order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopLoss {
    /// Stop price.
    pub stop_price: Decimal,
    /// Optional limit price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
}

/// Order submission body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewOrder {
    /// Symbol.
    pub symbol: String,
    /// Share quantity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qty: Option<Decimal>,
    /// Dollar amount.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notional: Option<Decimal>,
    /// Side.
    pub side: OrderSide,
    /// Order type.
    #[serde(rename = "type")]
    pub order_type: OrderType,
    /// Time in force.
    pub time_in_force: TimeInForce,
    /// Limit price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
    /// Stop price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Decimal>,
    /// Trailing stop in dollars.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trail_price: Option<Decimal>,
    /// Trailing stop in percent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trail_percent: Option<Decimal>,
    /// Eligible for extended hours.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub extended_hours: bool,
    /// Client-assigned ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
    /// `bracket`, `oco` or `oto`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_class: Option<String>,
    /// Take-profit leg.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<TakeProfit>,
    /// Stop-loss leg.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<StopLoss>,
}

impl NewOrder {
    /// Day market order for `qty` shares.
    #[must_use]
    pub fn market(symbol: impl Into<String>, side: OrderSide, qty: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            qty: Some(qty),
            notional: None,
            side,
            order_type: OrderType::Market,
            time_in_force: TimeInForce::Day,
            limit_price: None,
            stop_price: None,
            trail_price: None,
            trail_percent: None,
            extended_hours: false,
            client_order_id: None,
            order_class: None,
            take_profit: None,
            stop_loss: None,
        }
    }

    /// Day limit order for `qty` shares at `limit_price`.
    #[must_use]
    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        qty: Decimal,
        limit_price: Decimal,
    ) -> Self {
        Self {
            order_type: OrderType::Limit,
            limit_price: Some(limit_price),
            ..Self::market(symbol, side, qty)
        }
    }

    /// Set the time in force.
    #[must_use]
    pub const fn time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    /// Set the client order ID.
    #[must_use]
    pub fn client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }

    /// Set a random v4 UUID as the client order ID.
    #[must_use]
    pub fn with_generated_client_order_id(self) -> Self {
        self.client_order_id(uuid::Uuid::new_v4().to_string())
    }

    /// Allow execution in extended hours.
    #[must_use]
    pub const fn extended_hours(mut self) -> Self {
        self.extended_hours = true;
        self
    }
}

/// Order replacement body; only set fields change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplaceOrder {
    /// New quantity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qty: Option<Decimal>,
    /// New time in force.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<TimeInForce>,
    /// New limit price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
    /// New stop price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Decimal>,
    /// New trail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trail: Option<Decimal>,
    /// New client order ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
}

/// Which orders to list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderStatusFilter {
    /// Open orders only.
    #[default]
    Open,
    /// Closed orders only.
    Closed,
    /// Everything.
    All,
}

impl OrderStatusFilter {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::All => "all",
        }
    }
}

/// Order list filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQuery {
    /// Status filter.
    pub status: Option<OrderStatusFilter>,
    /// Maximum orders returned.
    pub limit: Option<u32>,
    /// Only orders submitted after this time.
    pub after: Option<DateTime<Utc>>,
    /// Only orders submitted before this time.
    pub until: Option<DateTime<Utc>>,
    /// `asc` or `desc`.
    pub direction: Option<Sort>,
    /// Roll up bracket legs under their parent.
    pub nested: Option<bool>,
    /// Restrict to these symbols.
    pub symbols: Vec<String>,
}

impl OrderQuery {
    pub(crate) fn to_params(&self) -> QueryParams {
        let mut params = QueryParams::new();
        push(&mut params, "status", self.status.map(OrderStatusFilter::as_str));
        push(&mut params, "limit", self.limit);
        push(&mut params, "after", self.after.map(|t| t.to_rfc3339()));
        push(&mut params, "until", self.until.map(|t| t.to_rfc3339()));
        push(&mut params, "direction", self.direction.map(Sort::as_str));
        push(&mut params, "nested", self.nested);
        if !self.symbols.is_empty() {
            push(&mut params, "symbols", Some(self.symbols.join(",")));
        }
        params
    }
}

/// Per-order result of a bulk cancel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrderCancellation {
    /// Order ID.
    pub id: String,
    /// HTTP status of the individual cancel.
    pub status: u16,
}

// =============================================================================
// Account & Positions
// =============================================================================

/// Trading account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account ID.
    pub id: String,
    /// Account number.
    #[serde(default)]
    pub account_number: String,
    /// Status, e.g. `ACTIVE`.
    pub status: String,
    /// Currency.
    #[serde(default)]
    pub currency: String,
    /// Cash balance.
    #[serde(default)]
    pub cash: Decimal,
    /// Portfolio value.
    #[serde(default)]
    pub portfolio_value: Decimal,
    /// Equity.
    #[serde(default)]
    pub equity: Decimal,
    /// Equity at the previous close.
    #[serde(default)]
    pub last_equity: Decimal,
    /// Buying power.
    #[serde(default)]
    pub buying_power: Decimal,
    /// Long market value.
    #[serde(default)]
    pub long_market_value: Decimal,
    /// Short market value.
    #[serde(default)]
    pub short_market_value: Decimal,
    /// Initial margin.
    #[serde(default)]
    pub initial_margin: Decimal,
    /// Maintenance margin.
    #[serde(default)]
    pub maintenance_margin: Decimal,
    /// Margin multiplier.
    #[serde(default)]
    pub multiplier: Decimal,
    /// Day trades in the last five sessions.
    #[serde(default)]
    pub daytrade_count: u32,
    /// Flagged as a pattern day trader.
    #[serde(default)]
    pub pattern_day_trader: bool,
    /// Trading blocked.
    #[serde(default)]
    pub trading_blocked: bool,
    /// Transfers blocked.
    #[serde(default)]
    pub transfers_blocked: bool,
    /// Account blocked.
    #[serde(default)]
    pub account_blocked: bool,
    /// Short selling enabled.
    #[serde(default)]
    pub shorting_enabled: bool,
    /// Opening time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Open position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Asset ID.
    #[serde(default)]
    pub asset_id: String,
    /// Symbol.
    pub symbol: String,
    /// Exchange.
    #[serde(default)]
    pub exchange: String,
    /// Asset class.
    #[serde(default)]
    pub asset_class: String,
    /// `long` or `short`.
    #[serde(default)]
    pub side: String,
    /// Quantity.
    pub qty: Decimal,
    /// Quantity not tied up in open orders.
    #[serde(default)]
    pub qty_available: Option<Decimal>,
    /// Average entry price.
    pub avg_entry_price: Decimal,
    /// Market value.
    #[serde(default)]
    pub market_value: Decimal,
    /// Cost basis.
    #[serde(default)]
    pub cost_basis: Decimal,
    /// Unrealized P/L.
    #[serde(default)]
    pub unrealized_pl: Decimal,
    /// Unrealized P/L percent.
    #[serde(default)]
    pub unrealized_plpc: Decimal,
    /// Current price.
    #[serde(default)]
    pub current_price: Decimal,
    /// Previous close.
    #[serde(default)]
    pub lastday_price: Decimal,
    /// Change since previous close.
    #[serde(default)]
    pub change_today: Decimal,
}

/// Per-symbol result of closing every position.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PositionClosure {
    /// Symbol.
    pub symbol: String,
    /// HTTP status of the individual close.
    pub status: u16,
    /// Closing order, when one was placed.
    #[serde(default)]
    pub body: Option<Order>,
}

// =============================================================================
// Assets, Clock, Calendar
// =============================================================================

/// Tradable asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Asset ID.
    pub id: String,
    /// Asset class.
    #[serde(rename = "class", default)]
    pub asset_class: String,
    /// Listing exchange.
    #[serde(default)]
    pub exchange: String,
    /// Symbol.
    pub symbol: String,
    /// Name.
    #[serde(default)]
    pub name: String,
    /// `active` or `inactive`.
    #[serde(default)]
    pub status: String,
    /// Tradable on Alpaca.
    #[serde(default)]
    pub tradable: bool,
    /// Marginable.
    #[serde(default)]
    pub marginable: bool,
    /// Shortable.
    #[serde(default)]
    pub shortable: bool,
    /// Easy to borrow.
    #[serde(default)]
    pub easy_to_borrow: bool,
    /// Fractional trading supported.
    #[serde(default)]
    pub fractionable: bool,
}

/// Asset list filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetQuery {
    /// `active` or `inactive`.
    pub status: Option<String>,
    /// Asset class, e.g. `us_equity`.
    pub asset_class: Option<String>,
    /// Exchange.
    pub exchange: Option<String>,
}

impl AssetQuery {
    pub(crate) fn to_params(&self) -> QueryParams {
        let mut params = QueryParams::new();
        push(&mut params, "status", self.status.as_deref());
        push(&mut params, "asset_class", self.asset_class.as_deref());
        push(&mut params, "exchange", self.exchange.as_deref());
        params
    }
}

/// Market clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clock {
    /// Current time.
    pub timestamp: DateTime<Utc>,
    /// Market open now.
    pub is_open: bool,
    /// Next open.
    pub next_open: DateTime<Utc>,
    /// Next close.
    pub next_close: DateTime<Utc>,
}

/// One market day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calendar {
    /// Date.
    pub date: NaiveDate,
    /// Open time, `HH:MM`.
    pub open: String,
    /// Close time, `HH:MM`.
    pub close: String,
    /// Extended session open, `HHMM`.
    #[serde(default)]
    pub session_open: Option<String>,
    /// Extended session close, `HHMM`.
    #[serde(default)]
    pub session_close: Option<String>,
    /// Settlement date.
    #[serde(default)]
    pub settlement_date: Option<NaiveDate>,
}

/// Calendar range; dates are sent as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalendarQuery {
    /// First day.
    pub start: Option<NaiveDate>,
    /// Last day.
    pub end: Option<NaiveDate>,
}

impl CalendarQuery {
    pub(crate) fn to_params(self) -> QueryParams {
        let mut params = QueryParams::new();
        push(&mut params, "start", self.start);
        push(&mut params, "end", self.end);
        params
    }
}

// =============================================================================
// Watchlists
// =============================================================================

/// Named list of assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watchlist {
    /// Watchlist ID.
    pub id: String,
    /// Owning account.
    #[serde(default)]
    pub account_id: String,
    /// Name.
    pub name: String,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Assets, absent in list responses.
    #[serde(default)]
    pub assets: Vec<Asset>,
}

/// Create/replace body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct WatchlistBody<'a> {
    pub name: &'a str,
    pub symbols: Vec<String>,
}

// =============================================================================
// Market Data (REST only)
// =============================================================================

/// Sort order for historical queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sort {
    /// Oldest first.
    Asc,
    /// Newest first.
    Desc,
}

impl Sort {
    /// Query value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Corporate action adjustment for bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    /// No adjustment.
    Raw,
    /// Split-adjusted.
    Split,
    /// Dividend-adjusted.
    Dividend,
    /// Both.
    All,
}

impl Adjustment {
    /// Query value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Split => "split",
            Self::Dividend => "dividend",
            Self::All => "all",
        }
    }
}

/// Unit of a bar timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFrameUnit {
    /// Minutes.
    Min,
    /// Hours.
    Hour,
    /// Days.
    Day,
    /// Weeks.
    Week,
    /// Months.
    Month,
}

/// Bar aggregation period, rendered as e.g. `5Min` or `1Day`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeFrame {
    /// Number of units.
    pub amount: u32,
    /// Unit.
    pub unit: TimeFrameUnit,
}

impl TimeFrame {
    /// One-minute bars.
    pub const MINUTE: Self = Self::new(1, TimeFrameUnit::Min);
    /// Hourly bars.
    pub const HOUR: Self = Self::new(1, TimeFrameUnit::Hour);
    /// Daily bars.
    pub const DAY: Self = Self::new(1, TimeFrameUnit::Day);

    /// `amount` units.
    #[must_use]
    pub const fn new(amount: u32, unit: TimeFrameUnit) -> Self {
        Self { amount, unit }
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            TimeFrameUnit::Min => "Min",
            TimeFrameUnit::Hour => "Hour",
            TimeFrameUnit::Day => "Day",
            TimeFrameUnit::Week => "Week",
            TimeFrameUnit::Month => "Month",
        };
        write!(f, "{}{unit}", self.amount)
    }
}

/// Latest trade, quote and bars for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Symbol; filled from the request or response key.
    #[serde(default)]
    pub symbol: String,
    /// Latest trade.
    #[serde(default)]
    pub latest_trade: Option<Trade>,
    /// Latest quote.
    #[serde(default)]
    pub latest_quote: Option<Quote>,
    /// Current minute bar.
    #[serde(default)]
    pub minute_bar: Option<Bar>,
    /// Current daily bar.
    #[serde(default)]
    pub daily_bar: Option<Bar>,
    /// Previous daily bar.
    #[serde(default)]
    pub prev_daily_bar: Option<Bar>,
}

/// Option greeks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Greeks {
    /// Delta.
    pub delta: Decimal,
    /// Gamma.
    pub gamma: Decimal,
    /// Rho.
    pub rho: Decimal,
    /// Theta.
    pub theta: Decimal,
    /// Vega.
    pub vega: Decimal,
}

/// Snapshot of one option contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionSnapshot {
    /// Contract symbol; filled from the response key.
    #[serde(default)]
    pub symbol: String,
    /// Latest trade.
    #[serde(default)]
    pub latest_trade: Option<Trade>,
    /// Latest quote.
    #[serde(default)]
    pub latest_quote: Option<Quote>,
    /// Implied volatility.
    #[serde(default)]
    pub implied_volatility: Option<Decimal>,
    /// Greeks.
    #[serde(default)]
    pub greeks: Option<Greeks>,
}

/// News image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsImage {
    /// `thumb`, `small` or `large`.
    pub size: String,
    /// Image URL.
    pub url: String,
}

/// News article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsArticle {
    /// Article ID.
    pub id: u64,
    /// Headline.
    pub headline: String,
    /// Author.
    #[serde(default)]
    pub author: String,
    /// Publication time.
    pub created_at: DateTime<Utc>,
    /// Last update.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Summary.
    #[serde(default)]
    pub summary: String,
    /// Body, when requested.
    #[serde(default)]
    pub content: String,
    /// Original URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Related symbols.
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Source.
    #[serde(default)]
    pub source: String,
    /// Images.
    #[serde(default)]
    pub images: Vec<NewsImage>,
}

/// One price level of a crypto order book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderbookLevel {
    /// Price.
    #[serde(rename = "p")]
    pub price: Decimal,
    /// Size at this price.
    #[serde(rename = "s")]
    pub size: Decimal,
}

/// Latest crypto order book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Orderbook {
    /// Pair, e.g. `BTC/USD`; filled from the response key.
    #[serde(rename = "S", default)]
    pub symbol: String,
    /// Book time.
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
    /// Bids, best first.
    #[serde(rename = "b", default)]
    pub bids: Vec<OrderbookLevel>,
    /// Asks, best first.
    #[serde(rename = "a", default)]
    pub asks: Vec<OrderbookLevel>,
}

// =============================================================================
// Corporate Actions
// =============================================================================

/// Corporate action category, the key the server lists actions under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CorporateActionKind {
    /// `cash_dividends`
    CashDividend,
    /// `reverse_splits`
    ReverseSplit,
    /// `forward_splits`
    ForwardSplit,
    /// `unit_splits`
    UnitSplit,
    /// `cash_mergers`
    CashMerger,
    /// `stock_mergers`
    StockMerger,
    /// `stock_and_cash_mergers`
    StockAndCashMerger,
    /// `stock_dividends`
    StockDividend,
    /// `redemptions`
    Redemption,
    /// `spin_offs`
    SpinOff,
    /// `name_changes`
    NameChange,
    /// `worthless_removals`
    WorthlessRemoval,
    /// `rights_distributions`
    RightsDistribution,
    /// A category this client does not know.
    Other(String),
}

impl CorporateActionKind {
    const KNOWN: [(&'static str, Self); 13] = [
        ("cash_dividends", Self::CashDividend),
        ("reverse_splits", Self::ReverseSplit),
        ("forward_splits", Self::ForwardSplit),
        ("unit_splits", Self::UnitSplit),
        ("cash_mergers", Self::CashMerger),
        ("stock_mergers", Self::StockMerger),
        ("stock_and_cash_mergers", Self::StockAndCashMerger),
        ("stock_dividends", Self::StockDividend),
        ("redemptions", Self::Redemption),
        ("spin_offs", Self::SpinOff),
        ("name_changes", Self::NameChange),
        ("worthless_removals", Self::WorthlessRemoval),
        ("rights_distributions", Self::RightsDistribution),
    ];

    /// Wire key, also accepted by the `types` filter.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Other(key) => key,
            known => Self::KNOWN
                .iter()
                .find(|(_, kind)| kind == known)
                .map_or("", |(key, _)| *key),
        }
    }
}

impl From<&str> for CorporateActionKind {
    fn from(key: &str) -> Self {
        Self::KNOWN
            .iter()
            .find(|(known, _)| *known == key)
            .map_or_else(|| Self::Other(key.to_string()), |(_, kind)| kind.clone())
    }
}

/// One corporate action.
///
/// Fields shared by most categories are typed; the rest (merger symbols
/// and rates, split ratios, ...) stay in `details` under their wire names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorporateAction {
    /// Category; filled from the response key.
    #[serde(skip, default = "unknown_kind")]
    pub kind: CorporateActionKind,
    /// Affected symbol, when the category has a single one.
    #[serde(default)]
    pub symbol: Option<String>,
    /// Processing date.
    #[serde(default)]
    pub process_date: Option<NaiveDate>,
    /// Ex date.
    #[serde(default)]
    pub ex_date: Option<NaiveDate>,
    /// Record date.
    #[serde(default)]
    pub record_date: Option<NaiveDate>,
    /// Payable date.
    #[serde(default)]
    pub payable_date: Option<NaiveDate>,
    /// Rate (dividend per share, redemption price, ...).
    #[serde(default)]
    pub rate: Option<Decimal>,
    /// Remaining category-specific fields.
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

fn unknown_kind() -> CorporateActionKind {
    CorporateActionKind::Other(String::new())
}

/// Append `key=value` when a value is present.
pub(crate) fn push<V: ToString>(params: &mut QueryParams, key: &str, value: Option<V>) {
    if let Some(value) = value {
        params.push((key.to_string(), value.to_string()));
    }
}
