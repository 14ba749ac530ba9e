//! Alpaca Stream Message Types
//!
//! Wire types for both streaming transports. Short wire names are expanded
//! into descriptive fields through serde renames; optional wire fields stay
//! `Option` so absence is never confused with a default.
//!
//! # Market Data Stream (`MessagePack`)
//!
//! Every frame is an array of maps, each carrying a `T` discriminator:
//!
//! | `T` | Record |
//! |-----|--------|
//! | `success`, `error`, `subscription` | control |
//! | `t` | [`Trade`] |
//! | `q` | [`Quote`] |
//! | `b`, `u`, `d` | [`Bar`] (minute, updated, daily) |
//! | `s` | [`TradingStatus`] |
//! | `l` | [`Luld`] |
//! | `x` | [`CancelError`] |
//! | `c` | [`Correction`] |
//!
//! The same entity types decode the REST historical data endpoints, which
//! use identical short names but omit `S` on single-symbol queries.
//!
//! # Trading Stream (JSON)
//!
//! Frames are `{"stream": <name>, "data": {...}}` objects; see
//! [`TradingMessage`].
//!
//! # References
//!
//! - [Stock Streaming](https://docs.alpaca.markets/docs/real-time-stock-pricing-data)
//! - [Trade Updates](https://docs.alpaca.markets/docs/websocket-streaming)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::subscription::{Channel, SubscriptionDelta};
use crate::infrastructure::http::types::Order;

// =============================================================================
// Control Messages
// =============================================================================

/// Success notice.
///
/// ```json
/// {"T": "success", "msg": "connected"}
/// {"T": "success", "msg": "authenticated"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessMessage {
    /// What succeeded.
    pub msg: SuccessKind,
}

/// Kind of success notice.
///
/// Read from the bare `msg` string; the `MessagePack` value decoder does not
/// accept strings for enums.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum SuccessKind {
    /// Socket accepted by the server.
    Connected,
    /// Credentials accepted.
    Authenticated,
    /// Any other notice.
    Other,
}

impl From<String> for SuccessKind {
    fn from(msg: String) -> Self {
        match msg.as_str() {
            "connected" => Self::Connected,
            "authenticated" => Self::Authenticated,
            _ => Self::Other,
        }
    }
}

/// Error notice.
///
/// ```json
/// {"T": "error", "code": 402, "msg": "auth failed"}
/// ```
///
/// # Error Codes
/// - 400: Invalid syntax
/// - 401: Not authenticated
/// - 402: Auth failed
/// - 403: Already authenticated
/// - 404: Auth timeout
/// - 405: Symbol limit exceeded
/// - 406: Connection limit exceeded
/// - 407: Slow client
/// - 408: Insufficient subscription
/// - 500: Internal error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Error code.
    pub code: i32,
    /// Error text.
    pub msg: String,
}

impl ErrorMessage {
    /// Check if the server rejected the session's credentials.
    #[must_use]
    pub const fn is_auth_error(&self) -> bool {
        matches!(self.code, 401..=404 | 406)
    }
}

/// Server's view of the active subscriptions.
///
/// Surfaced to observers as an acknowledgement only; the client's desired
/// set is never overwritten from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubscriptionMessage {
    /// Trade symbols.
    pub trades: Vec<String>,
    /// Quote symbols.
    pub quotes: Vec<String>,
    /// Bar symbols.
    pub bars: Vec<String>,
    /// Updated bar symbols.
    pub updated_bars: Vec<String>,
    /// Daily bar symbols.
    pub daily_bars: Vec<String>,
    /// Status symbols.
    pub statuses: Vec<String>,
    /// LULD symbols.
    pub lulds: Vec<String>,
    /// Cancel-error symbols (mirrors trades).
    pub cancel_errors: Vec<String>,
    /// Correction symbols (mirrors trades).
    pub corrections: Vec<String>,
}

// =============================================================================
// Market Data Entities
// =============================================================================

/// A trade print.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Symbol; empty on single-symbol REST responses until filled in.
    #[serde(rename = "S", default)]
    pub symbol: String,
    /// Trade ID.
    #[serde(rename = "i", default)]
    pub id: Option<u64>,
    /// Exchange code.
    #[serde(rename = "x", default)]
    pub exchange: Option<String>,
    /// Price.
    #[serde(rename = "p")]
    pub price: Decimal,
    /// Size.
    #[serde(rename = "s")]
    pub size: Decimal,
    /// Timestamp.
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
    /// Condition codes.
    #[serde(rename = "c", default, deserialize_with = "one_or_many")]
    pub conditions: Vec<String>,
    /// Tape.
    #[serde(rename = "z", default)]
    pub tape: Option<String>,
}

/// A best bid/offer quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Symbol.
    #[serde(rename = "S", default)]
    pub symbol: String,
    /// Bid exchange.
    #[serde(rename = "bx", default)]
    pub bid_exchange: Option<String>,
    /// Bid price.
    #[serde(rename = "bp")]
    pub bid_price: Decimal,
    /// Bid size.
    #[serde(rename = "bs")]
    pub bid_size: Decimal,
    /// Ask exchange.
    #[serde(rename = "ax", default)]
    pub ask_exchange: Option<String>,
    /// Ask price.
    #[serde(rename = "ap")]
    pub ask_price: Decimal,
    /// Ask size.
    #[serde(rename = "as")]
    pub ask_size: Decimal,
    /// Timestamp.
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
    /// Condition codes (the stream may send a single string).
    #[serde(rename = "c", default, deserialize_with = "one_or_many")]
    pub conditions: Vec<String>,
    /// Tape.
    #[serde(rename = "z", default)]
    pub tape: Option<String>,
}

/// An OHLCV bar (minute, updated or daily).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    /// Symbol.
    #[serde(rename = "S", default)]
    pub symbol: String,
    /// Open.
    #[serde(rename = "o")]
    pub open: Decimal,
    /// High.
    #[serde(rename = "h")]
    pub high: Decimal,
    /// Low.
    #[serde(rename = "l")]
    pub low: Decimal,
    /// Close.
    #[serde(rename = "c")]
    pub close: Decimal,
    /// Volume.
    #[serde(rename = "v")]
    pub volume: Decimal,
    /// Bar start time.
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
    /// Volume-weighted average price, when the server provides it.
    #[serde(rename = "vw", default)]
    pub vwap: Option<Decimal>,
    /// Number of trades, when the server provides it.
    #[serde(rename = "n", default)]
    pub trade_count: Option<u64>,
}

/// Trading status change (halt, resume).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingStatus {
    /// Symbol.
    #[serde(rename = "S", default)]
    pub symbol: String,
    /// Status code.
    #[serde(rename = "sc", default)]
    pub status_code: String,
    /// Status message.
    #[serde(rename = "sm", default)]
    pub status_message: String,
    /// Reason code.
    #[serde(rename = "rc", default)]
    pub reason_code: String,
    /// Reason message.
    #[serde(rename = "rm", default)]
    pub reason_message: String,
    /// Timestamp.
    #[serde(rename = "t", default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Tape.
    #[serde(rename = "z", default)]
    pub tape: Option<String>,
}

/// Limit up / limit down price band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Luld {
    /// Symbol.
    #[serde(rename = "S", default)]
    pub symbol: String,
    /// Upper band.
    #[serde(rename = "u")]
    pub limit_up_price: Decimal,
    /// Lower band.
    #[serde(rename = "d")]
    pub limit_down_price: Decimal,
    /// Indicator.
    #[serde(rename = "i", default)]
    pub indicator: String,
    /// Timestamp.
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
    /// Tape.
    #[serde(rename = "z", default)]
    pub tape: Option<String>,
}

/// Cancellation or error of a previously reported trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelError {
    /// Symbol.
    #[serde(rename = "S", default)]
    pub symbol: String,
    /// ID of the affected trade.
    #[serde(rename = "i")]
    pub id: u64,
    /// Exchange code.
    #[serde(rename = "x", default)]
    pub exchange: Option<String>,
    /// Trade price.
    #[serde(rename = "p")]
    pub price: Decimal,
    /// Trade size.
    #[serde(rename = "s")]
    pub size: Decimal,
    /// `C` (cancel) or `E` (error).
    #[serde(rename = "a", default)]
    pub action: String,
    /// Tape.
    #[serde(rename = "z", default)]
    pub tape: Option<String>,
    /// Timestamp.
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
}

/// Correction of a previously reported trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    /// Symbol.
    #[serde(rename = "S", default)]
    pub symbol: String,
    /// Exchange code.
    #[serde(rename = "x", default)]
    pub exchange: Option<String>,
    /// Original trade ID.
    #[serde(rename = "oi")]
    pub original_id: u64,
    /// Original price.
    #[serde(rename = "op")]
    pub original_price: Decimal,
    /// Original size.
    #[serde(rename = "os")]
    pub original_size: Decimal,
    /// Original conditions.
    #[serde(rename = "oc", default, deserialize_with = "one_or_many")]
    pub original_conditions: Vec<String>,
    /// Corrected trade ID.
    #[serde(rename = "ci")]
    pub corrected_id: u64,
    /// Corrected price.
    #[serde(rename = "cp")]
    pub corrected_price: Decimal,
    /// Corrected size.
    #[serde(rename = "cs")]
    pub corrected_size: Decimal,
    /// Corrected conditions.
    #[serde(rename = "cc", default, deserialize_with = "one_or_many")]
    pub corrected_conditions: Vec<String>,
    /// Tape.
    #[serde(rename = "z", default)]
    pub tape: Option<String>,
    /// Timestamp.
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
}

/// Entities carrying a symbol that REST fan-out fills from the response key.
pub trait HasSymbol {
    /// Set the symbol if the record did not carry one.
    fn fill_symbol(&mut self, symbol: &str);
}

macro_rules! impl_has_symbol {
    ($($ty:ty),*) => {
        $(impl HasSymbol for $ty {
            fn fill_symbol(&mut self, symbol: &str) {
                if self.symbol.is_empty() {
                    self.symbol = symbol.to_string();
                }
            }
        })*
    };
}

impl_has_symbol!(Trade, Quote, Bar);

/// Accept either a single string or a list of strings.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Nothing(()),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) if value.is_empty() => Vec::new(),
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
        OneOrMany::Nothing(()) => Vec::new(),
    })
}

// =============================================================================
// Decoded Market Data Records
// =============================================================================

/// One record of a market data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketDataMessage {
    /// Success notice.
    Success(SuccessMessage),
    /// Error notice.
    Error(ErrorMessage),
    /// Subscription acknowledgement.
    Subscription(SubscriptionMessage),
    /// Trade (`t`).
    Trade(Trade),
    /// Quote (`q`).
    Quote(Quote),
    /// Minute bar (`b`).
    Bar(Bar),
    /// Updated bar (`u`).
    UpdatedBar(Bar),
    /// Daily bar (`d`).
    DailyBar(Bar),
    /// Trading status (`s`).
    Status(TradingStatus),
    /// LULD band (`l`).
    Luld(Luld),
    /// Trade cancel/error (`x`).
    CancelError(CancelError),
    /// Trade correction (`c`).
    Correction(Correction),
}

impl MarketDataMessage {
    /// Check if this is a data record rather than a control message.
    #[must_use]
    pub const fn is_data(&self) -> bool {
        !matches!(
            self,
            Self::Success(_) | Self::Error(_) | Self::Subscription(_)
        )
    }
}

// =============================================================================
// Trading Stream Messages
// =============================================================================

/// One decoded frame of the trading stream.
#[derive(Debug, Clone, PartialEq)]
pub enum TradingMessage {
    /// Authorization result.
    Authorization(AuthorizationData),
    /// Streams the server is now sending.
    Listening(ListeningData),
    /// Order lifecycle event.
    TradeUpdate(Box<TradeUpdate>),
    /// Account change; passed through as raw JSON.
    AccountUpdate(serde_json::Value),
}

/// Authorization result data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationData {
    /// `authorized` or `unauthorized`.
    pub status: String,
    /// Always `authenticate`.
    #[serde(default)]
    pub action: String,
}

impl AuthorizationData {
    /// Check if authorization succeeded.
    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.status == "authorized"
    }
}

/// Listening confirmation data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListeningData {
    /// Active stream names.
    #[serde(default)]
    pub streams: Vec<String>,
}

/// Order event types from the trade updates stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEvent {
    /// Routed to the exchange.
    New,
    /// Completely filled.
    Fill,
    /// Partially filled.
    PartialFill,
    /// Canceled.
    Canceled,
    /// Expired.
    Expired,
    /// Done for the day.
    DoneForDay,
    /// Replaced by another order.
    Replaced,
    /// Rejected.
    Rejected,
    /// Received, not yet routed.
    PendingNew,
    /// Stopped.
    Stopped,
    /// Cancel requested.
    PendingCancel,
    /// Replace requested.
    PendingReplace,
    /// Calculated.
    Calculated,
    /// Suspended.
    Suspended,
    /// Replace rejected.
    OrderReplaceRejected,
    /// Cancel rejected.
    OrderCancelRejected,
    /// Any event this client does not know.
    #[serde(other)]
    Unknown,
}

/// Order lifecycle event.
///
/// ```json
/// {"stream": "trade_updates",
///  "data": {"event": "fill", "order": {...}, "price": "150.50", "qty": "10"}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeUpdate {
    /// Event type.
    pub event: OrderEvent,
    /// Order after the event.
    pub order: Order,
    /// Event time.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Position quantity after a fill.
    #[serde(default)]
    pub position_qty: Option<Decimal>,
    /// Fill price.
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Fill quantity.
    #[serde(default)]
    pub qty: Option<Decimal>,
}

// =============================================================================
// Outbound Messages (Client -> Server)
// =============================================================================

/// Market data authentication frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthRequest {
    /// Always `auth`.
    pub action: &'static str,
    /// API key ID.
    pub key: String,
    /// API secret.
    pub secret: String,
}

impl AuthRequest {
    /// Create an authentication frame.
    #[must_use]
    pub const fn new(key: String, secret: String) -> Self {
        Self {
            action: "auth",
            key,
            secret,
        }
    }
}

/// Subscribe or unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionAction {
    /// Add symbols.
    Subscribe,
    /// Remove symbols.
    Unsubscribe,
}

/// Market data subscription frame. Every channel array is always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    /// Subscribe or unsubscribe.
    pub action: SubscriptionAction,
    /// Trade symbols.
    pub trades: Vec<String>,
    /// Quote symbols.
    pub quotes: Vec<String>,
    /// Bar symbols.
    pub bars: Vec<String>,
    /// Updated bar symbols.
    pub updated_bars: Vec<String>,
    /// Daily bar symbols.
    pub daily_bars: Vec<String>,
    /// Status symbols.
    pub statuses: Vec<String>,
    /// LULD symbols.
    pub lulds: Vec<String>,
}

impl SubscriptionRequest {
    /// Build a frame carrying the symbols of `delta`.
    #[must_use]
    pub fn new(action: SubscriptionAction, delta: &SubscriptionDelta) -> Self {
        let list = |channel: Channel| delta.symbols(channel).to_vec();
        Self {
            action,
            trades: list(Channel::Trades),
            quotes: list(Channel::Quotes),
            bars: list(Channel::Bars),
            updated_bars: list(Channel::UpdatedBars),
            daily_bars: list(Channel::DailyBars),
            statuses: list(Channel::Statuses),
            lulds: list(Channel::Lulds),
        }
    }
}

/// Trading stream authentication frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeAuthRequest {
    /// Always `authenticate`.
    pub action: &'static str,
    /// Credentials.
    pub data: TradeAuthData,
}

/// Trading stream credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TradeAuthData {
    /// API key pair.
    KeyPair {
        /// API key ID.
        key_id: String,
        /// API secret.
        secret_key: String,
    },
    /// OAuth access token.
    OAuth {
        /// Token.
        oauth_token: String,
    },
}

impl TradeAuthRequest {
    /// Create an authentication frame.
    #[must_use]
    pub const fn new(data: TradeAuthData) -> Self {
        Self {
            action: "authenticate",
            data,
        }
    }
}

/// Trading stream listen frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListenRequest {
    /// Always `listen`.
    pub action: &'static str,
    /// Streams to receive.
    pub data: ListeningData,
}

impl ListenRequest {
    /// Listen to exactly `streams`.
    #[must_use]
    pub fn new<I, S>(streams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            action: "listen",
            data: ListeningData {
                streams: streams.into_iter().map(Into::into).collect(),
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
