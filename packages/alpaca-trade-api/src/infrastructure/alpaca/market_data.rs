//! Market Data Stream Client
//!
//! Real-time stock data over a `MessagePack` WebSocket.
//!
//! # Stream URL
//!
//! `wss://stream.data.alpaca.markets/v2/{feed}` where `feed` is `iex` or `sip`.
//!
//! # Subscriptions
//!
//! The client owns the desired subscription set. While connected, each
//! change is sent as an incremental frame holding only the symbols that
//! actually changed. Every (re)authorization replays the whole set as one
//! subscribe frame, so callers never resubscribe after a reconnect.

use std::sync::Arc;

use tokio_tungstenite::tungstenite::Message;

use super::auth::Credentials;
use super::codec::{CodecError, MsgPackCodec, Record};
use super::connection::{Connection, Inbound, StreamError, StreamProtocol};
use super::dispatcher::{EventDispatcher, EventKind, ObserverToken, StreamEvent};
use super::messages::{
    Bar, CancelError, Correction, Luld, MarketDataMessage, Quote, SubscriptionAction,
    SubscriptionMessage, SubscriptionRequest, SuccessKind, Trade, TradingStatus,
};
use crate::domain::streaming::{ConnectionState, StateChange};
use crate::domain::subscription::{
    Channel, SubscriptionDelta, SubscriptionSet, SubscriptionSnapshot,
};
use crate::infrastructure::config::StreamSettings;
use crate::infrastructure::metrics::StreamKind;

// =============================================================================
// Protocol
// =============================================================================

struct MarketDataProtocol {
    url: String,
    credentials: Credentials,
    codec: MsgPackCodec,
}

fn encode_frame<T: serde::Serialize>(value: &T) -> Result<Message, StreamError> {
    let bytes = MsgPackCodec::new()
        .encode(value)
        .map_err(|e| StreamError::encode(&e))?;
    Ok(Message::Binary(bytes.into()))
}

/// Subscription frame for `delta`; `None` when there is nothing to send.
fn subscription_frame(
    action: SubscriptionAction,
    delta: &SubscriptionDelta,
) -> Result<Option<Message>, StreamError> {
    if delta.is_empty() {
        return Ok(None);
    }
    encode_frame(&SubscriptionRequest::new(action, delta)).map(Some)
}

impl StreamProtocol for MarketDataProtocol {
    type Desired = SubscriptionSet;

    const KIND: StreamKind = StreamKind::MarketData;

    fn url(&self) -> &str {
        &self.url
    }

    fn handshake_headers(&self) -> Vec<(&'static str, String)> {
        if self.credentials.is_oauth() {
            self.credentials.auth_headers()
        } else {
            Vec::new()
        }
    }

    fn open_frame(&self) -> Result<Option<Message>, StreamError> {
        Ok(None)
    }

    fn greeting_frame(&self) -> Result<Option<Message>, StreamError> {
        self.credentials
            .to_market_data_auth()
            .map(|auth| encode_frame(&auth))
            .transpose()
    }

    fn decode(&self, frame: &[u8]) -> Result<Vec<Record<Inbound>>, CodecError> {
        Ok(self
            .codec
            .decode(frame)?
            .into_iter()
            .map(|record| record.map(classify))
            .collect())
    }

    fn replay_frame(&self, desired: &SubscriptionSet) -> Result<Option<Message>, StreamError> {
        subscription_frame(SubscriptionAction::Subscribe, &desired.to_delta())
    }
}

fn classify(message: MarketDataMessage) -> Inbound {
    let event = match message {
        MarketDataMessage::Success(success) => {
            return match success.msg {
                SuccessKind::Connected => Inbound::Greeting,
                SuccessKind::Authenticated => Inbound::Authorized,
                SuccessKind::Other => Inbound::Ignored("success"),
            };
        }
        MarketDataMessage::Error(error) => return Inbound::ServerError(error),
        MarketDataMessage::Subscription(ack) => StreamEvent::Subscription(ack),
        MarketDataMessage::Trade(trade) => StreamEvent::Trade(trade),
        MarketDataMessage::Quote(quote) => StreamEvent::Quote(quote),
        MarketDataMessage::Bar(bar) => StreamEvent::Bar(bar),
        MarketDataMessage::UpdatedBar(bar) => StreamEvent::UpdatedBar(bar),
        MarketDataMessage::DailyBar(bar) => StreamEvent::DailyBar(bar),
        MarketDataMessage::Status(status) => StreamEvent::Status(status),
        MarketDataMessage::Luld(luld) => StreamEvent::Luld(luld),
        MarketDataMessage::CancelError(cancel) => StreamEvent::CancelError(cancel),
        MarketDataMessage::Correction(correction) => StreamEvent::Correction(correction),
    };
    Inbound::Event(event)
}

// =============================================================================
// Client
// =============================================================================

/// Streaming client for real-time stock market data.
///
/// ```rust,ignore
/// let stream = MarketDataStream::new(&config.market_data_stream());
/// stream.on_trade(|trade| println!("{} {}", trade.symbol, trade.price));
/// stream.subscribe_for_trades(["AAPL"])?;
/// stream.connect();
/// ```
pub struct MarketDataStream {
    connection: Arc<Connection<MarketDataProtocol>>,
}

impl MarketDataStream {
    /// Create a client. Nothing connects until [`Self::connect`].
    #[must_use]
    pub fn new(settings: &StreamSettings) -> Self {
        let protocol = MarketDataProtocol {
            url: settings.url.clone(),
            credentials: settings.credentials.clone(),
            codec: MsgPackCodec::new(),
        };
        Self {
            connection: Arc::new(Connection::new(
                protocol,
                SubscriptionSet::new(),
                settings,
                Arc::new(EventDispatcher::new()),
            )),
        }
    }

    /// Open the connection, or restart it if one is open. Clears any
    /// earlier `disconnect()`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn connect(&self) {
        self.connection.connect();
    }

    /// Close the connection and stop reconnecting. No-op when not connected.
    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    /// Add symbols to the desired set. Returns what was actually added.
    ///
    /// # Errors
    ///
    /// Returns an error if the incremental frame cannot be encoded.
    pub fn subscribe(&self, request: &SubscriptionDelta) -> Result<SubscriptionDelta, StreamError> {
        self.apply(SubscriptionAction::Subscribe, request)
    }

    /// Remove symbols from the desired set. Returns what was actually removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the incremental frame cannot be encoded.
    pub fn unsubscribe(&self, request: &SubscriptionDelta) -> Result<SubscriptionDelta, StreamError> {
        self.apply(SubscriptionAction::Unsubscribe, request)
    }

    fn apply(
        &self,
        action: SubscriptionAction,
        request: &SubscriptionDelta,
    ) -> Result<SubscriptionDelta, StreamError> {
        let changed = self.connection.update(|desired| {
            let changed = match action {
                SubscriptionAction::Subscribe => desired.add(request),
                SubscriptionAction::Unsubscribe => desired.remove(request),
            };
            let frame = subscription_frame(action, &changed)?;
            Ok((changed, frame))
        })?;

        tracing::debug!(?action, changed = ?changed, "Subscription updated");
        Ok(changed)
    }

    /// Desired subscriptions, sorted per channel, with the derived
    /// cancel-error and correction lists.
    #[must_use]
    pub fn get_subscriptions(&self) -> SubscriptionSnapshot {
        self.connection.read(SubscriptionSet::snapshot)
    }
}

macro_rules! channel_methods {
    ($($channel:ident => $subscribe:ident, $unsubscribe:ident;)*) => {
        impl MarketDataStream {
            $(
                #[doc = concat!("Subscribe `symbols` on the `", stringify!($channel), "` channel.")]
                ///
                /// # Errors
                ///
                /// Returns an error if the incremental frame cannot be encoded.
                pub fn $subscribe<I, S>(&self, symbols: I) -> Result<SubscriptionDelta, StreamError>
                where
                    I: IntoIterator<Item = S>,
                    S: Into<String>,
                {
                    self.subscribe(&SubscriptionDelta::new().with(Channel::$channel, symbols))
                }

                #[doc = concat!("Unsubscribe `symbols` from the `", stringify!($channel), "` channel.")]
                ///
                /// # Errors
                ///
                /// Returns an error if the incremental frame cannot be encoded.
                pub fn $unsubscribe<I, S>(&self, symbols: I) -> Result<SubscriptionDelta, StreamError>
                where
                    I: IntoIterator<Item = S>,
                    S: Into<String>,
                {
                    self.unsubscribe(&SubscriptionDelta::new().with(Channel::$channel, symbols))
                }
            )*
        }
    };
}

channel_methods! {
    Trades => subscribe_for_trades, unsubscribe_from_trades;
    Quotes => subscribe_for_quotes, unsubscribe_from_quotes;
    Bars => subscribe_for_bars, unsubscribe_from_bars;
    UpdatedBars => subscribe_for_updated_bars, unsubscribe_from_updated_bars;
    DailyBars => subscribe_for_daily_bars, unsubscribe_from_daily_bars;
    Statuses => subscribe_for_statuses, unsubscribe_from_statuses;
    Lulds => subscribe_for_lulds, unsubscribe_from_lulds;
}

// =============================================================================
// Observers
// =============================================================================

macro_rules! observer_methods {
    ($($method:ident($kind:ident, $ty:ty);)*) => {
        impl MarketDataStream {
            $(
                #[doc = concat!("Register an observer for `", stringify!($kind), "` events.")]
                pub fn $method<F>(&self, observer: F) -> ObserverToken
                where
                    F: Fn(&$ty) + Send + Sync + 'static,
                {
                    self.connection.dispatcher().register(EventKind::$kind, move |event| {
                        if let StreamEvent::$kind(value) = event {
                            observer(value);
                        }
                    })
                }
            )*
        }
    };
}

observer_methods! {
    on_trade(Trade, Trade);
    on_quote(Quote, Quote);
    on_bar(Bar, Bar);
    on_updated_bar(UpdatedBar, Bar);
    on_daily_bar(DailyBar, Bar);
    on_status(Status, TradingStatus);
    on_luld(Luld, Luld);
    on_cancel_error(CancelError, CancelError);
    on_correction(Correction, Correction);
    on_state_change(StateChange, StateChange);
    on_error(Error, StreamError);
    on_subscription(Subscription, SubscriptionMessage);
}

impl MarketDataStream {
    /// Register an observer for successful authorization.
    pub fn on_authorized<F>(&self, observer: F) -> ObserverToken
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.connection
            .dispatcher()
            .register(EventKind::Authorized, move |_| observer())
    }

    /// Register an observer for rejected credentials.
    pub fn on_unauthorized<F>(&self, observer: F) -> ObserverToken
    where
        F: Fn(&super::auth::AuthError) + Send + Sync + 'static,
    {
        self.connection
            .dispatcher()
            .register(EventKind::Unauthorized, move |event| {
                if let StreamEvent::Unauthorized(err) = event {
                    observer(err);
                }
            })
    }

    /// Deregister an observer.
    pub fn remove_observer(&self, token: ObserverToken) -> bool {
        self.connection.dispatcher().remove(token)
    }
}

impl Drop for MarketDataStream {
    fn drop(&mut self) {
        self.connection.shutdown();
        let _ = self.connection.update(|desired| {
            desired.clear();
            Ok(((), None))
        });
    }
}

impl std::fmt::Debug for MarketDataStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataStream")
            .field("url", &self.connection.url())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
