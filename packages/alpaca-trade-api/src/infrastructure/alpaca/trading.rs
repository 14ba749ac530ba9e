//! Trading Stream Client
//!
//! Order and account updates over the legacy JSON WebSocket.
//!
//! # Stream URL
//!
//! - Live: `wss://api.alpaca.markets/stream`
//! - Paper: `wss://paper-api.alpaca.markets/stream`
//!
//! # Protocol
//!
//! The client authenticates as soon as the socket opens, then sends a
//! `listen` frame naming every desired stream. Frames arrive as text or as
//! binary-wrapped JSON; a lone `0x01` byte is a heartbeat.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio_tungstenite::tungstenite::Message;

use super::auth::{AuthError, Credentials};
use super::codec::{CodecError, JsonCodec, Record};
use super::connection::{Connection, Inbound, StreamError, StreamProtocol};
use super::dispatcher::{EventDispatcher, EventKind, ObserverToken, StreamEvent};
use super::messages::{ListenRequest, TradeUpdate, TradingMessage};
use crate::domain::streaming::{ConnectionState, StateChange};
use crate::infrastructure::config::StreamSettings;
use crate::infrastructure::metrics::StreamKind;

/// Order lifecycle stream.
pub const TRADE_UPDATES: &str = "trade_updates";

/// Account change stream.
pub const ACCOUNT_UPDATES: &str = "account_updates";

const HEARTBEAT: &[u8] = &[0x01];

// =============================================================================
// Protocol
// =============================================================================

struct TradingProtocol {
    url: String,
    credentials: Credentials,
    codec: JsonCodec,
}

fn encode_frame<T: serde::Serialize>(value: &T) -> Result<Message, StreamError> {
    let text = JsonCodec::new()
        .encode(value)
        .map_err(|e| StreamError::encode(&e))?;
    Ok(Message::Text(text.into()))
}

fn listen_frame(streams: &BTreeSet<String>) -> Result<Message, StreamError> {
    encode_frame(&ListenRequest::new(streams.iter().cloned()))
}

impl StreamProtocol for TradingProtocol {
    type Desired = BTreeSet<String>;

    const KIND: StreamKind = StreamKind::Trading;

    fn url(&self) -> &str {
        &self.url
    }

    fn handshake_headers(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    fn open_frame(&self) -> Result<Option<Message>, StreamError> {
        encode_frame(&self.credentials.to_trading_auth()).map(Some)
    }

    fn greeting_frame(&self) -> Result<Option<Message>, StreamError> {
        Ok(None)
    }

    fn decode(&self, frame: &[u8]) -> Result<Vec<Record<Inbound>>, CodecError> {
        if frame == HEARTBEAT {
            return Ok(Vec::new());
        }
        Ok(self
            .codec
            .decode(frame)?
            .into_iter()
            .map(|record| record.map(classify))
            .collect())
    }

    fn replay_frame(&self, desired: &BTreeSet<String>) -> Result<Option<Message>, StreamError> {
        if desired.is_empty() {
            return Ok(None);
        }
        listen_frame(desired).map(Some)
    }
}

fn classify(message: TradingMessage) -> Inbound {
    match message {
        TradingMessage::Authorization(auth) if auth.is_authorized() => Inbound::Authorized,
        TradingMessage::Authorization(auth) => {
            tracing::debug!(status = %auth.status, "Authorization refused");
            Inbound::Rejected(AuthError::Unauthorized)
        }
        TradingMessage::Listening(listening) => {
            Inbound::Event(StreamEvent::Listening(listening.streams))
        }
        TradingMessage::TradeUpdate(update) => Inbound::Event(StreamEvent::TradeUpdate(update)),
        TradingMessage::AccountUpdate(update) => {
            Inbound::Event(StreamEvent::AccountUpdate(update))
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// Streaming client for order and account updates.
pub struct TradingStream {
    connection: Arc<Connection<TradingProtocol>>,
}

impl TradingStream {
    /// Create a client. Nothing connects until [`Self::connect`].
    #[must_use]
    pub fn new(settings: &StreamSettings) -> Self {
        let protocol = TradingProtocol {
            url: settings.url.clone(),
            credentials: settings.credentials.clone(),
            codec: JsonCodec::new(),
        };
        Self {
            connection: Arc::new(Connection::new(
                protocol,
                BTreeSet::new(),
                settings,
                Arc::new(EventDispatcher::new()),
            )),
        }
    }

    /// Open the connection, or restart it if one is open.
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

    /// Listen to additional streams, e.g. [`TRADE_UPDATES`].
    ///
    /// # Errors
    ///
    /// Returns an error if the listen frame cannot be encoded.
    pub fn subscribe<I, S>(&self, streams: I) -> Result<(), StreamError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let streams: Vec<String> = streams.into_iter().map(Into::into).collect();
        self.connection.update(|desired| {
            let before = desired.len();
            desired.extend(streams.into_iter().filter(|s| !s.is_empty()));
            Self::relisten(desired, before != desired.len())
        })
    }

    /// Stop listening to streams.
    ///
    /// # Errors
    ///
    /// Returns an error if the listen frame cannot be encoded.
    pub fn unsubscribe<I, S>(&self, streams: I) -> Result<(), StreamError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.connection.update(|desired| {
            let before = desired.len();
            for stream in streams {
                desired.remove(stream.as_ref());
            }
            Self::relisten(desired, before != desired.len())
        })
    }

    /// Streams currently desired, sorted.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        self.connection.read(|desired| desired.iter().cloned().collect())
    }

    fn relisten(
        desired: &BTreeSet<String>,
        changed: bool,
    ) -> Result<((), Option<Message>), StreamError> {
        if !changed {
            return Ok(((), None));
        }
        tracing::debug!(streams = ?desired, "Listen set updated");
        listen_frame(desired).map(|frame| ((), Some(frame)))
    }

    // -------------------------------------------------------------------------
    // Observers
    // -------------------------------------------------------------------------

    /// Register an observer for order events.
    pub fn on_trade_update<F>(&self, observer: F) -> ObserverToken
    where
        F: Fn(&TradeUpdate) + Send + Sync + 'static,
    {
        self.connection
            .dispatcher()
            .register(EventKind::TradeUpdate, move |event| {
                if let StreamEvent::TradeUpdate(update) = event {
                    observer(update);
                }
            })
    }

    /// Register an observer for account updates.
    pub fn on_account_update<F>(&self, observer: F) -> ObserverToken
    where
        F: Fn(&serde_json::Value) + Send + Sync + 'static,
    {
        self.connection
            .dispatcher()
            .register(EventKind::AccountUpdate, move |event| {
                if let StreamEvent::AccountUpdate(update) = event {
                    observer(update);
                }
            })
    }

    /// Register an observer for `listening` confirmations.
    pub fn on_listening<F>(&self, observer: F) -> ObserverToken
    where
        F: Fn(&[String]) + Send + Sync + 'static,
    {
        self.connection
            .dispatcher()
            .register(EventKind::Listening, move |event| {
                if let StreamEvent::Listening(streams) = event {
                    observer(streams);
                }
            })
    }

    /// Register an observer for state changes.
    pub fn on_state_change<F>(&self, observer: F) -> ObserverToken
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        self.connection
            .dispatcher()
            .register(EventKind::StateChange, move |event| {
                if let StreamEvent::StateChange(change) = event {
                    observer(change);
                }
            })
    }

    /// Register an observer for client errors.
    pub fn on_error<F>(&self, observer: F) -> ObserverToken
    where
        F: Fn(&StreamError) + Send + Sync + 'static,
    {
        self.connection
            .dispatcher()
            .register(EventKind::Error, move |event| {
                if let StreamEvent::Error(err) = event {
                    observer(err);
                }
            })
    }

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
        F: Fn(&AuthError) + Send + Sync + 'static,
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

impl Drop for TradingStream {
    fn drop(&mut self) {
        self.connection.shutdown();
    }
}

impl std::fmt::Debug for TradingStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradingStream")
            .field("url", &self.connection.url())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn protocol() -> TradingProtocol {
        TradingProtocol {
            url: "wss://paper-api.example.test/stream".into(),
            credentials: Credentials::key_pair("k", "s").unwrap(),
            codec: JsonCodec::new(),
        }
    }

    fn text(message: &Message) -> serde_json::Value {
        match message {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn authenticates_on_open() {
        let frame = protocol().open_frame().unwrap().unwrap();
        assert_eq!(
            text(&frame),
            json!({ "action": "authenticate", "data": { "key_id": "k", "secret_key": "s" } })
        );
        assert!(protocol().greeting_frame().unwrap().is_none());
    }

    #[test]
    fn heartbeat_byte_is_ignored() {
        assert!(protocol().decode(&[0x01]).unwrap().is_empty());
    }

    #[test]
    fn unauthorized_status_is_rejected() {
        let records = protocol()
            .decode(br#"{"stream":"authorization","data":{"status":"unauthorized","action":"authenticate"}}"#)
            .unwrap();
        assert!(matches!(
            records.as_slice(),
            [Ok(Inbound::Rejected(AuthError::Unauthorized))]
        ));
    }

    #[test]
    fn replay_lists_every_stream() {
        let desired: BTreeSet<String> = [TRADE_UPDATES, ACCOUNT_UPDATES]
            .into_iter()
            .map(String::from)
            .collect();
        let frame = protocol().replay_frame(&desired).unwrap().unwrap();
        assert_eq!(
            text(&frame),
            json!({ "action": "listen", "data": { "streams": ["account_updates", "trade_updates"] } })
        );
        assert!(protocol().replay_frame(&BTreeSet::new()).unwrap().is_none());
    }

    #[test]
    fn listen_set_is_idempotent() {
        let stream = TradingStream::new(&StreamSettings::new(
            "wss://paper-api.example.test/stream",
            Credentials::key_pair("k", "s").unwrap(),
        ));
        stream.subscribe([TRADE_UPDATES, TRADE_UPDATES]).unwrap();
        stream.subscribe([ACCOUNT_UPDATES]).unwrap();
        assert_eq!(stream.subscriptions(), [ACCOUNT_UPDATES, TRADE_UPDATES]);

        stream.unsubscribe([ACCOUNT_UPDATES]).unwrap();
        assert_eq!(stream.subscriptions(), [TRADE_UPDATES]);
    }
}
