//! Shared helpers for the streaming integration tests.
//!
//! A test plays the server side inline: bind a listener, hand its URL to
//! the client, then accept and script each socket step by step.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use alpaca_trade_api::{Credentials, ReconnectConfig, StreamSettings};

/// Upper bound on any single wait in these tests.
pub const STEP: Duration = Duration::from_secs(5);

pub type ServerSocket = WebSocketStream<TcpStream>;

/// Bind a local listener and return it with its `ws://` URL.
pub async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

/// Accept the next client socket.
pub async fn accept(listener: &TcpListener) -> ServerSocket {
    let (tcp, _) = timeout(STEP, listener.accept())
        .await
        .expect("client did not connect")
        .unwrap();
    tokio_tungstenite::accept_async(tcp).await.unwrap()
}

/// Check that no client connects within `window`.
pub async fn assert_no_connection(listener: &TcpListener, window: Duration) {
    assert!(
        timeout(window, listener.accept()).await.is_err(),
        "client reconnected unexpectedly"
    );
}

pub fn key_pair() -> Credentials {
    Credentials::key_pair("key1", "secret1").unwrap()
}

/// Settings that reconnect almost immediately.
pub fn fast_settings(url: &str) -> StreamSettings {
    StreamSettings::new(url, key_pair())
        .with_reconnect(ReconnectConfig {
            initial_timeout: Duration::ZERO,
            backoff_increment: Duration::from_millis(20),
            max_timeout: Duration::from_millis(100),
            ..ReconnectConfig::default()
        })
        .with_auth_timeout(STEP)
}

// =============================================================================
// MessagePack side
// =============================================================================

pub async fn send_msgpack(socket: &mut ServerSocket, value: &Value) {
    let bytes = rmp_serde::to_vec_named(value).unwrap();
    socket.send(Message::Binary(bytes.into())).await.unwrap();
}

/// Next binary frame from the client, decoded.
pub async fn recv_msgpack(socket: &mut ServerSocket) -> Value {
    loop {
        let message = timeout(STEP, socket.next())
            .await
            .expect("no frame from client")
            .expect("client closed")
            .unwrap();
        if let Message::Binary(bytes) = message {
            return rmp_serde::from_slice(&bytes).unwrap();
        }
    }
}

/// Greet, read the auth frame, accept it.
pub async fn handshake_msgpack(socket: &mut ServerSocket) -> Value {
    send_msgpack(socket, &serde_json::json!([{ "T": "success", "msg": "connected" }])).await;
    let auth = recv_msgpack(socket).await;
    send_msgpack(socket, &serde_json::json!([{ "T": "success", "msg": "authenticated" }])).await;
    auth
}

// =============================================================================
// JSON side
// =============================================================================

pub async fn send_json(socket: &mut ServerSocket, value: &Value) {
    socket.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Next text frame from the client, decoded.
pub async fn recv_json(socket: &mut ServerSocket) -> Value {
    loop {
        let message = timeout(STEP, socket.next())
            .await
            .expect("no frame from client")
            .expect("client closed")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

// =============================================================================
// Observer plumbing
// =============================================================================

/// Next value an observer forwarded.
pub async fn next<T>(events: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(STEP, events.recv())
        .await
        .expect("observer was not called")
        .expect("observer channel closed")
}

/// Wait until `predicate` matches a forwarded value.
pub async fn until<T, F>(events: &mut mpsc::UnboundedReceiver<T>, predicate: F) -> T
where
    F: Fn(&T) -> bool,
{
    loop {
        let value = next(events).await;
        if predicate(&value) {
            return value;
        }
    }
}

/// Symbols listed under `key` in a subscription frame.
pub fn symbols(frame: &Value, key: &str) -> Vec<String> {
    frame
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}
