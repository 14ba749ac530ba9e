//! Streaming Connection Driver
//!
//! A single background task owns the socket and is the only writer of the
//! connection state. Callers talk to it through an unbounded command
//! channel; the task talks back through the [`EventDispatcher`].
//!
//! The two wire protocols differ only in framing and authentication
//! handshake, captured by [`StreamProtocol`]. Everything else (the state
//! machine, auth timeout, backoff, replay of the desired state after
//! every successful authentication) lives here.
//!
//! # Session Outcomes
//!
//! - caller `disconnect()`: terminal until the next `connect()`
//! - credentials rejected: terminal until the next `connect()`
//! - socket error, server close, auth timeout: reconnect per policy
//! - caller `connect()` mid-session: restart immediately

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};

use super::auth::AuthError;
use super::codec::{CodecError, Record};
use super::dispatcher::{EventDispatcher, StreamEvent};
use super::messages::ErrorMessage;
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::domain::streaming::{ConnectionState, StateChange};
use crate::infrastructure::config::StreamSettings;
use crate::infrastructure::metrics::{self, StreamKind};

// =============================================================================
// Error Type
// =============================================================================

/// Errors reported to `on_error` observers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Socket could not be opened or failed mid-session.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Server rejected the credentials.
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// No authorization arrived in time.
    #[error("authentication not completed within {0:?}")]
    AuthTimeout(Duration),

    /// Frame or record could not be decoded.
    #[error("undecodable frame: {0}")]
    Codec(String),

    /// Record arrived out of protocol order.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Server error notice after authorization.
    #[error("server error ({code}): {message}")]
    Server {
        /// Error code.
        code: i32,
        /// Error text.
        message: String,
    },

    /// Outbound frame could not be encoded.
    #[error("failed to encode outbound frame: {0}")]
    Encode(String),

    /// Endpoint URL or handshake header was invalid.
    #[error("invalid connection request: {0}")]
    InvalidRequest(String),
}

impl StreamError {
    /// Check if the reconnect policy applies to this error.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::WebSocket(_) | Self::AuthTimeout(_))
    }

    /// Label used in metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::WebSocket(_) => "websocket",
            Self::Auth(_) => "auth",
            Self::AuthTimeout(_) => "auth_timeout",
            Self::Codec(_) => "codec",
            Self::Protocol(_) => "protocol",
            Self::Server { .. } => "server",
            Self::Encode(_) => "encode",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }
}

impl StreamError {
    pub(crate) fn encode(err: &CodecError) -> Self {
        Self::Encode(err.to_string())
    }
}

// =============================================================================
// Protocol Seam
// =============================================================================

/// A decoded record, classified for the state machine.
#[derive(Debug)]
pub(crate) enum Inbound {
    /// Server greeting on a fresh socket.
    Greeting,
    /// Credentials accepted.
    Authorized,
    /// Credentials rejected.
    Rejected(AuthError),
    /// Error notice; an auth failure while authenticating.
    ServerError(ErrorMessage),
    /// Anything observers receive directly.
    Event(StreamEvent),
    /// Recognized but irrelevant notice.
    Ignored(&'static str),
}

/// Wire specifics of one streaming endpoint.
pub(crate) trait StreamProtocol: Send + Sync + 'static {
    /// Client-owned state replayed after every successful authentication.
    type Desired: Send + 'static;

    /// Metric and log label.
    const KIND: StreamKind;

    /// Endpoint URL.
    fn url(&self) -> &str;

    /// Extra headers for the WebSocket handshake.
    fn handshake_headers(&self) -> Vec<(&'static str, String)>;

    /// Frame sent as soon as the socket opens.
    fn open_frame(&self) -> Result<Option<Message>, StreamError>;

    /// Frame sent when the server greets a fresh socket.
    fn greeting_frame(&self) -> Result<Option<Message>, StreamError>;

    /// Decode one inbound frame.
    fn decode(&self, frame: &[u8]) -> Result<Vec<Record<Inbound>>, CodecError>;

    /// Frame re-asserting the whole desired state, if there is any.
    fn replay_frame(&self, desired: &Self::Desired) -> Result<Option<Message>, StreamError>;
}

// =============================================================================
// Driver
// =============================================================================

#[derive(Debug)]
enum Command {
    Connect,
    Disconnect,
    Send { session: u64, frame: Message },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Disconnected on request, rejected credentials or bad configuration.
    Stop,
    /// `connect()` during a session.
    Restart,
    /// Transient failure; reconnect policy decides.
    Lost,
    /// Client dropped.
    Shutdown,
}

#[derive(Debug)]
enum Wait {
    Elapsed,
    Connect,
    Disconnect,
    Shutdown,
}

struct Shared<D> {
    state: ConnectionState,
    desired: D,
    /// Incremented on every authorization; frames queued for an older
    /// session are dropped.
    session: u64,
}

/// One logical streaming connection.
pub(crate) struct Connection<P: StreamProtocol> {
    protocol: P,
    reconnect: ReconnectConfig,
    auth_timeout: Duration,
    verbose: bool,
    dispatcher: Arc<EventDispatcher>,
    shared: Mutex<Shared<P::Desired>>,
    commands: mpsc::UnboundedSender<Command>,
    pending: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<P: StreamProtocol> Connection<P> {
    pub(crate) fn new(
        protocol: P,
        desired: P::Desired,
        settings: &StreamSettings,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        Self {
            protocol,
            reconnect: settings.reconnect.clone(),
            auth_timeout: settings.auth_timeout,
            verbose: settings.verbose,
            dispatcher,
            shared: Mutex::new(Shared {
                state: ConnectionState::WaitingToConnect,
                desired,
                session: 0,
            }),
            commands,
            pending: Mutex::new(Some(receiver)),
            task: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    pub(crate) fn url(&self) -> &str {
        self.protocol.url()
    }

    pub(crate) fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Start (or restart) the connection. Spawns the driver on first use.
    pub(crate) fn connect(self: &Arc<Self>) {
        if let Some(receiver) = self.pending.lock().take() {
            let _ = rustls::crypto::ring::default_provider().install_default();
            let driver = Arc::clone(self);
            *self.task.lock() = Some(tokio::spawn(driver.run(receiver)));
        }
        let _ = self.commands.send(Command::Connect);
    }

    /// Close the socket and stop reconnecting. No-op when idle.
    pub(crate) fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect);
    }

    /// Stop the driver task.
    pub(crate) fn shutdown(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    /// Read the desired state.
    pub(crate) fn read<R>(&self, read: impl FnOnce(&P::Desired) -> R) -> R {
        read(&self.shared.lock().desired)
    }

    /// Mutate the desired state. The returned frame is queued only while
    /// connected; otherwise the next replay carries the change.
    pub(crate) fn update<R>(
        &self,
        apply: impl FnOnce(&mut P::Desired) -> Result<(R, Option<Message>), StreamError>,
    ) -> Result<R, StreamError> {
        let mut shared = self.shared.lock();
        let (result, frame) = apply(&mut shared.desired)?;
        if let Some(frame) = frame
            && shared.state.is_connected()
        {
            let _ = self.commands.send(Command::Send {
                session: shared.session,
                frame,
            });
        }
        Ok(result)
    }

    async fn run(self: Arc<Self>, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut policy = ReconnectPolicy::new(self.reconnect.clone());
        let mut active = false;

        loop {
            if !active {
                match commands.recv().await {
                    None => return,
                    Some(Command::Connect) => active = true,
                    Some(Command::Disconnect) => {
                        tracing::debug!(stream = P::KIND.as_str(), "Already disconnected");
                    }
                    Some(Command::Send { .. }) => {}
                }
                continue;
            }

            match self.session(&mut commands, &mut policy).await {
                SessionEnd::Restart => {}
                SessionEnd::Stop => active = false,
                SessionEnd::Shutdown => return,
                SessionEnd::Lost => {
                    let Some(delay) = policy.next_delay() else {
                        tracing::info!(stream = P::KIND.as_str(), "Reconnect disabled");
                        active = false;
                        continue;
                    };

                    metrics::record_reconnect(P::KIND);
                    tracing::info!(
                        stream = P::KIND.as_str(),
                        attempt = policy.attempt_count(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Waiting to reconnect"
                    );
                    self.transition(ConnectionState::WaitingToReconnect, Some(delay));

                    match Self::wait(&mut commands, delay).await {
                        Wait::Elapsed | Wait::Connect => {}
                        Wait::Disconnect => {
                            self.transition(ConnectionState::Disconnected, None);
                            active = false;
                        }
                        Wait::Shutdown => return,
                    }
                }
            }
        }
    }

    async fn wait(commands: &mut mpsc::UnboundedReceiver<Command>, delay: Duration) -> Wait {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep => return Wait::Elapsed,
                command = commands.recv() => match command {
                    None => return Wait::Shutdown,
                    Some(Command::Connect) => return Wait::Connect,
                    Some(Command::Disconnect) => return Wait::Disconnect,
                    Some(Command::Send { .. }) => {}
                },
            }
        }
    }

    /// Run one socket from open to close.
    async fn session(
        &self,
        commands: &mut mpsc::UnboundedReceiver<Command>,
        policy: &mut ReconnectPolicy,
    ) -> SessionEnd {
        self.transition(ConnectionState::Connecting, None);
        tracing::info!(stream = P::KIND.as_str(), url = self.protocol.url(), "Connecting");

        let request = match self.handshake_request() {
            Ok(request) => request,
            Err(err) => {
                tracing::error!(stream = P::KIND.as_str(), error = %err, "Invalid connection request");
                return self.end_with(err);
            }
        };

        let connecting = tokio_tungstenite::connect_async(request);
        tokio::pin!(connecting);
        let opened = loop {
            tokio::select! {
                result = &mut connecting => break result,
                command = commands.recv() => match command {
                    None => return SessionEnd::Shutdown,
                    Some(Command::Disconnect) => {
                        self.transition(ConnectionState::Disconnected, None);
                        return SessionEnd::Stop;
                    }
                    Some(Command::Connect | Command::Send { .. }) => {}
                },
            }
        };

        let (mut write, mut read) = match opened {
            Ok((socket, _response)) => socket.split(),
            Err(err) => {
                tracing::warn!(stream = P::KIND.as_str(), error = %err, "Connection failed");
                return self.end_with(StreamError::WebSocket(err.to_string()));
            }
        };

        self.transition(ConnectionState::Authenticating, None);
        if let Err(end) = self.send_frame(&mut write, self.protocol.open_frame()).await {
            return end;
        }

        let deadline = tokio::time::sleep(self.auth_timeout);
        tokio::pin!(deadline);

        loop {
            let authenticating = self.state() == ConnectionState::Authenticating;
            tokio::select! {
                () = &mut deadline, if authenticating => {
                    tracing::warn!(stream = P::KIND.as_str(), "Authentication timed out");
                    close(&mut write).await;
                    return self.end_with(StreamError::AuthTimeout(self.auth_timeout));
                }
                command = commands.recv() => match command {
                    None => {
                        close(&mut write).await;
                        return SessionEnd::Shutdown;
                    }
                    Some(Command::Disconnect) => {
                        tracing::info!(stream = P::KIND.as_str(), "Disconnecting on request");
                        close(&mut write).await;
                        self.transition(ConnectionState::Disconnected, None);
                        return SessionEnd::Stop;
                    }
                    Some(Command::Connect) => {
                        tracing::info!(stream = P::KIND.as_str(), "Restarting connection on request");
                        close(&mut write).await;
                        self.transition(ConnectionState::Disconnected, None);
                        return SessionEnd::Restart;
                    }
                    Some(Command::Send { session, frame }) => {
                        let current = {
                            let shared = self.shared.lock();
                            shared.session == session && shared.state.is_connected()
                        };
                        if current {
                            if let Err(end) = self.send_frame(&mut write, Ok(Some(frame))).await {
                                return end;
                            }
                        } else {
                            tracing::debug!(stream = P::KIND.as_str(), "Dropping frame queued for a previous session");
                        }
                    }
                },
                message = read.next() => {
                    let end = match message {
                        Some(Ok(Message::Binary(data))) => {
                            self.handle_frame(&data, &mut write, policy).await
                        }
                        Some(Ok(Message::Text(text))) => {
                            self.handle_frame(text.as_str().as_bytes(), &mut write, policy).await
                        }
                        Some(Ok(Message::Ping(data))) => {
                            self.send_frame(&mut write, Ok(Some(Message::Pong(data)))).await.err()
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(stream = P::KIND.as_str(), ?frame, "Server closed connection");
                            self.transition(ConnectionState::Disconnected, None);
                            Some(SessionEnd::Lost)
                        }
                        Some(Ok(_)) => None,
                        Some(Err(err)) => {
                            tracing::warn!(stream = P::KIND.as_str(), error = %err, "Socket error");
                            Some(self.end_with(StreamError::WebSocket(err.to_string())))
                        }
                        None => {
                            tracing::info!(stream = P::KIND.as_str(), "Socket ended");
                            self.transition(ConnectionState::Disconnected, None);
                            Some(SessionEnd::Lost)
                        }
                    };
                    if let Some(end) = end {
                        return end;
                    }
                }
            }
        }
    }

    /// Decode and route one frame. `Some` ends the session.
    async fn handle_frame<W>(
        &self,
        frame: &[u8],
        write: &mut W,
        policy: &mut ReconnectPolicy,
    ) -> Option<SessionEnd>
    where
        W: Sink<Message> + Unpin,
        W::Error: Display,
    {
        metrics::record_frame_received(P::KIND);
        if self.verbose {
            tracing::debug!(stream = P::KIND.as_str(), bytes = frame.len(), "Frame received");
        } else {
            tracing::trace!(stream = P::KIND.as_str(), bytes = frame.len(), "Frame received");
        }

        let records = match self.protocol.decode(frame) {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(stream = P::KIND.as_str(), error = %err, "Undecodable frame");
                self.report(StreamError::Codec(err.to_string()));
                return None;
            }
        };

        for record in records {
            let inbound = match record {
                Ok(inbound) => inbound,
                Err(err) if err.is_unknown_type() => {
                    tracing::warn!(stream = P::KIND.as_str(), error = %err, "Dropping unrecognized record");
                    continue;
                }
                Err(err) => {
                    tracing::warn!(stream = P::KIND.as_str(), error = %err, "Undecodable record");
                    self.report(StreamError::Codec(err.to_string()));
                    continue;
                }
            };

            match inbound {
                Inbound::Greeting => {
                    tracing::debug!(stream = P::KIND.as_str(), "Server greeting");
                    if self.state() == ConnectionState::Authenticating
                        && let Err(end) = self.send_frame(write, self.protocol.greeting_frame()).await
                    {
                        return Some(end);
                    }
                }
                Inbound::Authorized => {
                    if self.state() != ConnectionState::Authenticating {
                        tracing::warn!(stream = P::KIND.as_str(), "Authorization notice outside authentication");
                        continue;
                    }
                    tracing::info!(stream = P::KIND.as_str(), "Authenticated");
                    policy.reset();
                    let replay = self.mark_connected();
                    self.dispatcher.dispatch(&StreamEvent::Authorized);
                    if let Err(end) = self.send_frame(write, replay).await {
                        return Some(end);
                    }
                }
                Inbound::Rejected(err) => return Some(self.reject(err, write).await),
                Inbound::ServerError(notice) => {
                    if self.state() == ConnectionState::Authenticating {
                        return Some(self.reject(AuthError::from(&notice), write).await);
                    }
                    tracing::warn!(stream = P::KIND.as_str(), code = notice.code, msg = %notice.msg, "Server error");
                    self.report(StreamError::Server {
                        code: notice.code,
                        message: notice.msg,
                    });
                }
                Inbound::Ignored(what) => {
                    tracing::debug!(stream = P::KIND.as_str(), notice = what, "Ignoring notice");
                }
                Inbound::Event(event) => {
                    if event.is_data() && !self.state().is_connected() {
                        self.report(StreamError::Protocol(format!(
                            "{} record received before authorization",
                            event.kind().as_str()
                        )));
                        continue;
                    }
                    self.dispatcher.dispatch(&event);
                }
            }
        }
        None
    }

    async fn reject<W>(&self, err: AuthError, write: &mut W) -> SessionEnd
    where
        W: Sink<Message> + Unpin,
    {
        tracing::error!(stream = P::KIND.as_str(), error = %err, "Authentication rejected");
        self.dispatcher.dispatch(&StreamEvent::Unauthorized(err.clone()));
        close(write).await;
        self.end_with(StreamError::Auth(err))
    }

    /// Report the error that ended a session and pick the outcome: the
    /// reconnect policy for transient errors, a full stop otherwise.
    fn end_with(&self, err: StreamError) -> SessionEnd {
        let end = if err.is_transient() {
            SessionEnd::Lost
        } else {
            SessionEnd::Stop
        };
        self.report(err);
        self.transition(ConnectionState::Disconnected, None);
        end
    }

    /// Send an optional frame. Encoding failures are reported and skipped;
    /// a socket failure ends the session.
    async fn send_frame<W>(
        &self,
        write: &mut W,
        frame: Result<Option<Message>, StreamError>,
    ) -> Result<(), SessionEnd>
    where
        W: Sink<Message> + Unpin,
        W::Error: Display,
    {
        let frame = match frame {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(()),
            Err(err) => {
                self.report(err);
                return Ok(());
            }
        };

        if let Err(err) = write.send(frame).await {
            tracing::warn!(stream = P::KIND.as_str(), error = %err, "Send failed");
            return Err(self.end_with(StreamError::WebSocket(err.to_string())));
        }
        Ok(())
    }

    fn handshake_request(&self) -> Result<Request, StreamError> {
        let mut request = self
            .protocol
            .url()
            .into_client_request()
            .map_err(|e| StreamError::InvalidRequest(e.to_string()))?;

        for (name, value) in self.protocol.handshake_headers() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| StreamError::InvalidRequest(e.to_string()))?;
            let value =
                HeaderValue::from_str(&value).map_err(|e| StreamError::InvalidRequest(e.to_string()))?;
            request.headers_mut().insert(name, value);
        }
        Ok(request)
    }

    /// Enter `Connected` and build the replay frame under one lock, so a
    /// concurrent `update` lands either in the replay or after it.
    fn mark_connected(&self) -> Result<Option<Message>, StreamError> {
        let (previous, replay) = {
            let mut shared = self.shared.lock();
            let previous = shared.state;
            shared.state = ConnectionState::Connected;
            shared.session = shared.session.wrapping_add(1);
            (previous, self.protocol.replay_frame(&shared.desired))
        };
        self.announce(previous, ConnectionState::Connected, None);
        replay
    }

    fn transition(&self, next: ConnectionState, delay: Option<Duration>) {
        let previous = {
            let mut shared = self.shared.lock();
            let previous = shared.state;
            if previous == next {
                return;
            }
            shared.state = next;
            previous
        };
        if !previous.can_transition_to(next) {
            tracing::warn!(stream = P::KIND.as_str(), from = %previous, to = %next, "Unexpected state transition");
        }
        self.announce(previous, next, delay);
    }

    fn announce(&self, previous: ConnectionState, current: ConnectionState, delay: Option<Duration>) {
        tracing::debug!(stream = P::KIND.as_str(), from = %previous, to = %current, "State transition");
        metrics::record_state_transition(P::KIND, current.as_str());
        let change = match delay {
            Some(delay) => StateChange::waiting_to_reconnect(previous, delay),
            None => StateChange::new(previous, current),
        };
        self.dispatcher.dispatch(&StreamEvent::StateChange(change));
    }

    fn report(&self, err: StreamError) {
        metrics::record_stream_error(P::KIND, err.label());
        self.dispatcher.dispatch(&StreamEvent::Error(err));
    }
}

async fn close<W>(write: &mut W)
where
    W: Sink<Message> + Unpin,
{
    let _ = write.send(Message::Close(None)).await;
}
