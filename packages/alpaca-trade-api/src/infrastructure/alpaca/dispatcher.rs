//! Event Dispatcher
//!
//! Routes decoded stream events to observers registered per event kind.
//! Observers for one kind run in registration order. A panicking observer
//! is logged and skipped; delivery continues with the next one.
//!
//! The observer list is snapshotted before callbacks run, so an observer
//! may register or remove observers (including itself) without deadlocking.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::auth::AuthError;
use super::connection::StreamError;
use super::messages::{
    Bar, CancelError, Correction, Luld, Quote, SubscriptionMessage, Trade, TradeUpdate,
    TradingStatus,
};
use crate::domain::streaming::StateChange;
use crate::infrastructure::metrics;

// =============================================================================
// Events
// =============================================================================

/// Everything a streaming client can notify observers about.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Connection state changed.
    StateChange(StateChange),
    /// Server accepted the credentials.
    Authorized,
    /// Server rejected the credentials; no reconnect follows.
    Unauthorized(AuthError),
    /// Server acknowledged a subscription change.
    Subscription(SubscriptionMessage),
    /// Trading stream confirmed the streams it is sending.
    Listening(Vec<String>),
    /// Client, protocol, transport or server error.
    Error(StreamError),
    /// Trade.
    Trade(Trade),
    /// Quote.
    Quote(Quote),
    /// Minute bar.
    Bar(Bar),
    /// Updated bar.
    UpdatedBar(Bar),
    /// Daily bar.
    DailyBar(Bar),
    /// Trading status.
    Status(TradingStatus),
    /// LULD band.
    Luld(Luld),
    /// Trade cancel/error.
    CancelError(CancelError),
    /// Trade correction.
    Correction(Correction),
    /// Order lifecycle event.
    TradeUpdate(Box<TradeUpdate>),
    /// Account change, raw.
    AccountUpdate(serde_json::Value),
}

impl StreamEvent {
    /// Kind used for observer routing.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::StateChange(_) => EventKind::StateChange,
            Self::Authorized => EventKind::Authorized,
            Self::Unauthorized(_) => EventKind::Unauthorized,
            Self::Subscription(_) => EventKind::Subscription,
            Self::Listening(_) => EventKind::Listening,
            Self::Error(_) => EventKind::Error,
            Self::Trade(_) => EventKind::Trade,
            Self::Quote(_) => EventKind::Quote,
            Self::Bar(_) => EventKind::Bar,
            Self::UpdatedBar(_) => EventKind::UpdatedBar,
            Self::DailyBar(_) => EventKind::DailyBar,
            Self::Status(_) => EventKind::Status,
            Self::Luld(_) => EventKind::Luld,
            Self::CancelError(_) => EventKind::CancelError,
            Self::Correction(_) => EventKind::Correction,
            Self::TradeUpdate(_) => EventKind::TradeUpdate,
            Self::AccountUpdate(_) => EventKind::AccountUpdate,
        }
    }

    /// Check if this is market or account data, which may only flow once
    /// the connection is authorized.
    #[must_use]
    pub const fn is_data(&self) -> bool {
        self.kind().is_data()
    }
}

/// Discriminant of [`StreamEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`StreamEvent::StateChange`]
    StateChange,
    /// [`StreamEvent::Authorized`]
    Authorized,
    /// [`StreamEvent::Unauthorized`]
    Unauthorized,
    /// [`StreamEvent::Subscription`]
    Subscription,
    /// [`StreamEvent::Listening`]
    Listening,
    /// [`StreamEvent::Error`]
    Error,
    /// [`StreamEvent::Trade`]
    Trade,
    /// [`StreamEvent::Quote`]
    Quote,
    /// [`StreamEvent::Bar`]
    Bar,
    /// [`StreamEvent::UpdatedBar`]
    UpdatedBar,
    /// [`StreamEvent::DailyBar`]
    DailyBar,
    /// [`StreamEvent::Status`]
    Status,
    /// [`StreamEvent::Luld`]
    Luld,
    /// [`StreamEvent::CancelError`]
    CancelError,
    /// [`StreamEvent::Correction`]
    Correction,
    /// [`StreamEvent::TradeUpdate`]
    TradeUpdate,
    /// [`StreamEvent::AccountUpdate`]
    AccountUpdate,
}

impl EventKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StateChange => "state_change",
            Self::Authorized => "authorized",
            Self::Unauthorized => "unauthorized",
            Self::Subscription => "subscription",
            Self::Listening => "listening",
            Self::Error => "error",
            Self::Trade => "trade",
            Self::Quote => "quote",
            Self::Bar => "bar",
            Self::UpdatedBar => "updated_bar",
            Self::DailyBar => "daily_bar",
            Self::Status => "status",
            Self::Luld => "luld",
            Self::CancelError => "cancel_error",
            Self::Correction => "correction",
            Self::TradeUpdate => "trade_update",
            Self::AccountUpdate => "account_update",
        }
    }

    /// Check if events of this kind carry data records.
    #[must_use]
    pub const fn is_data(self) -> bool {
        !matches!(
            self,
            Self::StateChange
                | Self::Authorized
                | Self::Unauthorized
                | Self::Subscription
                | Self::Listening
                | Self::Error
        )
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

type Observer = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

/// Handle returned by [`EventDispatcher::register`]; pass it to
/// [`EventDispatcher::remove`] to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken {
    kind: EventKind,
    id: u64,
}

impl ObserverToken {
    /// Kind the observer was registered for.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }
}

/// Per-kind observer registry.
#[derive(Default)]
pub struct EventDispatcher {
    next_id: AtomicU64,
    observers: RwLock<HashMap<EventKind, Vec<(u64, Observer)>>>,
}

impl EventDispatcher {
    /// Create an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer` for events of `kind`.
    pub fn register<F>(&self, kind: EventKind, observer: F) -> ObserverToken
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers
            .write()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(observer)));
        ObserverToken { kind, id }
    }

    /// Remove a registered observer. Returns `false` if it was already gone.
    pub fn remove(&self, token: ObserverToken) -> bool {
        let mut observers = self.observers.write();
        let Some(list) = observers.get_mut(&token.kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != token.id);
        before != list.len()
    }

    /// Deliver `event` to every observer of its kind. Returns how many
    /// observers completed without panicking.
    pub fn dispatch(&self, event: &StreamEvent) -> usize {
        let kind = event.kind();
        let snapshot: Vec<Observer> = match self.observers.read().get(&kind) {
            Some(list) => list.iter().map(|(_, observer)| Arc::clone(observer)).collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for observer in snapshot {
            if catch_unwind(AssertUnwindSafe(|| observer(event))).is_ok() {
                delivered += 1;
            } else {
                tracing::error!(event = kind.as_str(), "Observer panicked; continuing dispatch");
                metrics::record_observer_panic(kind.as_str());
            }
        }
        delivered
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let observers = self.observers.read();
        let counts: HashMap<&'static str, usize> = observers
            .iter()
            .map(|(kind, list)| (kind.as_str(), list.len()))
            .collect();
        f.debug_struct("EventDispatcher")
            .field("observers", &counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn observers_run_in_registration_order() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let seen = Arc::clone(&seen);
            dispatcher.register(EventKind::Authorized, move |_| seen.lock().push(n));
        }

        assert_eq!(dispatcher.dispatch(&StreamEvent::Authorized), 3);
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn only_matching_kind_is_notified() {
        let dispatcher = EventDispatcher::new();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);
        dispatcher.register(EventKind::Listening, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(dispatcher.dispatch(&StreamEvent::Authorized), 0);
        dispatcher.dispatch(&StreamEvent::Listening(vec!["trade_updates".into()]));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_observer_is_isolated() {
        let dispatcher = EventDispatcher::new();
        let reached = Arc::new(AtomicU64::new(0));

        dispatcher.register(EventKind::Authorized, |_| panic!("observer failure"));
        let counter = Arc::clone(&reached);
        dispatcher.register(EventKind::Authorized, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(dispatcher.dispatch(&StreamEvent::Authorized), 1);
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removed_observer_is_not_called() {
        let dispatcher = EventDispatcher::new();
        let token = dispatcher.register(EventKind::Authorized, |_| panic!("must not run"));
        assert_eq!(token.kind(), EventKind::Authorized);

        assert!(dispatcher.remove(token));
        assert!(!dispatcher.remove(token));
        assert_eq!(dispatcher.dispatch(&StreamEvent::Authorized), 0);
    }

    #[test]
    fn observer_may_register_during_dispatch() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let inner = Arc::clone(&dispatcher);
        dispatcher.register(EventKind::Authorized, move |_| {
            inner.register(EventKind::Authorized, |_| {});
        });

        assert_eq!(dispatcher.dispatch(&StreamEvent::Authorized), 1);
        assert_eq!(dispatcher.dispatch(&StreamEvent::Authorized), 2);
    }

    #[test]
    fn data_kinds() {
        assert!(EventKind::Trade.is_data());
        assert!(EventKind::TradeUpdate.is_data());
        assert!(!EventKind::Subscription.is_data());
        assert!(!StreamEvent::Authorized.is_data());
    }
}
