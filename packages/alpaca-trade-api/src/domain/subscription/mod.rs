//! Subscription Types
//!
//! The desired subscription state of a market data connection, kept as an
//! explicit value owned by the client. The server's acknowledgement is never
//! written back here: after every (re)authorization the whole set is replayed
//! as one subscribe frame, so the client's view stays authoritative.
//!
//! # Derived Channels
//!
//! Cancel-errors and corrections are delivered for every symbol subscribed to
//! trades. They have no subscription of their own and show up in
//! [`SubscriptionSnapshot`] as copies of the trades list.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Symbol sentinel meaning "every symbol" for a channel.
pub const ALL_SYMBOLS: &str = "*";

// =============================================================================
// Channel
// =============================================================================

/// A market data channel category that can be subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Channel {
    /// Trades (also drives cancel-errors and corrections).
    Trades,
    /// Quotes.
    Quotes,
    /// Minute bars.
    Bars,
    /// Late-trade corrections to minute bars.
    UpdatedBars,
    /// Daily bars.
    DailyBars,
    /// Trading status (halts, resumes).
    Statuses,
    /// Limit up / limit down bands.
    Lulds,
}

impl Channel {
    /// Every channel, in wire order.
    pub const ALL: [Self; 7] = [
        Self::Trades,
        Self::Quotes,
        Self::Bars,
        Self::UpdatedBars,
        Self::DailyBars,
        Self::Statuses,
        Self::Lulds,
    ];

    /// Key used for this channel in subscribe frames.
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Trades => "trades",
            Self::Quotes => "quotes",
            Self::Bars => "bars",
            Self::UpdatedBars => "updatedBars",
            Self::DailyBars => "dailyBars",
            Self::Statuses => "statuses",
            Self::Lulds => "lulds",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

// =============================================================================
// Subscription Delta
// =============================================================================

/// Symbols per channel for one subscribe or unsubscribe call.
///
/// Used both as the caller's request and as the actual change applied to a
/// [`SubscriptionSet`] (only symbols whose membership changed).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionDelta {
    entries: BTreeMap<Channel, Vec<String>>,
}

impl SubscriptionDelta {
    /// Create an empty delta.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add symbols for a channel (builder style).
    #[must_use]
    pub fn with<I, S>(mut self, channel: Channel, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extend(channel, symbols);
        self
    }

    /// Add symbols for a channel, skipping duplicates within the delta.
    pub fn extend<I, S>(&mut self, channel: Channel, symbols: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list = self.entries.entry(channel).or_default();
        for symbol in symbols {
            let symbol = symbol.into();
            if !list.contains(&symbol) {
                list.push(symbol);
            }
        }
        if list.is_empty() {
            self.entries.remove(&channel);
        }
    }

    /// Symbols listed for a channel.
    #[must_use]
    pub fn symbols(&self, channel: Channel) -> &[String] {
        self.entries.get(&channel).map_or(&[], Vec::as_slice)
    }

    /// Check whether no channel lists any symbol.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    /// Iterate over non-empty channels.
    pub fn iter(&self) -> impl Iterator<Item = (Channel, &[String])> {
        self.entries
            .iter()
            .filter(|(_, symbols)| !symbols.is_empty())
            .map(|(channel, symbols)| (*channel, symbols.as_slice()))
    }
}

// =============================================================================
// Subscription Set
// =============================================================================

/// Desired subscriptions: channel to symbol set.
///
/// Created empty, survives reconnects, changed only by explicit subscribe and
/// unsubscribe calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    channels: BTreeMap<Channel, BTreeSet<String>>,
}

impl SubscriptionSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every symbol in `request`.
    ///
    /// Returns the symbols that were not already present. An empty result
    /// means the call was a no-op.
    pub fn add(&mut self, request: &SubscriptionDelta) -> SubscriptionDelta {
        let mut applied = SubscriptionDelta::new();
        for (channel, symbols) in request.iter() {
            let set = self.channels.entry(channel).or_default();
            let added: Vec<&String> = symbols
                .iter()
                .filter(|symbol| set.insert((*symbol).clone()))
                .collect();
            applied.extend(channel, added.into_iter().cloned());
        }
        self.channels.retain(|_, set| !set.is_empty());
        applied
    }

    /// Remove every symbol in `request`.
    ///
    /// Returns the symbols that were actually present.
    pub fn remove(&mut self, request: &SubscriptionDelta) -> SubscriptionDelta {
        let mut applied = SubscriptionDelta::new();
        for (channel, symbols) in request.iter() {
            let Some(set) = self.channels.get_mut(&channel) else {
                continue;
            };
            let removed: Vec<&String> = symbols.iter().filter(|symbol| set.remove(*symbol)).collect();
            applied.extend(channel, removed.into_iter().cloned());
        }
        self.channels.retain(|_, set| !set.is_empty());
        applied
    }

    /// Sorted symbols for a channel.
    #[must_use]
    pub fn symbols(&self, channel: Channel) -> Vec<String> {
        self.channels
            .get(&channel)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Check whether nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Total number of (channel, symbol) pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.values().map(BTreeSet::len).sum()
    }

    /// Drop every subscription; used when the client is disposed.
    pub fn clear(&mut self) {
        self.channels.clear();
    }

    /// The whole set as a delta, used to replay after authorization.
    #[must_use]
    pub fn to_delta(&self) -> SubscriptionDelta {
        let mut delta = SubscriptionDelta::new();
        for (channel, symbols) in &self.channels {
            delta.extend(*channel, symbols.iter().cloned());
        }
        delta
    }

    /// Caller-facing view including derived channels.
    #[must_use]
    pub fn snapshot(&self) -> SubscriptionSnapshot {
        let trades = self.symbols(Channel::Trades);
        SubscriptionSnapshot {
            cancel_errors: trades.clone(),
            corrections: trades.clone(),
            trades,
            quotes: self.symbols(Channel::Quotes),
            bars: self.symbols(Channel::Bars),
            updated_bars: self.symbols(Channel::UpdatedBars),
            daily_bars: self.symbols(Channel::DailyBars),
            statuses: self.symbols(Channel::Statuses),
            lulds: self.symbols(Channel::Lulds),
        }
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Desired subscriptions as sorted lists per channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSnapshot {
    /// Trade symbols.
    pub trades: Vec<String>,
    /// Quote symbols.
    pub quotes: Vec<String>,
    /// Minute bar symbols.
    pub bars: Vec<String>,
    /// Updated bar symbols.
    pub updated_bars: Vec<String>,
    /// Daily bar symbols.
    pub daily_bars: Vec<String>,
    /// Trading status symbols.
    pub statuses: Vec<String>,
    /// LULD symbols.
    pub lulds: Vec<String>,
    /// Same as `trades`.
    pub cancel_errors: Vec<String>,
    /// Same as `trades`.
    pub corrections: Vec<String>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn trades(symbols: &[&str]) -> SubscriptionDelta {
        SubscriptionDelta::new().with(Channel::Trades, symbols.iter().copied())
    }

    #[test]
    fn add_reports_only_new_symbols() {
        let mut set = SubscriptionSet::new();
        let first = set.add(&trades(&["AAPL", "MSFT"]));
        assert_eq!(first.symbols(Channel::Trades), ["AAPL", "MSFT"]);

        let second = set.add(&trades(&["MSFT", "TSLA"]));
        assert_eq!(second.symbols(Channel::Trades), ["TSLA"]);
        assert_eq!(set.symbols(Channel::Trades), ["AAPL", "MSFT", "TSLA"]);
    }

    #[test]
    fn duplicate_add_is_noop() {
        let mut set = SubscriptionSet::new();
        set.add(&trades(&["AAPL"]));
        assert!(set.add(&trades(&["AAPL"])).is_empty());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn empty_request_changes_nothing() {
        let mut set = SubscriptionSet::new();
        let applied = set.add(&SubscriptionDelta::new().with(Channel::Quotes, Vec::<String>::new()));
        assert!(applied.is_empty());
        assert!(set.is_empty());
    }

    #[test]
    fn remove_reports_only_present_symbols() {
        let mut set = SubscriptionSet::new();
        set.add(&trades(&["AAPL", "MSFT"]));

        let removed = set.remove(&trades(&["MSFT", "GOOG"]));
        assert_eq!(removed.symbols(Channel::Trades), ["MSFT"]);
        assert_eq!(set.symbols(Channel::Trades), ["AAPL"]);

        assert!(set.remove(&trades(&["GOOG"])).is_empty());
    }

    #[test]
    fn removing_last_symbol_drops_channel() {
        let mut set = SubscriptionSet::new();
        set.add(&trades(&["AAPL"]));
        set.remove(&trades(&["AAPL"]));
        assert!(set.is_empty());
        assert!(set.to_delta().is_empty());
    }

    #[test]
    fn channels_are_independent() {
        let mut set = SubscriptionSet::new();
        set.add(
            &SubscriptionDelta::new()
                .with(Channel::Trades, ["AAPL"])
                .with(Channel::Bars, ["GE"]),
        );
        set.remove(&SubscriptionDelta::new().with(Channel::Bars, ["AAPL"]));

        assert_eq!(set.symbols(Channel::Trades), ["AAPL"]);
        assert_eq!(set.symbols(Channel::Bars), ["GE"]);
    }

    #[test]
    fn snapshot_derives_cancel_errors_and_corrections_from_trades() {
        let mut set = SubscriptionSet::new();
        set.add(
            &SubscriptionDelta::new()
                .with(Channel::Trades, ["MSFT", "AAPL"])
                .with(Channel::Bars, ["GE"]),
        );

        let snapshot = set.snapshot();
        assert_eq!(snapshot.trades, ["AAPL", "MSFT"]);
        assert_eq!(snapshot.cancel_errors, snapshot.trades);
        assert_eq!(snapshot.corrections, snapshot.trades);
        assert_eq!(snapshot.bars, ["GE"]);
        assert!(snapshot.quotes.is_empty());
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let json = serde_json::to_value(SubscriptionSet::new().snapshot()).unwrap();
        for key in ["updatedBars", "dailyBars", "cancelErrors", "corrections", "lulds"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn wildcard_is_kept_and_replayed() {
        let mut set = SubscriptionSet::new();
        set.add(&SubscriptionDelta::new().with(Channel::Quotes, [ALL_SYMBOLS]));
        assert_eq!(set.symbols(Channel::Quotes), [ALL_SYMBOLS]);
        assert!(set.symbols(Channel::Trades).is_empty());

        let replay = set.to_delta();
        assert_eq!(replay.symbols(Channel::Quotes), [ALL_SYMBOLS]);

        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn to_delta_replays_everything() {
        let mut set = SubscriptionSet::new();
        set.add(
            &SubscriptionDelta::new()
                .with(Channel::Statuses, ["*"])
                .with(Channel::Trades, ["AAPL"]),
        );
        let delta = set.to_delta();
        assert_eq!(delta.symbols(Channel::Trades), ["AAPL"]);
        assert_eq!(delta.symbols(Channel::Statuses), ["*"]);
        assert_eq!(delta.iter().count(), 2);
    }

    #[test]
    fn channel_wire_names() {
        let names: Vec<&str> = Channel::ALL.iter().map(|c| c.wire_name()).collect();
        assert_eq!(
            names,
            ["trades", "quotes", "bars", "updatedBars", "dailyBars", "statuses", "lulds"]
        );
    }
}
