//! Connection Lifecycle Types
//!
//! The state of one logical streaming connection and the notifications
//! emitted when it changes. These types carry no I/O; the connection driver
//! in the infrastructure layer is the only writer.
//!
//! # Transitions
//!
//! ```text
//! WaitingToConnect ──connect()──► Connecting ──socket open──► Authenticating
//!                                     ▲                            │
//!                                     │                  authorized│ rejected
//!                     WaitingToReconnect                           ▼     │
//!                                     ▲                        Connected │
//!                                     │                            │     │
//!                                     └──── Disconnected ◄─────────┴─────┘
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of a streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Constructed, `connect()` not called yet.
    #[default]
    WaitingToConnect,
    /// Opening the socket.
    Connecting,
    /// Socket open, credentials sent, awaiting authorization.
    Authenticating,
    /// Authorized; subscriptions and data flow.
    Connected,
    /// Socket closed.
    Disconnected,
    /// A reconnect is scheduled after a delay.
    WaitingToReconnect,
}

impl ConnectionState {
    /// Human-readable name, matching the upstream client's state strings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WaitingToConnect => "waiting to connect",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::WaitingToReconnect => "waiting to reconnect",
        }
    }

    /// Check if the connection is authorized and receiving data.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether `next` is a legal successor of this state.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::WaitingToConnect, Self::Connecting)
                | (Self::Connecting, Self::Authenticating | Self::Disconnected)
                | (Self::Authenticating, Self::Connected | Self::Disconnected)
                | (Self::Connected, Self::Disconnected)
                | (
                    Self::Disconnected,
                    Self::WaitingToReconnect | Self::Connecting
                )
                | (
                    Self::WaitingToReconnect,
                    Self::Connecting | Self::Disconnected
                )
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// State Change Notification
// =============================================================================

/// Emitted on every state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    /// State before the transition.
    pub previous: ConnectionState,
    /// State after the transition.
    pub current: ConnectionState,
    /// Delay before the next attempt; set only when entering `WaitingToReconnect`.
    pub reconnect_delay: Option<Duration>,
}

impl StateChange {
    /// Create a plain transition record.
    #[must_use]
    pub const fn new(previous: ConnectionState, current: ConnectionState) -> Self {
        Self {
            previous,
            current,
            reconnect_delay: None,
        }
    }

    /// Create the record for a scheduled reconnect.
    #[must_use]
    pub const fn waiting_to_reconnect(previous: ConnectionState, delay: Duration) -> Self {
        Self {
            previous,
            current: ConnectionState::WaitingToReconnect,
            reconnect_delay: Some(delay),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
