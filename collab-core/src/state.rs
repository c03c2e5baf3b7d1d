//! Session state machine for Duet.
//!
//! This module provides a pure, side-effect-free state machine for the
//! session lifecycle. The machine takes transport events as input and
//! produces a new state plus the transition to report, if any.
//!
//! Delivering the transition to listeners is done by collab-client, not by
//! this module. This enables instant unit testing without an engine.

use std::fmt;

/// Session lifecycle state - NO I/O, just state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// Credentials obtained, transport not yet up.
    #[default]
    Connecting,
    /// Transport is up; documents can be bound.
    Connected,
    /// Transport dropped; it is retrying on its own.
    Reconnecting,
    /// Session torn down. Terminal.
    Disconnected,
}

impl SessionState {
    /// Create a state machine in the initial Connecting state.
    pub fn new() -> Self {
        Self::Connecting
    }

    /// Process an event and return the new state plus the transition, if the
    /// state actually changed.
    ///
    /// This is a pure function. The caller (collab-client) is responsible
    /// for storing the new state and notifying listeners.
    pub fn on_event(self, event: TransportEvent) -> (Self, Option<Transition>) {
        let next = match (self, event) {
            // Disconnected accepts nothing
            (Self::Disconnected, _) => Self::Disconnected,

            (_, TransportEvent::Connected) => Self::Connected,
            (_, TransportEvent::Disconnected) => Self::Reconnecting,
            (_, TransportEvent::Closed | TransportEvent::Stopped) => Self::Disconnected,
        };

        if next == self {
            (self, None)
        } else {
            (
                next,
                Some(Transition {
                    from: self,
                    to: next,
                    event,
                }),
            )
        }
    }

    /// Process a raw transport event string.
    ///
    /// Unrecognized events leave the state untouched and are not an error.
    pub fn on_raw_event(self, event: &str) -> (Self, Option<Transition>) {
        match TransportEvent::parse(event) {
            Some(event) => self.on_event(event),
            None => (self, None),
        }
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if the session can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Lifecycle events reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportEvent {
    /// `"connected"`
    Connected,
    /// `"disconnected"` - the transport will retry.
    Disconnected,
    /// `"closed"`
    Closed,
    /// `"stopped"`
    Stopped,
}

impl TransportEvent {
    /// Parse a transport event string. Returns `None` for anything the state
    /// machine does not care about.
    pub fn parse(event: &str) -> Option<Self> {
        match event {
            "connected" => Some(Self::Connected),
            "disconnected" => Some(Self::Disconnected),
            "closed" => Some(Self::Closed),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }

    /// The wire name of this event.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Closed => "closed",
            Self::Stopped => "stopped",
        }
    }
}

/// A state change to be reported to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State before the event.
    pub from: SessionState,
    /// State after the event.
    pub to: SessionState,
    /// The event that caused the change.
    pub event: TransportEvent,
}
