//! Connection state tracking for the broker session.
//!
//! Two pieces live here:
//! - [`transition`], a pure function mapping `(state, event)` to the next
//!   state plus the side effect the connection kernel must perform. It holds
//!   the whole connect/disconnect state machine and needs no broker to test.
//! - [`SharedState`], the single piece of mutable state shared between the
//!   background transport task and the scan loop. It wraps a watch channel so
//!   writes are immediately visible to every holder and waiters can await a
//!   change with a deadline instead of sleeping blindly.
//!
//! ```text
//! Disconnected ──(connect requested)──> Connecting
//! Connecting   ──(CONNACK success)────> Connected    [subscribe inbound topic]
//! Connecting   ──(CONNACK failure)────> Disconnected [log return code]
//! Connecting   ──(transport error)────> Disconnected [log connect failure]
//! Connected    ──(disconnect/error)───> Disconnected [warn]
//! ```

use std::{fmt, time::Duration};

use rumqttc::ConnectReturnCode;
use tokio::sync::watch;

/// Current state of the broker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session. Publishes must wait for `ensure_connected`.
    Disconnected,

    /// A CONNECT has been sent and the kernel is waiting for CONNACK.
    Connecting,

    /// The broker acknowledged the handshake and the transport is healthy.
    /// This is the only state in which publishes are attempted.
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that happened on the transport, as seen by the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// `ensure_connected` asked for a handshake.
    ConnectRequested,

    /// CONNACK arrived with the given return code.
    ConnAck(ConnectReturnCode),

    /// The broker sent DISCONNECT.
    BrokerDisconnect,

    /// The event loop reported an error (socket, timeout, protocol).
    TransportError(String),

    /// The publisher observed a send failure and is forcing a reconnect.
    SendFailed(String),
}

/// Side effect the kernel carries out after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Nothing beyond the state change.
    None,

    /// Start driving the event loop so rumqttc sends CONNECT.
    StartHandshake,

    /// Handshake succeeded: log and subscribe to the inbound topic.
    Subscribe,

    /// Broker refused the handshake; log the return code.
    ReportAckFailure(ConnectReturnCode),

    /// The connect attempt itself failed.
    ReportConnectFailure(String),

    /// A healthy session was lost.
    ReportUnexpectedDisconnect(String),
}

/// Result of applying one event to the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: ConnectionState,
    pub action: Action,
}

impl Transition {
    fn to(next: ConnectionState, action: Action) -> Self {
        Self { next, action }
    }
}

/// The connection state machine.
///
/// Never panics and never produces `Connected` except from a successful
/// CONNACK. Any failure event moves to `Disconnected`.
pub fn transition(state: ConnectionState, event: &TransportEvent) -> Transition {
    use ConnectionState::*;

    match (state, event) {
        // A connect request while a handshake is in flight or a session is up
        // must not start a second handshake.
        (Disconnected, TransportEvent::ConnectRequested) => {
            Transition::to(Connecting, Action::StartHandshake)
        }
        (s, TransportEvent::ConnectRequested) => Transition::to(s, Action::None),

        (_, TransportEvent::ConnAck(ConnectReturnCode::Success)) => {
            Transition::to(Connected, Action::Subscribe)
        }
        (_, TransportEvent::ConnAck(code)) => {
            Transition::to(Disconnected, Action::ReportAckFailure(*code))
        }

        (Connected, TransportEvent::BrokerDisconnect) => Transition::to(
            Disconnected,
            Action::ReportUnexpectedDisconnect("Disconnected by broker".into()),
        ),
        (Connected, TransportEvent::TransportError(reason))
        | (Connected, TransportEvent::SendFailed(reason)) => Transition::to(
            Disconnected,
            Action::ReportUnexpectedDisconnect(reason.clone()),
        ),

        (Connecting, TransportEvent::TransportError(reason)) => Transition::to(
            Disconnected,
            Action::ReportConnectFailure(reason.clone()),
        ),
        (Connecting, TransportEvent::BrokerDisconnect) => Transition::to(
            Disconnected,
            Action::ReportConnectFailure("Disconnected by broker".into()),
        ),
        (Connecting, TransportEvent::SendFailed(_)) => Transition::to(Disconnected, Action::None),

        (Disconnected, _) => Transition::to(Disconnected, Action::None),
    }
}

/// Connection state shared between the transport task and its users.
///
/// Cloning is cheap; every clone observes the same value.
#[derive(Debug, Clone)]
pub struct SharedState {
    tx: watch::Sender<ConnectionState>,
}

impl SharedState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Disconnected);
        Self { tx }
    }

    pub fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.get().is_connected()
    }

    /// Stores `state`, returning the previous value. Waiters are only woken
    /// when the value actually changes.
    pub fn set(&self, state: ConnectionState) -> ConnectionState {
        let mut previous = state;
        self.tx.send_if_modified(|current| {
            previous = *current;
            *current = state;
            previous != state
        });
        previous
    }

    /// Applies `event` to the current state atomically and returns the
    /// transition that was taken.
    pub fn apply(&self, event: &TransportEvent) -> Transition {
        let mut taken = None;
        self.tx.send_if_modified(|current| {
            let t = transition(*current, event);
            let changed = t.next != *current;
            *current = t.next;
            taken = Some(t);
            changed
        });
        // send_if_modified always runs the closure exactly once
        taken.unwrap_or_else(|| Transition::to(self.get(), Action::None))
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Waits for the outcome of a handshake requested after `rx` was taken
    /// from [`SharedState::subscribe`], for at most `window`.
    ///
    /// Returns `true` once the state is `Connected`. Returns `false` as soon
    /// as the attempt ends back in `Disconnected`, or when the window elapses.
    /// Subscribing before the request is sent means a handshake that fails
    /// before the wait starts is still seen as a change.
    pub async fn wait_connected(
        rx: &mut watch::Receiver<ConnectionState>,
        window: Duration,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + window;
        if rx.borrow_and_update().is_connected() {
            return true;
        }
        loop {
            match tokio::time::timeout_at(deadline, rx.changed()).await {
                Ok(Ok(())) => match *rx.borrow_and_update() {
                    ConnectionState::Connected => return true,
                    // Disconnected never notifies itself, so a change that
                    // lands here is the end of an attempt.
                    ConnectionState::Disconnected => return false,
                    ConnectionState::Connecting => continue,
                },
                // Sender gone
                Ok(Err(_)) => return false,
                Err(_) => return rx.borrow().is_connected(),
            }
        }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
