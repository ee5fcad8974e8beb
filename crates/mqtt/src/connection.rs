//! Broker connection management.
//!
//! This module provides two types:
//! - `ConnectionKernel`: the background transport task. It owns rumqttc's
//!   `EventLoop`, turns what it sees into [`TransportEvent`]s, feeds them
//!   through the state machine and carries out the resulting actions.
//! - `ConnectionManager`: the handle the rest of the program uses. Its
//!   `ensure_connected` asks the kernel for a handshake and waits, retrying
//!   with a fixed delay until the session is up or shutdown is requested.
//!
//! # Architecture
//!
//! ```text
//! Scan loop / Publisher
//!     ↓ ensure_connected()          ↑ SharedState (watch)
//! ConnectionManager ──notify──> ConnectionKernel (tokio task)
//!                                   ↓ poll()
//!                         rumqttc EventLoop (MQTT protocol)
//!                                   ↓
//!                              Network (TCP)
//! ```
//!
//! The kernel only drives the event loop while a handshake is in flight or a
//! session is up. When the session drops it parks until the next connect
//! request, so reconnect timing is owned by `ensure_connected` alone.

use std::{sync::Arc, time::Duration};

use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, Outgoing, Packet, QoS};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::{
    config::Config,
    error::TransferError,
    retry::RetryPolicy,
    state::{Action, ConnectionState, SharedState, Transition, TransportEvent},
};

/// How long shutdown waits for DISCONNECT to reach the socket.
const DISCONNECT_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Background transport task.
///
/// Runs on a single tokio task for the lifetime of the process. The
/// `AsyncClient` it holds is a clone of the one used for publishing.
pub struct ConnectionKernel {
    client: AsyncClient,
    event_loop: EventLoop,
    state: SharedState,

    /// Wake-up channel for handshake requests from `ConnectionManager`.
    connect_requests: Arc<Notify>,

    /// Topic subscribed to after every successful CONNACK.
    inbound_topic: String,

    /// `host:port`, for log lines.
    address: String,

    cancel: CancellationToken,
}

impl ConnectionKernel {
    pub fn new(
        client: AsyncClient,
        event_loop: EventLoop,
        config: &Config,
        state: SharedState,
        connect_requests: Arc<Notify>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            event_loop,
            state,
            connect_requests,
            inbound_topic: config.inbound_topic.clone(),
            address: config.address(),
            cancel,
        }
    }

    /// Main loop. Returns once the cancellation token fires and DISCONNECT
    /// has been flushed (best effort).
    pub async fn run(mut self) {
        info!("Connection kernel started for {}", self.address);
        let mut state_rx = self.state.subscribe();
        let mut link_open = false;

        loop {
            if self.state.get() == ConnectionState::Disconnected {
                if link_open {
                    // The session was declared dead from outside (failed send)
                    // while rumqttc still holds the socket. Drop it so the
                    // next poll performs a fresh handshake.
                    self.event_loop.clean();
                    link_open = false;
                    debug!("Dropped stale network link");
                }

                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = self.connect_requests.notified() => {
                        let transition = self.state.apply(&TransportEvent::ConnectRequested);
                        // Own writes are not external changes
                        state_rx.borrow_and_update();
                        self.perform(transition);
                    }
                }
                continue;
            }

            link_open = true;
            tokio::select! {
                _ = self.cancel.cancelled() => break,

                // Someone else moved the state; re-evaluate at the top.
                _ = state_rx.changed() => {}

                polled = self.event_loop.poll() => {
                    let event = match polled {
                        Ok(event) => match self.classify(event) {
                            Some(event) => event,
                            None => continue,
                        },
                        Err(e) => {
                            // rumqttc already dropped the network on error
                            link_open = false;
                            connection_error_event(&e)
                        }
                    };
                    let transition = self.state.apply(&event);
                    state_rx.borrow_and_update();
                    self.perform(transition);
                }
            }
        }

        info!("Shutdown signal received, closing MQTT session...");
        self.disconnect().await;
        info!("Connection kernel shutdown completed");
    }

    /// Maps a rumqttc event onto the state machine's vocabulary. Events the
    /// state machine does not care about are logged and dropped.
    fn classify(&self, event: Event) -> Option<TransportEvent> {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => Some(TransportEvent::ConnAck(ack.code)),
            Event::Incoming(Packet::Disconnect) => Some(TransportEvent::BrokerDisconnect),
            Event::Incoming(Packet::Publish(publish)) => {
                debug!(
                    "Received {} bytes on topic {}",
                    publish.payload.len(),
                    publish.topic
                );
                None
            }
            Event::Incoming(Packet::SubAck(ack)) => {
                debug!("Subscription acknowledged (pkid={})", ack.pkid);
                None
            }
            Event::Incoming(Packet::PingResp) | Event::Outgoing(Outgoing::PingReq) => None,
            Event::Incoming(packet) => {
                trace!("Incoming packet: {:?}", packet);
                None
            }
            Event::Outgoing(outgoing) => {
                trace!("Outgoing packet: {:?}", outgoing);
                None
            }
        }
    }

    fn perform(&self, transition: Transition) {
        match transition.action {
            Action::None => {}
            Action::StartHandshake => {
                info!("Connecting to MQTT broker at {}...", self.address);
            }
            Action::Subscribe => {
                info!("MQTT connected to {}", self.address);
                // try_subscribe: awaiting here would deadlock on a full
                // queue, since this task is the one that drains it.
                match self.client.try_subscribe(&self.inbound_topic, QoS::AtMostOnce) {
                    Ok(()) => debug!("Subscribed to {}", self.inbound_topic),
                    Err(e) => warn!("Failed to subscribe to {}: {}", self.inbound_topic, e),
                }
            }
            Action::ReportAckFailure(code) => {
                error!("MQTT connection failed (rc={:?})", code);
            }
            Action::ReportConnectFailure(reason) => {
                error!("MQTT connect failed: {}", reason);
            }
            Action::ReportUnexpectedDisconnect(reason) => {
                warn!(
                    "MQTT disconnected unexpectedly ({}). Will reconnect on next use",
                    reason
                );
            }
        }
    }

    /// Sends DISCONNECT if a session is up and drives the event loop until it
    /// is written out. Best effort: failures are logged, never returned.
    async fn disconnect(&mut self) {
        if !self.state.is_connected() {
            self.state.set(ConnectionState::Disconnected);
            return;
        }

        if let Err(e) = self.client.try_disconnect() {
            warn!("Error queueing disconnect packet: {}", e);
            self.state.set(ConnectionState::Disconnected);
            return;
        }

        let event_loop = &mut self.event_loop;
        let flush = async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
        };
        if tokio::time::timeout(DISCONNECT_FLUSH_TIMEOUT, flush)
            .await
            .is_err()
        {
            warn!("Timed out flushing DISCONNECT");
        }
        self.state.set(ConnectionState::Disconnected);
    }
}

/// Converts an event loop error into a state machine event. A refused
/// CONNACK surfaces from rumqttc as an error but is an acknowledgement
/// failure, not a transport failure.
fn connection_error_event(err: &ConnectionError) -> TransportEvent {
    match err {
        ConnectionError::ConnectionRefused(code) => TransportEvent::ConnAck(*code),
        other => TransportEvent::TransportError(get_error_message(other)),
    }
}

/// Walks the source chain to the root cause message.
fn get_error_message(e: &dyn std::error::Error) -> String {
    let mut current = e;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string().trim_matches('"').to_string()
}

/// Handle used to wait for a live session.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    state: SharedState,
    connect_requests: Arc<Notify>,
    retry_delay: Duration,

    /// How long one attempt waits for CONNACK.
    ack_window: Duration,
    address: String,
    cancel: CancellationToken,
}

impl ConnectionManager {
    pub fn new(
        config: &Config,
        state: SharedState,
        connect_requests: Arc<Notify>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            state,
            connect_requests,
            retry_delay: config.retry_delay(),
            ack_window: config.ack_window(),
            address: config.address(),
            cancel,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Blocks the caller until the session is `Connected`.
    ///
    /// Returns immediately when already connected. Otherwise each attempt
    /// asks the kernel for a handshake and waits for its outcome, at most
    /// `ack_poll_attempts × ack_poll_interval`. A handshake that fails (socket
    /// error, refused CONNACK) ends the wait at once. A failed or silent
    /// attempt is followed by the retry delay. There is no attempt limit.
    ///
    /// # Errors
    ///
    /// `TransferError::Shutdown` if the cancellation token fires first.
    pub async fn ensure_connected(&self) -> Result<(), TransferError> {
        if self.state.is_connected() {
            return Ok(());
        }

        let mut retry = RetryPolicy::new(self.retry_delay);
        loop {
            if self.cancel.is_cancelled() {
                return Err(TransferError::Shutdown);
            }

            let mut rx = self.state.subscribe();
            self.connect_requests.notify_one();
            let connected = tokio::select! {
                _ = self.cancel.cancelled() => return Err(TransferError::Shutdown),
                connected = SharedState::wait_connected(&mut rx, self.ack_window) => connected,
            };

            if connected {
                if retry.attempt() > 0 {
                    info!(
                        "Connected to {} after {} failed attempts",
                        self.address,
                        retry.attempt()
                    );
                }
                return Ok(());
            }

            let delay = retry.next_sleep();
            warn!(
                "Could not connect to {} (attempt {}). Retrying in {}s...",
                self.address,
                retry.attempt(),
                delay.as_secs()
            );
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(TransferError::Shutdown),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Forces the state to `Disconnected` after a failed send. The kernel
    /// notices the change and drops the socket.
    pub fn mark_disconnected(&self, reason: &str) {
        let transition = self.state.apply(&TransportEvent::SendFailed(reason.to_string()));
        if let Action::ReportUnexpectedDisconnect(reason) = transition.action {
            warn!("Marked MQTT session as disconnected: {}", reason);
        }
    }
}
