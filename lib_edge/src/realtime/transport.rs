//! # Resilient Transport
//!
//! Keeps one duplex WebSocket to the edge server alive for as long as the
//! owner wants it, and hides every reconnect behind a single event stream.
//!
//! ## Lifecycle
//!
//! `Connecting → Open → (Closed → Connecting)*`. There is no terminal state
//! short of [`TransportHandle::shutdown`]: a refused connect, a read error, a
//! remote close, a connect that outlives `connect_timeout` and a heartbeat
//! timeout all take the same path, which clears the heartbeat and schedules
//! a fresh connect after the reconnect delay.
//!
//! ## Heartbeat
//!
//! Once open, every `heartbeat_interval` the task sends a `ping` text frame
//! unless one is already outstanding, and arms a `pong_timeout` timer. A
//! `pong` text frame disarms it. If the timer fires first the socket is
//! presumed dead and force-closed. Heartbeat frames never reach the owner.
//!
//! ## Sending
//!
//! [`TransportHandle::send`] only transmits while the socket is open and
//! drops the frame otherwise; nothing is queued across a reconnect. Frames
//! are tagged with the connection epoch they were accepted under, so a frame
//! accepted just before a close is discarded rather than leaking onto the
//! next connection.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep, sleep_until, timeout};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use crate::realtime::command::{PING, PONG};

/// Connection state as seen by senders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Connecting,
    Open,
    Closed,
}

/// What the transport reports to its single owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A connection (first or reconnect) is open; subscriptions can be sent.
    Opened,
    /// A non-heartbeat text frame, verbatim.
    Message(String),
    /// The connection closed or a connect attempt failed.
    Closed,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport has been shut down")]
    Shutdown,
}

/// Delay before reconnect attempt `n` (0-based) is `base_delay * 2^n`,
/// capped at `max_delay`. With equal delays this is a constant retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    pub fn constant(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            max_delay: delay,
        }
    }

    pub fn exponential(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::constant(Duration::from_secs(1))
    }
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub url: String,
    pub heartbeat_interval: Duration,
    pub pong_timeout: Duration,
    /// Bound on TCP connect plus WebSocket handshake.
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl TransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            heartbeat_interval: Duration::from_secs(15),
            pong_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

struct Outbound {
    epoch: u64,
    text: String,
}

/// Cheap, clonable handle onto the transport task.
#[derive(Clone)]
pub struct TransportHandle {
    state: watch::Receiver<(TransportState, u64)>,
    outbound: mpsc::UnboundedSender<Outbound>,
    cancel: CancellationToken,
}

impl TransportHandle {
    pub fn state(&self) -> TransportState {
        self.state.borrow().0
    }

    pub fn is_open(&self) -> bool {
        self.state() == TransportState::Open
    }

    /// Transmits `text` if the socket is open; returns whether it was accepted.
    pub fn send(&self, text: impl Into<String>) -> bool {
        let (state, epoch) = *self.state.borrow();
        if state != TransportState::Open {
            tracing::trace!(?state, "dropping frame, transport not open");
            return false;
        }
        self.outbound
            .send(Outbound {
                epoch,
                text: text.into(),
            })
            .is_ok()
    }

    /// Resolves once the transport is open.
    pub async fn wait_open(&self) -> Result<(), TransportError> {
        let mut state = self.state.clone();
        state
            .wait_for(|(s, _)| *s == TransportState::Open)
            .await
            .map(|_| ())
            .map_err(|_| TransportError::Shutdown)
    }

    /// Closes the socket and stops reconnecting.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Starts the transport task. Must be called from within a tokio runtime.
///
/// The returned receiver is the only consumer of transport events.
pub fn spawn(config: TransportConfig) -> (TransportHandle, mpsc::UnboundedReceiver<TransportEvent>) {
    let (state_tx, state_rx) = watch::channel((TransportState::Connecting, 0));
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let worker = Worker {
        config,
        state: state_tx,
        events: events_tx,
        outbound: outbound_rx,
        cancel: cancel.clone(),
        epoch: 0,
    };
    tokio::spawn(worker.run());

    let handle = TransportHandle {
        state: state_rx,
        outbound: outbound_tx,
        cancel,
    };
    (handle, events_rx)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    Shutdown,
    OwnerGone,
    Remote,
    Error,
    HeartbeatTimeout,
}

struct Worker {
    config: TransportConfig,
    state: watch::Sender<(TransportState, u64)>,
    events: mpsc::UnboundedSender<TransportEvent>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    cancel: CancellationToken,
    epoch: u64,
}

impl Worker {
    fn set_state(&self, state: TransportState) {
        self.state.send_replace((state, self.epoch));
    }

    async fn run(mut self) {
        let mut attempt: u32 = 0;

        loop {
            self.set_state(TransportState::Connecting);
            tracing::debug!(url = %self.config.url, "connecting");

            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                res = timeout(self.config.connect_timeout, connect_async(self.config.url.as_str())) => res,
            };

            match connected {
                Ok(Ok((ws, _))) => {
                    attempt = 0;
                    self.epoch += 1;
                    while self.outbound.try_recv().is_ok() {}
                    self.set_state(TransportState::Open);
                    tracing::info!(url = %self.config.url, epoch = self.epoch, "transport open");
                    if self.events.send(TransportEvent::Opened).is_err() {
                        break;
                    }

                    match self.pump(ws).await {
                        CloseReason::Shutdown | CloseReason::OwnerGone => break,
                        CloseReason::HeartbeatTimeout => {
                            tracing::warn!(
                                timeout_ms = self.config.pong_timeout.as_millis() as u64,
                                "no pong before timeout, closing suspected dead connection"
                            );
                        }
                        reason => tracing::info!(?reason, "transport closed"),
                    }
                }
                Ok(Err(e)) => {
                    tracing::error!(url = %self.config.url, error = %e, "connect failed");
                }
                Err(_) => {
                    tracing::error!(
                        url = %self.config.url,
                        timeout_ms = self.config.connect_timeout.as_millis() as u64,
                        "connect timed out"
                    );
                }
            }

            self.set_state(TransportState::Closed);
            if self.events.send(TransportEvent::Closed).is_err() {
                break;
            }

            let delay = self.config.reconnect.delay_for(attempt);
            attempt = attempt.saturating_add(1);
            tracing::debug!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        self.set_state(TransportState::Closed);
        tracing::info!(url = %self.config.url, "transport stopped");
    }

    async fn pump(&mut self, ws: WebSocketStream<MaybeTlsStream<TcpStream>>) -> CloseReason {
        let (mut write, mut read) = ws.split();
        let period = self.config.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pong_deadline: Option<Instant> = None;

        let reason = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break CloseReason::Shutdown,

                _ = heartbeat.tick() => {
                    if pong_deadline.is_none() {
                        if let Err(e) = write.send(WsMessage::Text(PING.into())).await {
                            tracing::warn!(error = %e, "ping failed");
                            break CloseReason::Error;
                        }
                        pong_deadline = Some(Instant::now() + self.config.pong_timeout);
                    }
                }

                _ = sleep_until(pong_deadline.unwrap_or_else(Instant::now)), if pong_deadline.is_some() => {
                    break CloseReason::HeartbeatTimeout;
                }

                Some(out) = self.outbound.recv() => {
                    if out.epoch != self.epoch {
                        tracing::debug!("discarding frame accepted for a previous connection");
                        continue;
                    }
                    tracing::trace!(frame = %out.text, "sending");
                    if let Err(e) = write.send(WsMessage::Text(out.text.into())).await {
                        tracing::warn!(error = %e, "send failed");
                        break CloseReason::Error;
                    }
                }

                msg = read.next() => match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        if text.as_str() == PONG {
                            pong_deadline = None;
                            continue;
                        }
                        let text = text.as_str().to_owned();
                        if self.events.send(TransportEvent::Message(text)).is_err() {
                            break CloseReason::OwnerGone;
                        }
                    }
                    Some(Ok(WsMessage::Binary(bin))) => {
                        tracing::debug!(len = bin.len(), "ignoring binary frame");
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        tracing::debug!(?frame, "close frame received");
                        break CloseReason::Remote;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "read failed");
                        break CloseReason::Error;
                    }
                    None => break CloseReason::Remote,
                },
            }
        };

        // Force-close; a dead peer must not stall the reconnect.
        let _ = timeout(self.config.pong_timeout, write.close()).await;
        reason
    }
}
