//! Connection Manager
//!
//! Owns the feed connection lifecycle: handshake with timeout, frame decoding,
//! forwarding events to the monitor in arrival order, and bounded automatic
//! reconnect with exponential backoff.
//!
//! # Architecture
//!
//! A single task runs a phase machine:
//!
//! - **Idle**: waiting for `connect()`
//! - **Attempt**: handshake in flight, bounded by the handshake timeout
//! - **Backoff**: waiting before the next automatic attempt
//! - **Streaming**: reading frames until close, error or `disconnect()`
//!
//! Every phase also listens for commands, so `disconnect()` takes effect
//! immediately from any state. Status is published on a `watch` channel and
//! transitions are also broadcast as [`FeedEvent`]s.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use vigil_protocol::{decode_frame, decode_frame_bytes, DecodeError, Frame};

use crate::config::ConnectionConfig;
use crate::error::TransportError;
use crate::events::FeedEvent;
use crate::handle::{EventSender, MonitorHandle};
use crate::reconnect::{ConnectionStatus, ConnectionTracker, ReconnectPolicy};
use crate::transport::{FeedMessage, FeedTransport, FrameStream};

/// Capacity of the feed event broadcast
const FEED_EVENT_CAPACITY: usize = 256;

/// Frame counters since the manager was spawned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    /// Messages read from the transport
    pub frames_received: u64,
    /// Events handed to the monitor
    pub events_forwarded: u64,
    /// Frames rejected by the decoder
    pub frames_dropped: u64,
    /// Heartbeat frames seen
    pub heartbeats: u64,
    /// Successful handshakes
    pub connections: u64,
}

#[derive(Debug)]
enum ConnectionCommand {
    Connect,
    Disconnect,
    Shutdown,
}

/// Handle to the connection task
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    cmd_tx: mpsc::UnboundedSender<ConnectionCommand>,
    status_rx: watch::Receiver<ConnectionStatus>,
    stats_rx: watch::Receiver<ConnectionStats>,
    events_tx: broadcast::Sender<FeedEvent>,
}

impl ConnectionManager {
    /// Spawn the connection task in the `Disconnected` state
    pub fn spawn<T>(
        transport: T,
        config: ConnectionConfig,
        monitor: &MonitorHandle,
    ) -> (Self, JoinHandle<()>)
    where
        T: FeedTransport + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());
        let (stats_tx, stats_rx) = watch::channel(ConnectionStats::default());
        let (events_tx, _) = broadcast::channel(FEED_EVENT_CAPACITY);

        info!("Spawning connection manager for {}", transport.describe());
        let task = ConnectionTask {
            transport: Arc::new(transport),
            tracker: ConnectionTracker::new(ReconnectPolicy::from(&config)),
            handshake_timeout: config.handshake_timeout(),
            sink: monitor.ingest_sender(),
            cmd_rx,
            status_tx,
            stats: ConnectionStats::default(),
            stats_tx,
            events_tx: events_tx.clone(),
        };
        let handle = tokio::spawn(task.run());

        (
            Self {
                cmd_tx,
                status_rx,
                stats_rx,
                events_tx,
            },
            handle,
        )
    }

    /// Start connecting; progress is reported through status changes
    ///
    /// Resets the automatic retry budget.
    pub fn connect(&self) {
        self.command(ConnectionCommand::Connect);
    }

    /// Close the connection and stop automatic retries
    ///
    /// Always succeeds from the caller's point of view; aggregated telemetry
    /// is left untouched.
    pub fn disconnect(&self) {
        self.command(ConnectionCommand::Disconnect);
    }

    /// Stop the connection task
    pub fn shutdown(&self) {
        self.command(ConnectionCommand::Shutdown);
    }

    /// Current status
    pub fn status(&self) -> ConnectionStatus {
        self.status_rx.borrow().clone()
    }

    /// Receiver notified on every status change
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Subscribe to feed activity
    pub fn subscribe_events(&self) -> broadcast::Receiver<FeedEvent> {
        self.events_tx.subscribe()
    }

    /// Frame counters
    pub fn stats(&self) -> ConnectionStats {
        *self.stats_rx.borrow()
    }

    fn command(&self, cmd: ConnectionCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            debug!("Connection task already stopped");
        }
    }
}

/// Where the connection task is in its lifecycle
enum Phase {
    Idle,
    Attempt,
    Backoff(Duration),
    Streaming(Box<dyn FrameStream>),
}

/// Result of a caller command
enum Transition {
    Go(Phase),
    Stop,
}

enum AttemptStep {
    Command(Option<ConnectionCommand>),
    Done(Result<Result<Box<dyn FrameStream>, TransportError>, tokio::time::error::Elapsed>),
}

enum BackoffStep {
    Command(Option<ConnectionCommand>),
    Elapsed,
}

enum StreamStep {
    Command(Option<ConnectionCommand>),
    Message(Option<Result<FeedMessage, TransportError>>),
}

struct ConnectionTask {
    transport: Arc<dyn FeedTransport>,
    tracker: ConnectionTracker,
    handshake_timeout: Duration,
    sink: EventSender,
    cmd_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
    status_tx: watch::Sender<ConnectionStatus>,
    stats: ConnectionStats,
    stats_tx: watch::Sender<ConnectionStats>,
    events_tx: broadcast::Sender<FeedEvent>,
}

impl ConnectionTask {
    async fn run(mut self) {
        let mut phase = Phase::Idle;

        loop {
            phase = match phase {
                Phase::Idle => {
                    let cmd = self.cmd_rx.recv().await;
                    match self.on_command(cmd) {
                        Transition::Go(next) => next,
                        Transition::Stop => break,
                    }
                }

                Phase::Attempt => {
                    let step = tokio::select! {
                        cmd = self.cmd_rx.recv() => AttemptStep::Command(cmd),
                        result = timeout(self.handshake_timeout, self.transport.connect()) => {
                            AttemptStep::Done(result)
                        }
                    };

                    match step {
                        AttemptStep::Command(cmd) => match self.on_command(cmd) {
                            Transition::Go(next) => next,
                            Transition::Stop => break,
                        },
                        AttemptStep::Done(Ok(Ok(stream))) => {
                            self.tracker.handshake_succeeded();
                            self.stats.connections += 1;
                            self.publish_stats();
                            self.publish_status();
                            Phase::Streaming(stream)
                        }
                        AttemptStep::Done(Ok(Err(e))) => {
                            let retry = self.tracker.handshake_failed(e.to_string());
                            self.after_failure(retry)
                        }
                        AttemptStep::Done(Err(_)) => {
                            let ms = self.handshake_timeout.as_millis() as u64;
                            let retry = self
                                .tracker
                                .handshake_failed(TransportError::HandshakeTimeout(ms).to_string());
                            self.after_failure(retry)
                        }
                    }
                }

                Phase::Backoff(delay) => {
                    let step = tokio::select! {
                        cmd = self.cmd_rx.recv() => BackoffStep::Command(cmd),
                        _ = sleep(delay) => BackoffStep::Elapsed,
                    };

                    match step {
                        BackoffStep::Command(cmd) => match self.on_command(cmd) {
                            Transition::Go(next) => next,
                            Transition::Stop => break,
                        },
                        BackoffStep::Elapsed => {
                            self.tracker.begin_retry();
                            self.publish_status();
                            Phase::Attempt
                        }
                    }
                }

                Phase::Streaming(mut stream) => {
                    let step = tokio::select! {
                        cmd = self.cmd_rx.recv() => StreamStep::Command(cmd),
                        message = stream.next_message() => StreamStep::Message(message),
                    };

                    match step {
                        StreamStep::Command(Some(ConnectionCommand::Connect)) => {
                            debug!("Already connected");
                            Phase::Streaming(stream)
                        }
                        StreamStep::Command(cmd) => {
                            close_best_effort(stream.as_mut()).await;
                            match self.on_command(cmd) {
                                Transition::Go(next) => next,
                                Transition::Stop => break,
                            }
                        }
                        StreamStep::Message(Some(Ok(message))) => {
                            if self.handle_message(message).await {
                                Phase::Streaming(stream)
                            } else {
                                close_best_effort(stream.as_mut()).await;
                                self.tracker.disconnect();
                                self.publish_status();
                                break;
                            }
                        }
                        StreamStep::Message(None) => {
                            self.tracker.closed_cleanly();
                            self.publish_status();
                            Phase::Idle
                        }
                        StreamStep::Message(Some(Err(e))) => {
                            close_best_effort(stream.as_mut()).await;
                            let retry = self.tracker.closed_abnormally(e.to_string());
                            self.after_failure(retry)
                        }
                    }
                }
            };
        }

        info!("Connection task stopped");
    }

    /// Apply a caller command
    fn on_command(&mut self, cmd: Option<ConnectionCommand>) -> Transition {
        match cmd {
            Some(ConnectionCommand::Connect) => {
                info!("Connecting to {}", self.transport.describe());
                self.tracker.connect();
                self.publish_status();
                Transition::Go(Phase::Attempt)
            }
            Some(ConnectionCommand::Disconnect) => {
                info!("Disconnecting");
                self.tracker.disconnect();
                self.publish_status();
                Transition::Go(Phase::Idle)
            }
            Some(ConnectionCommand::Shutdown) | None => {
                self.tracker.disconnect();
                self.publish_status();
                Transition::Stop
            }
        }
    }

    /// Pick the next phase after a failed handshake or abnormal close
    fn after_failure(&mut self, retry: Option<Duration>) -> Phase {
        self.publish_status();
        match retry {
            Some(delay) => {
                debug!("Retrying in {:?}", delay);
                Phase::Backoff(delay)
            }
            None => Phase::Idle,
        }
    }

    /// Decode and forward one message
    ///
    /// Returns false if the monitor has gone away.
    async fn handle_message(&mut self, message: FeedMessage) -> bool {
        self.stats.frames_received += 1;

        let decoded = match &message {
            FeedMessage::Text(text) => decode_frame(text),
            FeedMessage::Binary(data) => decode_frame_bytes(data),
        };

        let keep_going = match decoded.map(Frame::into_event) {
            Ok(Some(event)) => {
                debug!(
                    "Event from {} (risk={}, flagged={})",
                    event.source_id, event.risk_score, event.flagged
                );
                match self.sink.send(event).await {
                    Ok(()) => {
                        self.stats.events_forwarded += 1;
                        true
                    }
                    Err(e) => {
                        warn!("Dropping connection: {}", e);
                        false
                    }
                }
            }
            Ok(None) => {
                self.stats.heartbeats += 1;
                let _ = self.events_tx.send(FeedEvent::Heartbeat);
                true
            }
            Err(error) => {
                self.reject(error);
                true
            }
        };

        self.publish_stats();
        keep_going
    }

    fn reject(&mut self, error: DecodeError) {
        warn!("Dropping malformed frame: {}", error);
        self.stats.frames_dropped += 1;
        let _ = self.events_tx.send(FeedEvent::FrameRejected { error });
    }

    fn publish_status(&self) {
        let status = self.tracker.status().clone();
        self.status_tx.send_replace(status.clone());
        // No receivers is fine
        let _ = self.events_tx.send(FeedEvent::StateChanged(status));
    }

    fn publish_stats(&self) {
        self.stats_tx.send_replace(self.stats);
    }
}

async fn close_best_effort(stream: &mut dyn FrameStream) {
    if let Err(e) = stream.close().await {
        debug!("Ignoring close failure: {}", e);
    }
}
