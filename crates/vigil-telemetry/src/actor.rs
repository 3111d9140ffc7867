//! Monitor Actor
//!
//! This module provides the async actor that owns all mutable telemetry
//! state: the raw event buffer and the rolling aggregator. Every mutation
//! (arriving events, control commands, the periodic tick) is serialized
//! through the actor's `select!` loop, so there is exactly one writer.
//!
//! # Architecture
//!
//! The actor receives commands through a channel and publishes snapshots
//! through a [`SubscriptionBus`]. This allows callers to:
//! - Feed events in arrival order over a single FIFO channel
//! - Send control commands (clear, enable/disable, settings)
//! - Observe snapshots via callbacks or a watch channel
//!
//! Settings and enable/disable changes are staged and applied on the next
//! tick. `clear` is applied immediately.
//!
//! # Example
//!
//! ```rust,ignore
//! use vigil_telemetry::actor::{run_monitor_actor, MonitorCommand};
//! use tokio::sync::mpsc;
//!
//! let (cmd_tx, cmd_rx) = mpsc::channel(256);
//! tokio::spawn(run_monitor_actor(aggregator, cmd_rx, bus));
//! ```
//!
//! Most callers should use [`crate::MonitorHandle::spawn`] instead.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};
use vigil_protocol::{to_csv, DetectionEvent};

use crate::aggregator::RollingAggregator;
use crate::bus::SubscriptionBus;
use crate::config::TelemetryConfig;
use crate::ring::{Order, RingBuffer};

/// Commands sent to the monitor actor
#[derive(Debug)]
pub enum MonitorCommand {
    /// Account for an arriving event
    Ingest {
        /// The decoded event
        event: Arc<DetectionEvent>,
    },

    /// Reset buffer and aggregates; the session restarts now
    Clear,

    /// Enable or disable ingestion (applied on the next tick)
    SetEnabled {
        /// New ingestion state
        enabled: bool,
    },

    /// Replace the settings (applied on the next tick)
    UpdateConfig {
        /// New settings
        config: TelemetryConfig,
    },

    /// Query the most recent events in the buffer
    QueryRecent {
        /// Maximum number of events
        count: usize,
        /// Result ordering
        order: Order,
        /// Channel to send back the events
        response: oneshot::Sender<Vec<Arc<DetectionEvent>>>,
    },

    /// Render the buffer as CSV, oldest first
    ExportCsv {
        /// Channel to send back the CSV text
        response: oneshot::Sender<String>,
    },

    /// Shutdown the actor
    Shutdown,
}

/// Internal state for the monitor actor
struct MonitorState {
    /// Rolling aggregation
    aggregator: RollingAggregator,
    /// Recent raw events
    buffer: RingBuffer<Arc<DetectionEvent>>,
    /// Settings waiting for the next tick
    pending_config: Option<TelemetryConfig>,
    /// Enable/disable waiting for the next tick
    pending_enabled: Option<bool>,
    /// Snapshot fan-out
    bus: SubscriptionBus,
}

/// What woke the actor loop
enum Step {
    Command(Option<MonitorCommand>),
    Tick,
}

/// Whether the loop should keep running
enum Flow {
    Continue,
    Stop,
}

pub(crate) fn now() -> std::time::Instant {
    // Tokio's clock so paused-time tests drive the windows
    Instant::now().into_std()
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

impl MonitorState {
    fn new(aggregator: RollingAggregator, bus: SubscriptionBus) -> Self {
        let buffer = RingBuffer::new(aggregator.config().buffer_capacity);
        Self {
            aggregator,
            buffer,
            pending_config: None,
            pending_enabled: None,
            bus,
        }
    }

    fn publish(&self) {
        self.bus.publish(self.aggregator.snapshot());
    }

    fn handle_command(&mut self, cmd: MonitorCommand) -> Flow {
        match cmd {
            MonitorCommand::Ingest { event } => {
                if self.aggregator.ingest(&event, now()) {
                    if let Some(evicted) = self.buffer.push(event) {
                        debug!("Buffer full, evicted event from {}", evicted.source_id);
                    }
                    self.publish();
                }
            }

            MonitorCommand::Clear => {
                self.buffer.clear();
                self.aggregator.clear(now());
                self.publish();
            }

            MonitorCommand::SetEnabled { enabled } => {
                debug!("Staged ingestion enabled={}", enabled);
                self.pending_enabled = Some(enabled);
            }

            MonitorCommand::UpdateConfig { config } => {
                debug!("Staged telemetry config update");
                self.pending_config = Some(config);
            }

            MonitorCommand::QueryRecent {
                count,
                order,
                response,
            } => {
                let _ = response.send(self.buffer.recent_n(count, order));
            }

            MonitorCommand::ExportCsv { response } => {
                let csv = to_csv(self.buffer.iter().map(|event| event.as_ref()));
                let _ = response.send(csv);
            }

            MonitorCommand::Shutdown => {
                info!("Monitor actor shutting down");
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    /// Apply staged changes, then sample the trend series
    ///
    /// Returns the new tick period if the settings changed it.
    fn on_tick(&mut self) -> Option<Duration> {
        let now = now();
        let mut new_period = None;

        if let Some(config) = self.pending_config.take() {
            let old_period = self.aggregator.config().tick_interval();
            self.aggregator.apply_config(config, now);
            self.buffer
                .set_capacity(self.aggregator.config().buffer_capacity);

            let period = self.aggregator.config().tick_interval();
            if period != old_period {
                new_period = Some(period);
            }
        }

        if let Some(enabled) = self.pending_enabled.take() {
            self.aggregator.set_enabled(enabled, now);
        }

        self.aggregator.tick(now);
        self.publish();
        new_period
    }
}

/// Run the monitor actor
///
/// This function runs until a `Shutdown` command is received or every
/// command sender is dropped. It should be spawned as a tokio task.
pub async fn run_monitor_actor(
    aggregator: RollingAggregator,
    mut cmd_rx: mpsc::Receiver<MonitorCommand>,
    bus: SubscriptionBus,
) {
    let mut state = MonitorState::new(aggregator, bus);
    let mut tick = ticker(state.aggregator.config().tick_interval());

    info!("Monitor actor started");
    state.publish();

    loop {
        let step = tokio::select! {
            cmd = cmd_rx.recv() => Step::Command(cmd),
            _ = tick.tick() => Step::Tick,
        };

        match step {
            Step::Command(None) => {
                debug!("All monitor handles dropped");
                break;
            }
            Step::Command(Some(cmd)) => {
                if let Flow::Stop = state.handle_command(cmd) {
                    break;
                }
            }
            Step::Tick => {
                if let Some(period) = state.on_tick() {
                    info!("Tick interval changed to {:?}", period);
                    tick = ticker(period);
                }
            }
        }
    }

    info!("Monitor actor stopped");
}
