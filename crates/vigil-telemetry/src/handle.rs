//! Owned handle to a running monitor
//!
//! A [`MonitorHandle`] is the control surface and read side of the telemetry
//! core. It is cheap to clone; every clone talks to the same actor.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::info;
use vigil_protocol::DetectionEvent;

use crate::actor::{self, run_monitor_actor, MonitorCommand};
use crate::aggregator::RollingAggregator;
use crate::bus::{Subscription, SubscriptionBus};
use crate::config::TelemetryConfig;
use crate::error::TelemetryError;
use crate::ring::Order;
use crate::snapshot::AggregateSnapshot;

/// Handle to a spawned monitor actor
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    cmd_tx: mpsc::Sender<MonitorCommand>,
    bus: SubscriptionBus,
}

impl MonitorHandle {
    /// Spawn a monitor actor on the current tokio runtime
    pub fn spawn(config: TelemetryConfig) -> (Self, JoinHandle<()>) {
        let aggregator = RollingAggregator::new(config, actor::now());
        let bus = SubscriptionBus::new(aggregator.snapshot());
        let (cmd_tx, cmd_rx) = mpsc::channel(aggregator.config().channel_capacity);

        info!(
            "Spawning monitor (window={}s, buffer={})",
            aggregator.config().window_secs,
            aggregator.config().buffer_capacity
        );
        let task = tokio::spawn(run_monitor_actor(aggregator, cmd_rx, bus.clone()));

        (Self { cmd_tx, bus }, task)
    }

    /// Sender for feeding events to the actor in arrival order
    pub fn ingest_sender(&self) -> EventSender {
        EventSender {
            cmd_tx: self.cmd_tx.clone(),
        }
    }

    /// Feed one event
    pub async fn ingest(&self, event: DetectionEvent) -> Result<(), TelemetryError> {
        self.send(MonitorCommand::Ingest {
            event: Arc::new(event),
        })
        .await
    }

    /// Reset the buffer and all aggregates
    pub async fn clear(&self) -> Result<(), TelemetryError> {
        self.send(MonitorCommand::Clear).await
    }

    /// Enable or disable ingestion from the next tick
    pub async fn set_enabled(&self, enabled: bool) -> Result<(), TelemetryError> {
        self.send(MonitorCommand::SetEnabled { enabled }).await
    }

    /// Replace the settings from the next tick
    pub async fn update_config(&self, config: TelemetryConfig) -> Result<(), TelemetryError> {
        self.send(MonitorCommand::UpdateConfig { config }).await
    }

    /// Up to `count` of the most recent events
    pub async fn recent(
        &self,
        count: usize,
        order: Order,
    ) -> Result<Vec<Arc<DetectionEvent>>, TelemetryError> {
        let (response, rx) = oneshot::channel();
        self.send(MonitorCommand::QueryRecent {
            count,
            order,
            response,
        })
        .await?;
        rx.await.map_err(|_| TelemetryError::ActorGone)
    }

    /// The buffered events as CSV, oldest first
    pub async fn export_csv(&self) -> Result<String, TelemetryError> {
        let (response, rx) = oneshot::channel();
        self.send(MonitorCommand::ExportCsv { response }).await?;
        rx.await.map_err(|_| TelemetryError::ActorGone)
    }

    /// Stop the actor
    pub async fn shutdown(&self) -> Result<(), TelemetryError> {
        self.send(MonitorCommand::Shutdown).await
    }

    /// Latest published snapshot
    pub fn get_snapshot(&self) -> Arc<AggregateSnapshot> {
        self.bus.latest()
    }

    /// Register a callback invoked with every published snapshot
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Arc<AggregateSnapshot>) + Send + Sync + 'static,
    {
        self.bus.subscribe(callback)
    }

    /// Coalescing receiver of published snapshots
    pub fn watch(&self) -> watch::Receiver<Arc<AggregateSnapshot>> {
        self.bus.watch()
    }

    async fn send(&self, cmd: MonitorCommand) -> Result<(), TelemetryError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| TelemetryError::ActorGone)
    }
}

/// FIFO event sender used by the connection manager
#[derive(Debug, Clone)]
pub struct EventSender {
    cmd_tx: mpsc::Sender<MonitorCommand>,
}

impl EventSender {
    /// Forward one event, waiting for channel capacity
    pub async fn send(&self, event: DetectionEvent) -> Result<(), TelemetryError> {
        self.cmd_tx
            .send(MonitorCommand::Ingest {
                event: Arc::new(event),
            })
            .await
            .map_err(|_| TelemetryError::ActorGone)
    }
}
