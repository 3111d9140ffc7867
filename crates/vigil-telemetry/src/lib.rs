//! Vigil Telemetry Core
//!
//! This crate turns a live stream of detection events into continuously
//! updated aggregate health metrics.
//!
//! # Architecture
//!
//! - **Connection manager**: maintains the feed connection, decodes frames and
//!   forwards events in arrival order, with bounded exponential reconnect
//! - **Monitor actor**: the single writer that owns the raw event buffer and
//!   the rolling aggregator, driven by arriving events and a periodic tick
//! - **Subscription bus**: pushes each recomputed snapshot to callbacks and a
//!   coalescing `watch` channel
//!
//! Consumers hold a [`MonitorHandle`] and a [`ConnectionManager`]; there is no
//! process-wide instance.
//!
//! # Example
//!
//! ```rust,no_run
//! use vigil_telemetry::{
//!     ConnectionConfig, ConnectionManager, MonitorHandle, TelemetryConfig, WebSocketTransport,
//! };
//!
//! # async fn run() {
//! let (monitor, _actor) = MonitorHandle::spawn(TelemetryConfig::default());
//! let config = ConnectionConfig::with_url("ws://127.0.0.1:8787/feed");
//! let transport = WebSocketTransport::new(config.url.clone());
//! let (connection, _task) = ConnectionManager::spawn(transport, config, &monitor);
//!
//! let _sub = monitor.subscribe(|snapshot| {
//!     println!("health {:.0}", snapshot.system_health);
//! });
//! connection.connect();
//! # }
//! ```

pub mod actor;
pub mod aggregator;
mod agent;
pub mod bus;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod handle;
pub mod health;
pub mod reconnect;
pub mod ring;
pub mod snapshot;
pub mod transport;
pub mod window;
pub mod ws;

// Re-export actor types
pub use actor::{run_monitor_actor, MonitorCommand};
pub use handle::{EventSender, MonitorHandle};

// Re-export aggregation types
pub use aggregator::RollingAggregator;
pub use health::HealthPolicy;
pub use ring::{Order, RingBuffer};
pub use snapshot::{AgentSnapshot, AgentTrend, AggregateSnapshot};
pub use window::{RollingWindow, WindowStats};

// Re-export observer types
pub use bus::{SnapshotCallback, Subscription, SubscriptionBus};

// Re-export connection types
pub use connection::{ConnectionManager, ConnectionStats};
pub use events::FeedEvent;
pub use reconnect::{ConnectionState, ConnectionStatus, ConnectionTracker, ReconnectPolicy};
pub use transport::{FeedMessage, FeedTransport, FrameStream};
pub use ws::WebSocketTransport;

pub use config::{ConnectionConfig, TelemetryConfig};
pub use error::{TelemetryError, TransportError};
