//! Configuration for the monitor and the feed connection

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::health::HealthPolicy;

/// Largest accepted command channel depth
const MAX_CHANNEL_CAPACITY: usize = 1 << 16;

/// Aggregation and buffering settings
///
/// Changes submitted through the monitor handle take effect on the next tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Rolling window for rate and mean metrics (seconds)
    pub window_secs: u64,
    /// Interval between trend samples (ms)
    pub tick_interval_ms: u64,
    /// Number of samples kept per trend series
    pub trend_length: usize,
    /// Width of each half of the per-agent trend comparison (seconds)
    pub trend_window_secs: u64,
    /// Minimum flagged-rate change classified as improving/degrading
    pub trend_noise_threshold: f64,
    /// A source with no events for this long is inactive (seconds)
    pub liveness_window_secs: u64,
    /// Number of raw events kept for recent-activity views
    pub buffer_capacity: usize,
    /// Populate per-agent stats in published snapshots
    pub show_agent_stats: bool,
    /// Populate trend series in published snapshots
    pub show_trends: bool,
    /// Health score weighting
    pub health: HealthPolicy,
    /// Monitor command channel depth
    pub channel_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            tick_interval_ms: 2000,
            trend_length: 30,
            trend_window_secs: 30,
            trend_noise_threshold: 0.05,
            liveness_window_secs: 120,
            buffer_capacity: 100,
            show_agent_stats: true,
            show_trends: true,
            health: HealthPolicy::default(),
            channel_capacity: 256,
        }
    }
}

impl TelemetryConfig {
    /// Rolling window as a duration
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs.max(1))
    }

    /// Tick interval as a duration
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Liveness window as a duration
    pub fn liveness_window(&self) -> Duration {
        Duration::from_secs(self.liveness_window_secs)
    }

    /// Copy with zero-valued sizes raised to their minimums and the channel
    /// depth capped
    pub fn normalized(&self) -> Self {
        Self {
            window_secs: self.window_secs.max(1),
            tick_interval_ms: self.tick_interval_ms.max(1),
            trend_length: self.trend_length.max(1),
            trend_window_secs: self.trend_window_secs.max(1),
            trend_noise_threshold: if self.trend_noise_threshold.is_finite() {
                self.trend_noise_threshold.max(0.0)
            } else {
                0.0
            },
            buffer_capacity: self.buffer_capacity.max(1),
            channel_capacity: self.channel_capacity.clamp(1, MAX_CHANNEL_CAPACITY),
            ..self.clone()
        }
    }
}

/// Feed connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Feed endpoint (ws:// or wss://)
    pub url: String,
    /// Handshake timeout (ms)
    pub handshake_timeout_ms: u64,
    /// Automatic reconnect attempts before giving up
    pub max_reconnect_attempts: u32,
    /// Delay before the first automatic reconnect (ms)
    pub initial_backoff_ms: u64,
    /// Upper bound on the reconnect delay (ms)
    pub max_backoff_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8787/feed".to_string(),
            handshake_timeout_ms: 10_000,
            max_reconnect_attempts: 5,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
        }
    }
}

impl ConnectionConfig {
    /// Create a config for the given endpoint with default timings
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Handshake timeout as a duration
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}
