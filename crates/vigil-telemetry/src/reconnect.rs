//! Connection state machine and bounded reconnect policy
//!
//! [`ConnectionTracker`] is the pure half of the connection manager: it owns
//! the visible status and decides whether, and after how long, an automatic
//! retry happens. The async task in [`crate::connection`] drives it.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::ConnectionConfig;

/// Lifecycle state of the feed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not connected and not trying to
    #[default]
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Streaming frames
    Connected,
    /// Last attempt failed; a retry may be scheduled
    Error,
}

impl ConnectionState {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Observable connection status
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    /// Current lifecycle state
    pub state: ConnectionState,
    /// Description of the last failure, cleared on a successful handshake
    pub error: Option<String>,
    /// Automatic retries since the last successful handshake or manual connect
    pub reconnect_attempts: u32,
}

/// Exponential backoff with a hard attempt cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Automatic attempts allowed before giving up
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound on any delay
    pub max_backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ConnectionConfig::default())
    }
}

impl From<&ConnectionConfig> for ReconnectPolicy {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            max_attempts: config.max_reconnect_attempts,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before automatic attempt number `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

/// Connection state machine
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    policy: ReconnectPolicy,
    status: ConnectionStatus,
}

impl ConnectionTracker {
    /// Create a tracker in the `Disconnected` state
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            status: ConnectionStatus::default(),
        }
    }

    /// Current status
    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    /// Reconnect policy in effect
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Caller-initiated connect; re-arms the retry budget
    pub fn connect(&mut self) {
        self.status.state = ConnectionState::Connecting;
        self.status.reconnect_attempts = 0;
        self.status.error = None;
    }

    /// Handshake completed
    pub fn handshake_succeeded(&mut self) {
        info!("Feed connected");
        self.status.state = ConnectionState::Connected;
        self.status.reconnect_attempts = 0;
        self.status.error = None;
    }

    /// Handshake failed or timed out
    ///
    /// Returns the delay before the next automatic attempt, or `None` once the
    /// retry budget is exhausted.
    pub fn handshake_failed(&mut self, message: impl Into<String>) -> Option<Duration> {
        self.fail(message.into())
    }

    /// Remote closed the stream cleanly
    pub fn closed_cleanly(&mut self) {
        info!("Feed closed by remote");
        self.status.state = ConnectionState::Disconnected;
    }

    /// Stream ended with an error
    ///
    /// Same retry semantics as [`Self::handshake_failed`].
    pub fn closed_abnormally(&mut self, message: impl Into<String>) -> Option<Duration> {
        self.fail(message.into())
    }

    /// Backoff elapsed; begin the next automatic attempt
    pub fn begin_retry(&mut self) {
        self.status.reconnect_attempts += 1;
        self.status.state = ConnectionState::Connecting;
        info!(
            "Reconnect attempt {}/{}",
            self.status.reconnect_attempts, self.policy.max_attempts
        );
    }

    /// Caller-initiated disconnect; stops any automatic retry
    pub fn disconnect(&mut self) {
        self.status.state = ConnectionState::Disconnected;
    }

    fn fail(&mut self, message: String) -> Option<Duration> {
        warn!("Feed connection error: {}", message);
        self.status.state = ConnectionState::Error;
        self.status.error = Some(message);

        if self.status.reconnect_attempts >= self.policy.max_attempts {
            warn!(
                "Giving up after {} reconnect attempts",
                self.status.reconnect_attempts
            );
            return None;
        }
        Some(self.policy.backoff_for(self.status.reconnect_attempts + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = policy();
        assert_eq!(policy.backoff_for(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(5), Duration::from_secs(16));
        assert_eq!(policy.backoff_for(6), Duration::from_secs(30));
        assert_eq!(policy.backoff_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_six_failures_make_five_attempts() {
        let mut tracker = ConnectionTracker::new(policy());
        tracker.connect();

        let mut attempts = 0;
        while tracker.handshake_failed("refused").is_some() {
            tracker.begin_retry();
            attempts += 1;
        }

        assert_eq!(attempts, 5);
        assert_eq!(tracker.status().state, ConnectionState::Error);
        assert_eq!(tracker.status().reconnect_attempts, 5);
        assert_eq!(tracker.status().error.as_deref(), Some("refused"));
    }

    #[test]
    fn test_disconnect_mid_retry_then_manual_connect() {
        let mut tracker = ConnectionTracker::new(policy());
        tracker.connect();
        for _ in 0..3 {
            assert!(tracker.handshake_failed("refused").is_some());
            tracker.begin_retry();
        }
        assert_eq!(tracker.status().reconnect_attempts, 3);

        tracker.disconnect();
        assert_eq!(tracker.status().state, ConnectionState::Disconnected);
        assert_eq!(tracker.status().reconnect_attempts, 3);

        tracker.connect();
        tracker.handshake_succeeded();
        assert_eq!(tracker.status().state, ConnectionState::Connected);
        assert_eq!(tracker.status().reconnect_attempts, 0);
        assert_eq!(tracker.status().error, None);
    }

    #[test]
    fn test_manual_connect_rearms_after_cap() {
        let mut tracker = ConnectionTracker::new(policy());
        tracker.connect();
        while tracker.handshake_failed("refused").is_some() {
            tracker.begin_retry();
        }

        tracker.connect();
        assert_eq!(tracker.status().reconnect_attempts, 0);
        assert_eq!(
            tracker.handshake_failed("refused"),
            Some(Duration::from_secs(1))
        );
    }

    #[test]
    fn test_abnormal_close_retries_clean_close_does_not() {
        let mut tracker = ConnectionTracker::new(policy());
        tracker.connect();
        tracker.handshake_succeeded();
        assert!(tracker.closed_abnormally("code 1011").is_some());
        assert_eq!(tracker.status().state, ConnectionState::Error);

        tracker.begin_retry();
        tracker.handshake_succeeded();
        tracker.closed_cleanly();
        assert_eq!(tracker.status().state, ConnectionState::Disconnected);
    }
}
