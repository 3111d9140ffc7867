//! Per-source tracking

use std::time::Instant;

use chrono::{DateTime, Utc};
use vigil_protocol::DetectionEvent;

use crate::config::TelemetryConfig;
use crate::snapshot::{AgentSnapshot, AgentTrend};
use crate::window::{RollingWindow, WindowStats};

/// Rolling state for one source
#[derive(Debug, Clone)]
pub(crate) struct AgentTracker {
    /// Buckets covering both the metric window and the two trend halves
    window: RollingWindow,
    /// Events since session start
    total_responses: u64,
    /// Local receive time of the latest event
    last_seen_at: Instant,
    /// Feed timestamp of the latest event
    last_seen: DateTime<Utc>,
}

impl AgentTracker {
    pub(crate) fn new(config: &TelemetryConfig, event: &DetectionEvent, now: Instant) -> Self {
        Self {
            window: RollingWindow::new(Self::span_for(config)),
            total_responses: 0,
            last_seen_at: now,
            last_seen: event.timestamp,
        }
    }

    /// The window must reach back two trend halves as well as the metric window
    fn span_for(config: &TelemetryConfig) -> u64 {
        config
            .window_secs
            .max(config.trend_window_secs.saturating_mul(2))
    }

    pub(crate) fn apply_config(&mut self, config: &TelemetryConfig) {
        self.window.set_span(Self::span_for(config));
    }

    pub(crate) fn record(&mut self, second: u64, event: &DetectionEvent, now: Instant) {
        self.window
            .record(second, event.flagged, event.processing_time_ms, event.risk_score);
        self.total_responses += 1;
        self.last_seen_at = now;
        // Feed timestamps are only ordered per source; keep the newest
        if event.timestamp > self.last_seen {
            self.last_seen = event.timestamp;
        }
    }

    pub(crate) fn evict(&mut self, second: u64) {
        self.window.evict(second);
    }

    fn trend(&self, second: u64, config: &TelemetryConfig) -> AgentTrend {
        let half = config.trend_window_secs;
        let recent = self.window.stats_ending_at(second, half);
        let prior = if second >= half {
            self.window.stats_ending_at(second - half, half)
        } else {
            WindowStats::default()
        };

        if recent.count == 0 || prior.count == 0 {
            return AgentTrend::Stable;
        }
        AgentTrend::classify(
            prior.flagged_rate(),
            recent.flagged_rate(),
            config.trend_noise_threshold,
        )
    }

    pub(crate) fn snapshot(
        &self,
        second: u64,
        now: Instant,
        config: &TelemetryConfig,
    ) -> AgentSnapshot {
        let stats = self.window.stats_ending_at(second, config.window_secs);
        AgentSnapshot {
            responses_per_minute: per_minute(stats.count, config.window_secs),
            flagged_rate: stats.flagged_rate(),
            trend: self.trend(second, config),
            is_active: now.saturating_duration_since(self.last_seen_at)
                <= config.liveness_window(),
            total_responses: self.total_responses,
            last_seen: Some(self.last_seen),
        }
    }
}

/// Scale an event count over `window_secs` to a per-minute rate
pub(crate) fn per_minute(count: u64, window_secs: u64) -> f64 {
    count as f64 * 60.0 / window_secs.max(1) as f64
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn event(flagged: bool) -> DetectionEvent {
        DetectionEvent::new("it_bot", 0.5, flagged, 100.0, Utc::now())
    }

    fn config() -> TelemetryConfig {
        TelemetryConfig {
            window_secs: 60,
            trend_window_secs: 10,
            trend_noise_threshold: 0.1,
            liveness_window_secs: 30,
            ..Default::default()
        }
    }

    #[test]
    fn test_degrading_trend() {
        let config = config();
        let start = Instant::now();
        let mut tracker = AgentTracker::new(&config, &event(false), start);

        // Prior half (seconds 0..10): clean. Recent half (10..20): all flagged.
        for second in 0..20 {
            let now = start + Duration::from_secs(second);
            tracker.record(second, &event(second >= 10), now);
        }

        let snapshot = tracker.snapshot(19, start + Duration::from_secs(19), &config);
        assert_eq!(snapshot.trend, AgentTrend::Degrading);
        assert_eq!(snapshot.total_responses, 20);
        assert_eq!(snapshot.flagged_rate, 0.5);
        assert_eq!(snapshot.responses_per_minute, 20.0);
    }

    #[test]
    fn test_improving_trend() {
        let config = config();
        let start = Instant::now();
        let mut tracker = AgentTracker::new(&config, &event(true), start);

        for second in 0..20 {
            let now = start + Duration::from_secs(second);
            tracker.record(second, &event(second < 10), now);
        }

        let snapshot = tracker.snapshot(19, start + Duration::from_secs(19), &config);
        assert_eq!(snapshot.trend, AgentTrend::Improving);
    }

    #[test]
    fn test_stable_without_prior_history() {
        let config = config();
        let start = Instant::now();
        let mut tracker = AgentTracker::new(&config, &event(true), start);
        tracker.record(3, &event(true), start);

        let snapshot = tracker.snapshot(3, start, &config);
        assert_eq!(snapshot.trend, AgentTrend::Stable);
    }

    #[test]
    fn test_goes_inactive_after_liveness_window() {
        let config = config();
        let start = Instant::now();
        let mut tracker = AgentTracker::new(&config, &event(false), start);
        tracker.record(0, &event(false), start);

        assert!(tracker.snapshot(30, start + Duration::from_secs(30), &config).is_active);
        assert!(!tracker.snapshot(31, start + Duration::from_secs(31), &config).is_active);
    }

    #[test]
    fn test_per_minute_scaling() {
        assert_eq!(per_minute(30, 60), 30.0);
        assert_eq!(per_minute(30, 30), 60.0);
        assert_eq!(per_minute(5, 0), 300.0);
    }
}
