//! Rolling-window aggregation engine
//!
//! The aggregator turns the raw event stream into an [`AggregateSnapshot`].
//! It is a plain state machine driven by two inputs, event arrival and the
//! periodic tick, with the current time passed in explicitly. The monitor
//! actor owns the only instance and serializes both inputs.
//!
//! Windows are keyed by local receive time rather than feed timestamps, which
//! are only ordered per source.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};
use vigil_protocol::{DetectionEvent, SourceId};

use crate::agent::{per_minute, AgentTracker};
use crate::config::TelemetryConfig;
use crate::ring::RingBuffer;
use crate::snapshot::AggregateSnapshot;
use crate::window::RollingWindow;

/// Rolling aggregation over the detection stream
#[derive(Debug)]
pub struct RollingAggregator {
    /// Active settings
    config: TelemetryConfig,
    /// Start of the session (reset on clear)
    session_start: Instant,
    /// Global rolling window
    window: RollingWindow,
    /// Per-source state, never pruned within a session
    agents: HashMap<SourceId, AgentTracker>,
    /// Per-tick responses per minute
    response_trend: RingBuffer<f64>,
    /// Per-tick mean risk
    risk_trend: RingBuffer<f64>,
    /// Per-tick mean latency
    latency_trend: RingBuffer<f64>,
    /// Events since session start
    total_responses: u64,
    /// Flagged events since session start
    total_flagged: u64,
    /// Whether events are being accepted
    enabled: bool,
    /// Events discarded while disabled
    dropped_while_disabled: u64,
    /// Latest published snapshot
    snapshot: Arc<AggregateSnapshot>,
}

impl RollingAggregator {
    /// Create an aggregator whose session starts at `now`
    pub fn new(config: TelemetryConfig, now: Instant) -> Self {
        let config = config.normalized();
        let snapshot = Arc::new(AggregateSnapshot::empty(
            config.health.score(0.0, 0.0),
            true,
        ));

        Self {
            window: RollingWindow::new(config.window_secs),
            agents: HashMap::new(),
            response_trend: RingBuffer::new(config.trend_length),
            risk_trend: RingBuffer::new(config.trend_length),
            latency_trend: RingBuffer::new(config.trend_length),
            total_responses: 0,
            total_flagged: 0,
            enabled: true,
            dropped_while_disabled: 0,
            session_start: now,
            snapshot,
            config,
        }
    }

    /// Get the active configuration
    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Replace the configuration and rebuild the snapshot
    pub fn apply_config(&mut self, config: TelemetryConfig, now: Instant) {
        let config = config.normalized();

        self.window.set_span(config.window_secs);
        for tracker in self.agents.values_mut() {
            tracker.apply_config(&config);
        }
        self.response_trend.set_capacity(config.trend_length);
        self.risk_trend.set_capacity(config.trend_length);
        self.latency_trend.set_capacity(config.trend_length);

        info!(
            "Applied telemetry config: window={}s, trend_length={}, liveness={}s",
            config.window_secs, config.trend_length, config.liveness_window_secs
        );
        self.config = config;
        self.refresh(now);
    }

    /// Whether events are being accepted
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable ingestion
    pub fn set_enabled(&mut self, enabled: bool, now: Instant) {
        if self.enabled != enabled {
            info!("Ingestion {}", if enabled { "enabled" } else { "disabled" });
            self.enabled = enabled;
            self.refresh(now);
        }
    }

    /// Events discarded while ingestion was disabled
    pub fn dropped_while_disabled(&self) -> u64 {
        self.dropped_while_disabled
    }

    /// Account for one event
    ///
    /// Returns false if ingestion is disabled and the event was discarded.
    pub fn ingest(&mut self, event: &DetectionEvent, now: Instant) -> bool {
        if !self.enabled {
            self.dropped_while_disabled += 1;
            debug!("Discarding event from {} (ingestion disabled)", event.source_id);
            return false;
        }

        let second = self.second(now);
        self.window.record(
            second,
            event.flagged,
            event.processing_time_ms,
            event.risk_score,
        );

        let config = &self.config;
        self.agents
            .entry(event.source_id.clone())
            .or_insert_with(|| {
                debug!("First event from source {}", event.source_id);
                AgentTracker::new(config, event, now)
            })
            .record(second, event, now);

        self.total_responses += 1;
        if event.flagged {
            self.total_flagged += 1;
        }

        self.refresh(now);
        true
    }

    /// Periodic tick: append one sample to each trend series and rebuild
    pub fn tick(&mut self, now: Instant) {
        let second = self.second(now);
        self.window.evict(second);

        let totals = self.window.totals();
        self.response_trend
            .push(per_minute(totals.count, self.config.window_secs));
        self.risk_trend.push(totals.mean_risk());
        self.latency_trend.push(totals.mean_latency_ms());

        self.refresh(now);
    }

    /// Reset all counters, series and sources; the session restarts at `now`
    pub fn clear(&mut self, now: Instant) {
        self.window.clear();
        self.agents.clear();
        self.response_trend.clear();
        self.risk_trend.clear();
        self.latency_trend.clear();
        self.total_responses = 0;
        self.total_flagged = 0;
        self.dropped_while_disabled = 0;
        self.session_start = now;

        info!("Telemetry cleared");
        self.refresh(now);
    }

    /// Latest snapshot
    pub fn snapshot(&self) -> Arc<AggregateSnapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Seconds since session start
    fn second(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.session_start).as_secs()
    }

    /// Evict stale buckets and rebuild the snapshot
    fn refresh(&mut self, now: Instant) {
        let second = self.second(now);
        self.window.evict(second);
        for tracker in self.agents.values_mut() {
            tracker.evict(second);
        }

        let config = &self.config;
        let totals = self.window.totals();
        let flagged_rate = totals.flagged_rate();
        let average_latency_ms = totals.mean_latency_ms();

        let agent_stats = if config.show_agent_stats {
            self.agents
                .iter()
                .map(|(id, tracker)| (id.clone(), tracker.snapshot(second, now, config)))
                .collect()
        } else {
            BTreeMap::new()
        };

        let (response_trend, risk_trend, latency_trend) = if config.show_trends {
            (
                self.response_trend.to_vec(),
                self.risk_trend.to_vec(),
                self.latency_trend.to_vec(),
            )
        } else {
            (Vec::new(), Vec::new(), Vec::new())
        };

        self.snapshot = Arc::new(AggregateSnapshot {
            responses_per_minute: per_minute(totals.count, config.window_secs),
            flagged_rate,
            average_latency_ms,
            average_risk_score: totals.mean_risk(),
            system_health: config.health.score(flagged_rate, average_latency_ms),
            total_responses: self.total_responses,
            total_flagged: self.total_flagged,
            session_duration_sec: second,
            response_trend,
            risk_trend,
            latency_trend,
            agent_stats,
            enabled: self.enabled,
        });
    }
}
