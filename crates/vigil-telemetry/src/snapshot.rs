//! Snapshot types handed to observers
//!
//! Snapshots are rebuilt by the aggregator and published behind `Arc`, so
//! observers only ever see immutable values.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use vigil_protocol::SourceId;

/// Direction of a source's flagged rate over the recent trend window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentTrend {
    /// Flagged rate dropped by more than the noise threshold
    Improving,
    /// No change beyond the noise threshold
    #[default]
    Stable,
    /// Flagged rate rose by more than the noise threshold
    Degrading,
}

impl AgentTrend {
    /// Classify a change in flagged rate
    pub fn classify(prior_rate: f64, recent_rate: f64, noise_threshold: f64) -> Self {
        let delta = recent_rate - prior_rate;
        if delta < -noise_threshold {
            AgentTrend::Improving
        } else if delta > noise_threshold {
            AgentTrend::Degrading
        } else {
            AgentTrend::Stable
        }
    }

    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Stable => "stable",
            Self::Degrading => "degrading",
        }
    }
}

/// Per-source breakdown
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSnapshot {
    /// Responses per minute over the rolling window
    pub responses_per_minute: f64,
    /// Flagged fraction over the rolling window
    pub flagged_rate: f64,
    /// Recent flagged-rate direction
    pub trend: AgentTrend,
    /// Whether the source emitted within the liveness window
    pub is_active: bool,
    /// Events from this source since session start
    pub total_responses: u64,
    /// Feed timestamp of the latest event from this source
    pub last_seen: Option<DateTime<Utc>>,
}

/// Aggregated view of the detection stream
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSnapshot {
    /// Events per minute over the rolling window
    pub responses_per_minute: f64,
    /// Flagged fraction over the rolling window, in [0, 1]
    pub flagged_rate: f64,
    /// Mean processing time over the rolling window
    pub average_latency_ms: f64,
    /// Mean risk score over the rolling window
    pub average_risk_score: f64,
    /// Composite health score, in [0, 100]
    pub system_health: f64,
    /// Events since session start or last clear
    pub total_responses: u64,
    /// Flagged events since session start or last clear
    pub total_flagged: u64,
    /// Seconds since session start or last clear
    pub session_duration_sec: u64,
    /// Per-tick responses per minute
    pub response_trend: Vec<f64>,
    /// Per-tick mean risk score
    pub risk_trend: Vec<f64>,
    /// Per-tick mean latency
    pub latency_trend: Vec<f64>,
    /// Per-source breakdown, ordered by source id
    pub agent_stats: BTreeMap<SourceId, AgentSnapshot>,
    /// Whether ingestion is enabled
    pub enabled: bool,
}

impl AggregateSnapshot {
    /// Snapshot with no data
    pub fn empty(system_health: f64, enabled: bool) -> Self {
        Self {
            responses_per_minute: 0.0,
            flagged_rate: 0.0,
            average_latency_ms: 0.0,
            average_risk_score: 0.0,
            system_health,
            total_responses: 0,
            total_flagged: 0,
            session_duration_sec: 0,
            response_trend: Vec::new(),
            risk_trend: Vec::new(),
            latency_trend: Vec::new(),
            agent_stats: BTreeMap::new(),
            enabled,
        }
    }

    /// Number of sources currently active
    pub fn active_agents(&self) -> usize {
        self.agent_stats.values().filter(|a| a.is_active).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trend_classification() {
        assert_eq!(AgentTrend::classify(0.5, 0.2, 0.05), AgentTrend::Improving);
        assert_eq!(AgentTrend::classify(0.2, 0.5, 0.05), AgentTrend::Degrading);
        assert_eq!(AgentTrend::classify(0.30, 0.33, 0.05), AgentTrend::Stable);
        // Exactly at the threshold is noise
        assert_eq!(AgentTrend::classify(0.5, 0.75, 0.25), AgentTrend::Stable);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let mut snapshot = AggregateSnapshot::empty(100.0, true);
        snapshot.agent_stats.insert(
            SourceId::from("it_bot"),
            AgentSnapshot {
                responses_per_minute: 3.0,
                flagged_rate: 0.5,
                trend: AgentTrend::Degrading,
                is_active: true,
                total_responses: 3,
                last_seen: None,
            },
        );
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["systemHealth"], 100.0);
        assert_eq!(json["agentStats"]["it_bot"]["trend"], "degrading");
        assert_eq!(json["agentStats"]["it_bot"]["isActive"], true);
        assert_eq!(snapshot.active_agents(), 1);
    }
}
