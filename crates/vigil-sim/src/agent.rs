//! Simulated AI agent
//!
//! Produces a stream of plausible detection events for one source. With a
//! fixed seed the sequence is reproducible.

use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use vigil_protocol::DetectionEvent;

use crate::error::SimError;

/// Canned prompt/response pairs; the third element is the span flagged when the
/// detector fires
const EXCHANGES: &[(&str, &str, &str)] = &[
    (
        "How do I reset my VPN password?",
        "Open the self-service portal and choose Reset. Your new password works within 5 minutes.",
        "works within 5 minutes",
    ),
    (
        "What is the parental leave policy?",
        "Employees receive 16 weeks of paid leave, extendable at manager discretion.",
        "extendable at manager discretion",
    ),
    (
        "Can I expense a home office chair?",
        "Yes, up to $400 per year with a receipt. Approval is automatic.",
        "Approval is automatic",
    ),
    (
        "Why is the build server slow today?",
        "The build cluster is under scheduled maintenance until 14:00 UTC.",
        "until 14:00 UTC",
    ),
    (
        "Summarize the Q3 revenue report",
        "Revenue grew 12% quarter over quarter, driven by enterprise renewals.",
        "grew 12% quarter over quarter",
    ),
];

/// Mitigations suggested for flagged responses
const MITIGATIONS: &[&str] = &[
    "Remove the unsupported claim",
    "Cite the policy document",
    "Defer to a human agent",
];

/// Configuration for one simulated agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedAgentConfig {
    /// Source id stamped on every event
    pub source_id: String,
    /// Probability that an event is flagged, in [0, 1]
    pub flag_probability: f64,
    /// Smallest processing time (ms)
    pub min_latency_ms: f64,
    /// Largest processing time (ms)
    pub max_latency_ms: f64,
    /// Seed for reproducible output; random if absent
    pub seed: Option<u64>,
}

impl Default for SimulatedAgentConfig {
    fn default() -> Self {
        Self {
            source_id: "it_bot".to_string(),
            flag_probability: 0.2,
            min_latency_ms: 80.0,
            max_latency_ms: 600.0,
            seed: None,
        }
    }
}

impl SimulatedAgentConfig {
    /// Config for `source_id` with default behavior
    pub fn named(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            ..Default::default()
        }
    }
}

/// The agents used when no fleet is configured
pub fn default_fleet() -> Vec<SimulatedAgentConfig> {
    vec![
        SimulatedAgentConfig {
            source_id: "it_bot".to_string(),
            flag_probability: 0.15,
            min_latency_ms: 60.0,
            max_latency_ms: 400.0,
            seed: None,
        },
        SimulatedAgentConfig {
            source_id: "hr_bot".to_string(),
            flag_probability: 0.3,
            min_latency_ms: 120.0,
            max_latency_ms: 900.0,
            seed: None,
        },
        SimulatedAgentConfig {
            source_id: "finance_bot".to_string(),
            flag_probability: 0.05,
            min_latency_ms: 200.0,
            max_latency_ms: 2500.0,
            seed: None,
        },
    ]
}

/// A simulated agent emitting detection events
#[derive(Debug)]
pub struct SimulatedAgent {
    config: SimulatedAgentConfig,
    rng: StdRng,
    emitted: u64,
}

impl SimulatedAgent {
    /// Create an agent, validating its settings
    pub fn new(config: SimulatedAgentConfig) -> Result<Self, SimError> {
        if config.source_id.trim().is_empty() {
            return Err(SimError::InvalidConfig("source id is empty".into()));
        }
        if !(0.0..=1.0).contains(&config.flag_probability) {
            return Err(SimError::InvalidConfig(format!(
                "flag probability {} outside [0, 1]",
                config.flag_probability
            )));
        }
        if !(config.min_latency_ms >= 0.0 && config.min_latency_ms <= config.max_latency_ms)
            || !config.max_latency_ms.is_finite()
        {
            return Err(SimError::InvalidConfig(format!(
                "latency range {}..={} is invalid",
                config.min_latency_ms, config.max_latency_ms
            )));
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            config,
            rng,
            emitted: 0,
        })
    }

    /// Source id of this agent
    pub fn source_id(&self) -> &str {
        &self.config.source_id
    }

    /// Number of events produced so far
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Produce the next event, stamped with `timestamp`
    pub fn next_event(&mut self, timestamp: DateTime<Utc>) -> DetectionEvent {
        let flagged = self.rng.gen_bool(self.config.flag_probability);
        let risk_range: RangeInclusive<f64> = if flagged { 0.6..=1.0 } else { 0.0..=0.45 };
        let risk_score = self.rng.gen_range(risk_range);
        let latency = self
            .rng
            .gen_range(self.config.min_latency_ms..=self.config.max_latency_ms);

        let (query, output, span) = EXCHANGES[self.rng.gen_range(0..EXCHANGES.len())];
        let mut event = DetectionEvent::new(
            self.config.source_id.as_str(),
            risk_score,
            flagged,
            latency.round(),
            timestamp,
        )
        .with_text(query, output);

        if flagged {
            event = event.with_segments(vec![span.to_string()]);
            if let Some(mitigation) = MITIGATIONS.choose(&mut self.rng) {
                event = event.with_mitigation(*mitigation);
            }
        }

        self.emitted += 1;
        event
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn ts() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    fn seeded(flag_probability: f64) -> SimulatedAgent {
        SimulatedAgent::new(SimulatedAgentConfig {
            flag_probability,
            seed: Some(7),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_events_are_valid() {
        let mut agent = seeded(0.5);
        for _ in 0..200 {
            let event = agent.next_event(ts());
            event.validate().unwrap();
            assert_eq!(event.source_id.as_str(), "it_bot");
            assert!(event.processing_time_ms >= 80.0 && event.processing_time_ms <= 600.0);
            assert_eq!(event.flagged, !event.flagged_segments.is_empty());
            assert_eq!(event.flagged, event.risk_score >= 0.6);
        }
        assert_eq!(agent.emitted(), 200);
    }

    #[test]
    fn test_seed_is_reproducible() {
        let mut a = seeded(0.5);
        let mut b = seeded(0.5);
        for _ in 0..20 {
            assert_eq!(a.next_event(ts()), b.next_event(ts()));
        }
    }

    #[test]
    fn test_probability_extremes() {
        let mut never = seeded(0.0);
        let mut always = seeded(1.0);
        for _ in 0..50 {
            assert!(!never.next_event(ts()).flagged);
            assert!(always.next_event(ts()).flagged);
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        let empty = SimulatedAgentConfig::named("  ");
        assert!(matches!(SimulatedAgent::new(empty), Err(SimError::InvalidConfig(_))));

        let probability = SimulatedAgentConfig {
            flag_probability: 1.5,
            ..Default::default()
        };
        assert!(SimulatedAgent::new(probability).is_err());

        let latency = SimulatedAgentConfig {
            min_latency_ms: 500.0,
            max_latency_ms: 100.0,
            ..Default::default()
        };
        assert!(SimulatedAgent::new(latency).is_err());
    }

    #[test]
    fn test_default_fleet_is_valid() {
        let fleet = default_fleet();
        assert_eq!(fleet.len(), 3);
        for config in fleet {
            SimulatedAgent::new(config).unwrap();
        }
    }
}
