//! Plain-text rendering of snapshots for the terminal

use std::fmt::Write;

use vigil_telemetry::{AggregateSnapshot, ConnectionState, ConnectionStats, ConnectionStatus};

const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Render a series as a one-line sparkline scaled to its own range
pub fn sparkline(values: &[f64]) -> String {
    let finite = values.iter().copied().filter(|v| v.is_finite());
    let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if min > max {
        return String::new();
    }

    let span = max - min;
    values
        .iter()
        .map(|v| {
            if !v.is_finite() || span == 0.0 {
                return SPARK_LEVELS[0];
            }
            let level = ((v - min) / span * (SPARK_LEVELS.len() - 1) as f64).round() as usize;
            SPARK_LEVELS[level.min(SPARK_LEVELS.len() - 1)]
        })
        .collect()
}

/// Connection summary such as `connected` or `error (retry 2): refused`
pub fn connection_label(status: &ConnectionStatus) -> String {
    let mut label = status.state.name().to_string();
    if status.reconnect_attempts > 0 && status.state != ConnectionState::Connected {
        let _ = write!(label, " (retry {})", status.reconnect_attempts);
    }
    if let Some(error) = &status.error {
        let _ = write!(label, ": {}", error);
    }
    label
}

/// Multi-line status block for one snapshot
pub fn format_status(
    snapshot: &AggregateSnapshot,
    status: &ConnectionStatus,
    stats: &ConnectionStats,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "[{}] health {:.0} | {:.1} rpm | flagged {:.1}% | risk {:.2} | latency {:.0}ms",
        connection_label(status),
        snapshot.system_health,
        snapshot.responses_per_minute,
        snapshot.flagged_rate * 100.0,
        snapshot.average_risk_score,
        snapshot.average_latency_ms,
    );
    let _ = writeln!(
        out,
        "  session {}s | total {} ({} flagged) | agents {}/{} active | frames {} dropped {}{}",
        snapshot.session_duration_sec,
        snapshot.total_responses,
        snapshot.total_flagged,
        snapshot.active_agents(),
        snapshot.agent_stats.len(),
        stats.frames_received,
        stats.frames_dropped,
        if snapshot.enabled { "" } else { " | paused" },
    );

    if !snapshot.response_trend.is_empty() {
        let _ = writeln!(
            out,
            "  trend rpm {} risk {} latency {}",
            sparkline(&snapshot.response_trend),
            sparkline(&snapshot.risk_trend),
            sparkline(&snapshot.latency_trend),
        );
    }

    for (source, agent) in &snapshot.agent_stats {
        let _ = writeln!(
            out,
            "  {:<16} {:>6.1} rpm  flagged {:>5.1}%  {:<9} {}",
            source.as_str(),
            agent.responses_per_minute,
            agent.flagged_rate * 100.0,
            agent.trend.name(),
            if agent.is_active { "active" } else { "idle" },
        );
    }

    out
}
