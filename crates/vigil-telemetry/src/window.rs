//! Per-second bucketed rolling window
//!
//! Buckets are keyed by whole seconds since session start. Totals are kept
//! incrementally and rebuilt from the surviving buckets whenever an eviction
//! happens, so floating-point drift is bounded by the window size.

use std::collections::VecDeque;

/// Counters accumulated over a set of events
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowStats {
    /// Number of events
    pub count: u64,
    /// Number of flagged events
    pub flagged: u64,
    /// Sum of processing times (ms)
    pub latency_sum_ms: f64,
    /// Sum of risk scores
    pub risk_sum: f64,
}

impl WindowStats {
    /// Add one event
    pub fn record(&mut self, flagged: bool, latency_ms: f64, risk: f64) {
        self.count += 1;
        if flagged {
            self.flagged += 1;
        }
        self.latency_sum_ms += latency_ms;
        self.risk_sum += risk;
    }

    /// Add another set of counters
    pub fn merge(&mut self, other: &WindowStats) {
        self.count += other.count;
        self.flagged += other.flagged;
        self.latency_sum_ms += other.latency_sum_ms;
        self.risk_sum += other.risk_sum;
    }

    /// Flagged fraction, 0 when empty
    pub fn flagged_rate(&self) -> f64 {
        self.ratio(self.flagged as f64)
    }

    /// Mean processing time, 0 when empty
    pub fn mean_latency_ms(&self) -> f64 {
        self.ratio(self.latency_sum_ms)
    }

    /// Mean risk score, 0 when empty
    pub fn mean_risk(&self) -> f64 {
        self.ratio(self.risk_sum)
    }

    fn ratio(&self, numerator: f64) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            numerator / self.count as f64
        }
    }
}

#[derive(Debug, Clone)]
struct Bucket {
    second: u64,
    stats: WindowStats,
}

/// Sliding window of per-second buckets
///
/// At time `now`, the window covers seconds `now - span + 1 ..= now`.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    span_secs: u64,
    buckets: VecDeque<Bucket>,
    totals: WindowStats,
}

impl RollingWindow {
    /// Create a window spanning `span_secs` seconds (minimum 1)
    pub fn new(span_secs: u64) -> Self {
        Self {
            span_secs: span_secs.max(1),
            buckets: VecDeque::new(),
            totals: WindowStats::default(),
        }
    }

    /// Window span in seconds
    pub fn span_secs(&self) -> u64 {
        self.span_secs
    }

    /// Change the span; buckets outside the new span go on the next eviction
    pub fn set_span(&mut self, span_secs: u64) {
        self.span_secs = span_secs.max(1);
    }

    /// Record one event at `second`
    pub fn record(&mut self, second: u64, flagged: bool, latency_ms: f64, risk: f64) {
        self.evict(second);

        match self.buckets.back_mut() {
            Some(bucket) if bucket.second == second => {
                bucket.stats.record(flagged, latency_ms, risk);
            }
            Some(bucket) if bucket.second > second => {
                // Late arrival, keep buckets sorted
                let index = self.buckets.partition_point(|b| b.second < second);
                match self.buckets.get_mut(index) {
                    Some(existing) if existing.second == second => {
                        existing.stats.record(flagged, latency_ms, risk);
                    }
                    _ => {
                        let mut stats = WindowStats::default();
                        stats.record(flagged, latency_ms, risk);
                        self.buckets.insert(index, Bucket { second, stats });
                    }
                }
            }
            _ => {
                let mut stats = WindowStats::default();
                stats.record(flagged, latency_ms, risk);
                self.buckets.push_back(Bucket { second, stats });
            }
        }

        self.totals.record(flagged, latency_ms, risk);
    }

    /// Drop buckets that fell out of the window at `now`
    ///
    /// Returns true if anything was evicted.
    pub fn evict(&mut self, now: u64) -> bool {
        let mut evicted = false;
        while let Some(front) = self.buckets.front() {
            if front.second.saturating_add(self.span_secs) > now {
                break;
            }
            self.buckets.pop_front();
            evicted = true;
        }

        if evicted {
            self.totals = self.sum_buckets(|_| true);
        }
        evicted
    }

    /// Totals over the whole window (as of the last record/evict)
    pub fn totals(&self) -> WindowStats {
        self.totals
    }

    /// Totals over seconds in `from..to`
    pub fn stats_between(&self, from: u64, to: u64) -> WindowStats {
        self.sum_buckets(|second| second >= from && second < to)
    }

    /// Totals over the last `len` seconds ending at `now` inclusive
    pub fn stats_ending_at(&self, now: u64, len: u64) -> WindowStats {
        let end = now.saturating_add(1);
        self.stats_between(end.saturating_sub(len), end)
    }

    /// Whether the window holds no buckets
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Drop all buckets
    pub fn clear(&mut self) {
        self.buckets.clear();
        self.totals = WindowStats::default();
    }

    fn sum_buckets(&self, include: impl Fn(u64) -> bool) -> WindowStats {
        let mut stats = WindowStats::default();
        for bucket in self.buckets.iter().filter(|b| include(b.second)) {
            stats.merge(&bucket.stats);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accumulates_in_same_second() {
        let mut window = RollingWindow::new(60);
        window.record(5, true, 100.0, 0.8);
        window.record(5, false, 300.0, 0.2);

        let totals = window.totals();
        assert_eq!(totals.count, 2);
        assert_eq!(totals.flagged, 1);
        assert_eq!(totals.mean_latency_ms(), 200.0);
        assert_eq!(totals.flagged_rate(), 0.5);
        assert!((totals.mean_risk() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_evicts_buckets_outside_span() {
        let mut window = RollingWindow::new(10);
        window.record(0, true, 10.0, 1.0);
        window.record(5, false, 20.0, 0.0);

        // At second 9 both buckets are inside (0..=9)
        assert!(!window.evict(9));
        assert_eq!(window.totals().count, 2);

        // At second 10 the bucket for second 0 is gone
        assert!(window.evict(10));
        assert_eq!(window.totals().count, 1);
        assert_eq!(window.totals().flagged, 0);

        assert!(window.evict(100));
        assert!(window.is_empty());
        assert_eq!(window.totals(), WindowStats::default());
    }

    #[test]
    fn test_late_arrival_lands_in_sorted_bucket() {
        let mut window = RollingWindow::new(60);
        window.record(10, false, 1.0, 0.0);
        window.record(12, false, 1.0, 0.0);
        window.record(11, true, 1.0, 0.0);
        window.record(10, true, 1.0, 0.0);

        assert_eq!(window.stats_between(10, 11).count, 2);
        assert_eq!(window.stats_between(11, 12).flagged, 1);
        assert_eq!(window.totals().count, 4);
    }

    #[test]
    fn test_stats_ending_at() {
        let mut window = RollingWindow::new(120);
        for second in 0..60 {
            window.record(second, second >= 30, 1.0, 0.0);
        }
        let recent = window.stats_ending_at(59, 30);
        let prior = window.stats_ending_at(29, 30);
        assert_eq!(recent.count, 30);
        assert_eq!(recent.flagged_rate(), 1.0);
        assert_eq!(prior.count, 30);
        assert_eq!(prior.flagged_rate(), 0.0);
    }

    #[test]
    fn test_shrinking_span_applies_on_next_evict() {
        let mut window = RollingWindow::new(60);
        window.record(0, false, 1.0, 0.0);
        window.record(40, false, 1.0, 0.0);
        window.set_span(30);
        window.evict(40);
        assert_eq!(window.totals().count, 1);
    }

    #[test]
    fn test_huge_span_never_evicts() {
        let mut window = RollingWindow::new(u64::MAX);
        window.record(5, true, 1.0, 0.5);
        assert!(!window.evict(1_000_000_000));
        assert_eq!(window.stats_ending_at(u64::MAX, u64::MAX).count, 1);
        assert_eq!(window.totals().count, 1);
    }

    #[test]
    fn test_empty_stats_are_zero() {
        let stats = WindowStats::default();
        assert_eq!(stats.flagged_rate(), 0.0);
        assert_eq!(stats.mean_latency_ms(), 0.0);
        assert_eq!(stats.mean_risk(), 0.0);
    }
}
