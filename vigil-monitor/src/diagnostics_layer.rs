//! Custom tracing layer that keeps recent warnings for the status output

use std::sync::{Arc, Mutex, PoisonError};

use tracing::field::{Field, Visit};
use tracing::subscriber::Interest;
use tracing::{Event, Level, Metadata, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;
use vigil_telemetry::RingBuffer;

/// Crates that belong to this project (for filtering)
const PROJECT_CRATES: &[&str] = &["vigil", "vigil_protocol", "vigil_telemetry", "vigil_sim"];

fn is_project_target(target: &str) -> bool {
    PROJECT_CRATES
        .iter()
        .any(|crate_name| target.starts_with(crate_name))
}

/// Filter that admits project crates at or above a minimum level
pub struct ProjectCrateFilter {
    min_level: Level,
}

impl ProjectCrateFilter {
    /// Admit events at `min_level` or more severe
    pub fn new(min_level: Level) -> Self {
        Self { min_level }
    }
}

impl<S> tracing_subscriber::layer::Filter<S> for ProjectCrateFilter {
    fn enabled(&self, meta: &Metadata<'_>, _cx: &Context<'_, S>) -> bool {
        is_project_target(meta.target()) && *meta.level() <= self.min_level
    }

    fn callsite_enabled(&self, meta: &'static Metadata<'static>) -> Interest {
        if is_project_target(meta.target()) && *meta.level() <= self.min_level {
            Interest::always()
        } else {
            Interest::never()
        }
    }
}

/// A diagnostic event captured from tracing
#[derive(Debug, Clone)]
pub struct DiagnosticEvent {
    /// Source of the event (derived from tracing target)
    pub source: String,
    /// Severity level
    pub level: Level,
    /// Log message
    pub message: String,
}

/// Bounded log of captured events, shared between the layer and the printer
#[derive(Clone)]
pub struct DiagnosticsLog {
    entries: Arc<Mutex<RingBuffer<DiagnosticEvent>>>,
}

impl DiagnosticsLog {
    /// Create a log holding at most `capacity` events
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(RingBuffer::new(capacity))),
        }
    }

    fn push(&self, event: DiagnosticEvent) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Take every captured event, oldest first
    pub fn drain(&self) -> Vec<DiagnosticEvent> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let drained = entries.to_vec();
        entries.clear();
        drained
    }
}

/// Tracing layer that records events into a [`DiagnosticsLog`]
pub struct DiagnosticsLayer {
    log: DiagnosticsLog,
}

impl DiagnosticsLayer {
    /// Create a layer writing into `log`
    pub fn new(log: DiagnosticsLog) -> Self {
        Self { log }
    }
}

impl<S: Subscriber> Layer<S> for DiagnosticsLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        self.log.push(DiagnosticEvent {
            source: simplify_target(event.metadata().target()),
            level: *event.metadata().level(),
            message: visitor.message.unwrap_or_default(),
        });
    }
}

/// Visitor to extract the message field
#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        }
    }
}

/// Simplify a module path target to a short source name
///
/// e.g. "vigil_telemetry::connection" -> "Connection"
fn simplify_target(target: &str) -> String {
    target
        .rsplit("::")
        .next()
        .map(|s| {
            let mut chars = s.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => s.to_string(),
            }
        })
        .unwrap_or_else(|| target.to_string())
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::layer::SubscriberExt;

    use super::*;

    #[test]
    fn test_simplify_target() {
        assert_eq!(simplify_target("vigil_telemetry::connection"), "Connection");
        assert_eq!(simplify_target("vigil_sim::server"), "Server");
        assert_eq!(simplify_target("vigil"), "Vigil");
    }

    #[test]
    fn test_project_target_matching() {
        assert!(is_project_target("vigil_telemetry::ws"));
        assert!(is_project_target("vigil::status"));
        assert!(!is_project_target("tokio_tungstenite::handshake"));
    }

    #[test]
    fn test_log_is_bounded_and_drains() {
        let log = DiagnosticsLog::new(2);
        for i in 0..3 {
            log.push(DiagnosticEvent {
                source: "Test".into(),
                level: Level::WARN,
                message: format!("event {}", i),
            });
        }

        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].message, "event 1");
        assert!(log.drain().is_empty());
    }

    #[test]
    fn test_layer_captures_warnings_only() {
        let log = DiagnosticsLog::new(10);
        let subscriber = tracing_subscriber::registry().with(
            DiagnosticsLayer::new(log.clone()).with_filter(ProjectCrateFilter::new(Level::WARN)),
        );

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "vigil_telemetry::connection", "feed dropped");
            tracing::info!(target: "vigil_telemetry::connection", "feed connected");
            tracing::error!(target: "hyper::proto", "not ours");
        });

        let drained = log.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].source, "Connection");
        assert_eq!(drained[0].message, "feed dropped");
        assert_eq!(drained[0].level, Level::WARN);
    }
}
