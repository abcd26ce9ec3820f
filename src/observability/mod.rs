//! Observability subsystem
//!
//! Provides:
//! - Structured logging (JSON lines)
//! - Engine counters
//! - Typed lifecycle events
//!
//! Observability is read-only: nothing here influences query semantics.
//!
//! # Usage
//!
//! ```ignore
//! use mycoquery::observability::{log_event_with_fields, Event, MetricsRegistry};
//!
//! log_event_with_fields(Event::QuerySaved, &[("model", "Observation"), ("id", "7")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_saves();
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

/// Log a lifecycle event with fields at its own severity
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_with_fields() {
        log_event_with_fields(Event::StoreCleanup, &[("deleted", "0")]);
    }
}
