//! Test report sinks.
//!
//! Decorators never print directly; they push lifecycle events and
//! diagnostics through a [`Reporter`]. Two implementations ship with the
//! crate:
//!
//! - [`TracingReporter`] forwards everything to `tracing` under the
//!   `browser_rules::report` target.
//! - [`MemoryReporter`] keeps events in order for later inspection, which is
//!   what the crate's own tests use.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info, warn};

use crate::description::TestDescription;
use crate::failure::Failure;
use crate::screenshot::Screenshot;

/// Receives test lifecycle events and diagnostics.
pub trait Reporter: Send + Sync {
    /// A test is about to run.
    fn starting(&self, description: &TestDescription);

    /// A test passed.
    fn passed(&self, description: &TestDescription);

    /// A test failed.
    fn failed(&self, description: &TestDescription, failure: &Failure);

    /// A test was skipped.
    fn skipped(&self, description: &TestDescription, reason: &str);

    /// A free-form informational message.
    fn info(&self, message: &str);

    /// A free-form warning.
    fn warn(&self, message: &str);

    /// A free-form error.
    fn error(&self, message: &str);

    /// HTML source of the page under test.
    fn page_source(&self, description: &TestDescription, source: &str);

    /// A screenshot of the page under test.
    fn screenshot(&self, description: &TestDescription, screenshot: &Screenshot);

    /// Flushes and closes the sink. The default does nothing.
    fn close(&self) {}
}

/// Severity of a free-form report message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Informational
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// One event recorded by [`MemoryReporter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReportEvent {
    /// See [`Reporter::starting`]
    Starting {
        /// Display name of the test
        test: String,
    },
    /// See [`Reporter::passed`]
    Passed {
        /// Display name of the test
        test: String,
    },
    /// See [`Reporter::failed`]
    Failed {
        /// Display name of the test
        test: String,
        /// Rendered failure
        failure: String,
    },
    /// See [`Reporter::skipped`]
    Skipped {
        /// Display name of the test
        test: String,
        /// Skip reason
        reason: String,
    },
    /// A free-form message
    Message {
        /// Severity
        level: Level,
        /// Message text
        text: String,
    },
    /// See [`Reporter::page_source`]
    PageSource {
        /// Display name of the test
        test: String,
        /// HTML source
        source: String,
    },
    /// See [`Reporter::screenshot`]
    Screenshot {
        /// Display name of the test
        test: String,
        /// The captured screenshot
        screenshot: Screenshot,
    },
    /// See [`Reporter::close`]
    Closed,
}

impl ReportEvent {
    /// Display name of the test this event belongs to, if any.
    #[must_use]
    pub fn test(&self) -> Option<&str> {
        match self {
            ReportEvent::Starting { test }
            | ReportEvent::Passed { test }
            | ReportEvent::Failed { test, .. }
            | ReportEvent::Skipped { test, .. }
            | ReportEvent::PageSource { test, .. }
            | ReportEvent::Screenshot { test, .. } => Some(test),
            ReportEvent::Message { .. } | ReportEvent::Closed => None,
        }
    }
}

/// Reporter that logs through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl TracingReporter {
    /// Creates the reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Reporter for TracingReporter {
    fn starting(&self, description: &TestDescription) {
        info!(target: "browser_rules::report", test = %description, "STARTING");
    }

    fn passed(&self, description: &TestDescription) {
        info!(target: "browser_rules::report", test = %description, "PASSED");
    }

    fn failed(&self, description: &TestDescription, failure: &Failure) {
        error!(target: "browser_rules::report", test = %description, "FAILED: {failure}");
    }

    fn skipped(&self, description: &TestDescription, reason: &str) {
        warn!(target: "browser_rules::report", test = %description, reason, "SKIPPED");
    }

    fn info(&self, message: &str) {
        info!(target: "browser_rules::report", "{message}");
    }

    fn warn(&self, message: &str) {
        warn!(target: "browser_rules::report", "{message}");
    }

    fn error(&self, message: &str) {
        error!(target: "browser_rules::report", "{message}");
    }

    fn page_source(&self, description: &TestDescription, source: &str) {
        info!(target: "browser_rules::report", test = %description, "page source:\n{source}");
    }

    fn screenshot(&self, description: &TestDescription, screenshot: &Screenshot) {
        match screenshot {
            Screenshot::File(path) => {
                info!(
                    target: "browser_rules::report",
                    test = %description,
                    path = %path.display(),
                    "screenshot saved"
                );
            }
            other => {
                info!(
                    target: "browser_rules::report",
                    test = %description,
                    bytes = other.len(),
                    "screenshot: {}",
                    other.to_html_img(&description.display_name())
                );
            }
        }
    }
}

/// Thread-safe, cheaply cloneable event accumulator.
///
/// Clones share the same buffer, so a test can keep one clone for
/// assertions and hand another to the rule.
///
/// ```ignore
/// let reporter = MemoryReporter::new();
/// let rule = BrowserRule::builder(factory)
///     .with_test_logger(Arc::new(reporter.clone()))
///     .build()?;
/// // ... run tests ...
/// assert_eq!(reporter.failures().len(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryReporter {
    events: Arc<Mutex<Vec<ReportEvent>>>,
}

impl MemoryReporter {
    /// Creates an empty reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: ReportEvent) {
        // A poisoned lock means a panic is already unwinding; dropping the
        // event is fine.
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    /// Snapshot of all events in arrival order.
    #[must_use]
    pub fn events(&self) -> Vec<ReportEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events belonging to the test with `display_name`.
    #[must_use]
    pub fn events_for(&self, display_name: &str) -> Vec<ReportEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.test() == Some(display_name))
            .collect()
    }

    /// All recorded failures.
    #[must_use]
    pub fn failures(&self) -> Vec<ReportEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, ReportEvent::Failed { .. }))
            .collect()
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops all recorded events.
    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }

    /// Renders the events as JSON lines.
    ///
    /// # Errors
    ///
    /// Returns an error if an event cannot be serialized.
    pub fn to_json_lines(&self) -> serde_json::Result<String> {
        let mut out = String::new();
        for event in self.events() {
            out.push_str(&serde_json::to_string(&event)?);
            out.push('\n');
        }
        Ok(out)
    }
}

impl Reporter for MemoryReporter {
    fn starting(&self, description: &TestDescription) {
        self.push(ReportEvent::Starting {
            test: description.display_name(),
        });
    }

    fn passed(&self, description: &TestDescription) {
        self.push(ReportEvent::Passed {
            test: description.display_name(),
        });
    }

    fn failed(&self, description: &TestDescription, failure: &Failure) {
        self.push(ReportEvent::Failed {
            test: description.display_name(),
            failure: failure.to_string(),
        });
    }

    fn skipped(&self, description: &TestDescription, reason: &str) {
        self.push(ReportEvent::Skipped {
            test: description.display_name(),
            reason: reason.to_string(),
        });
    }

    fn info(&self, message: &str) {
        self.push(ReportEvent::Message {
            level: Level::Info,
            text: message.to_string(),
        });
    }

    fn warn(&self, message: &str) {
        self.push(ReportEvent::Message {
            level: Level::Warn,
            text: message.to_string(),
        });
    }

    fn error(&self, message: &str) {
        self.push(ReportEvent::Message {
            level: Level::Error,
            text: message.to_string(),
        });
    }

    fn page_source(&self, description: &TestDescription, source: &str) {
        self.push(ReportEvent::PageSource {
            test: description.display_name(),
            source: source.to_string(),
        });
    }

    fn screenshot(&self, description: &TestDescription, screenshot: &Screenshot) {
        self.push(ReportEvent::Screenshot {
            test: description.display_name(),
            screenshot: screenshot.clone(),
        });
    }

    fn close(&self) {
        self.push(ReportEvent::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_events() {
        let reporter = MemoryReporter::new();
        let handle = reporter.clone();
        let desc = TestDescription::new("Suite", "a");

        reporter.starting(&desc);
        reporter.failed(&desc, &Failure::assertion("nope"));
        reporter.info("unrelated");

        assert_eq!(handle.len(), 3);
        assert_eq!(handle.events_for("a(Suite)").len(), 2);
        assert_eq!(
            handle.failures(),
            vec![ReportEvent::Failed {
                test: "a(Suite)".to_string(),
                failure: "assertion failed: nope".to_string(),
            }]
        );

        handle.clear();
        assert!(reporter.is_empty());
    }

    #[test]
    fn json_lines_are_tagged() {
        let reporter = MemoryReporter::new();
        reporter.skipped(&TestDescription::named("t"), "no display");
        reporter.close();

        let json = reporter.to_json_lines().unwrap();
        let lines: Vec<_> = json.lines().collect();
        assert_eq!(
            lines,
            vec![
                r#"{"event":"skipped","test":"t","reason":"no display"}"#,
                r#"{"event":"closed"}"#,
            ]
        );
    }

    #[test]
    fn tracing_reporter_accepts_every_event() {
        crate::logging::init_test_logging();
        let reporter = TracingReporter::new();
        let desc = TestDescription::named("t");
        reporter.starting(&desc);
        reporter.passed(&desc);
        reporter.screenshot(&desc, &Screenshot::Base64("AA==".to_string()));
        reporter.close();
    }
}
