//! Decorators that report test progress and page state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chain::{Decorator, TestContext};
use crate::driver::WebDriver;
use crate::failure::Failure;
use crate::reporter::Reporter;

/// Which lifecycle events a [`TestLogger`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvents {
    /// Report `starting`.
    #[serde(default = "enabled")]
    pub on_start: bool,
    /// Report the outcome: `passed`, `failed` or `skipped`.
    #[serde(default = "enabled")]
    pub on_finish: bool,
}

fn enabled() -> bool {
    true
}

impl Default for LogEvents {
    fn default() -> Self {
        Self::ALL
    }
}

impl LogEvents {
    /// Start and outcome.
    pub const ALL: LogEvents = LogEvents {
        on_start: true,
        on_finish: true,
    };

    /// Only the start of each test.
    pub const START: LogEvents = LogEvents {
        on_start: true,
        on_finish: false,
    };

    /// Only the outcome of each test.
    pub const FINISH: LogEvents = LogEvents {
        on_start: false,
        on_finish: true,
    };
}

/// Reports test start and outcome to a [`Reporter`].
pub struct TestLogger {
    reporter: Arc<dyn Reporter>,
    events: LogEvents,
}

impl TestLogger {
    /// Reports every event.
    pub fn new(reporter: Arc<dyn Reporter>) -> Self {
        Self::with_events(reporter, LogEvents::ALL)
    }

    /// Reports only the selected events.
    pub fn with_events(reporter: Arc<dyn Reporter>, events: LogEvents) -> Self {
        Self { reporter, events }
    }

    /// The selected events.
    #[must_use]
    pub fn events(&self) -> LogEvents {
        self.events
    }
}

impl<D> Decorator<D> for TestLogger {
    fn name(&self) -> &str {
        "test-logger"
    }

    fn on_start(&self, ctx: &TestContext<'_, D>) -> anyhow::Result<()> {
        if self.events.on_start {
            self.reporter.starting(ctx.description());
        }
        Ok(())
    }

    fn on_success(&self, ctx: &TestContext<'_, D>) -> anyhow::Result<()> {
        if self.events.on_finish {
            self.reporter.passed(ctx.description());
        }
        Ok(())
    }

    fn on_skipped(&self, reason: &str, ctx: &TestContext<'_, D>) -> anyhow::Result<()> {
        if self.events.on_finish {
            self.reporter.skipped(ctx.description(), reason);
        }
        Ok(())
    }

    fn on_failure(&self, failure: &Failure, ctx: &TestContext<'_, D>) -> anyhow::Result<()> {
        if self.events.on_finish {
            self.reporter.failed(ctx.description(), failure);
        }
        Ok(())
    }
}

/// Reports the page source when a test fails.
pub struct PageSourceOnFailure {
    reporter: Arc<dyn Reporter>,
    report_on_finish: bool,
}

impl PageSourceOnFailure {
    /// Reports the page source of failing tests.
    pub fn new(reporter: Arc<dyn Reporter>) -> Self {
        Self {
            reporter,
            report_on_finish: false,
        }
    }

    /// Also reports the page source when every test finishes.
    #[must_use]
    pub fn report_on_finish(mut self) -> Self {
        self.report_on_finish = true;
        self
    }

    fn report<D: WebDriver>(&self, ctx: &TestContext<'_, D>, failed: bool) -> anyhow::Result<()> {
        let Ok(driver) = ctx.driver() else {
            debug!(test = %ctx.description(), "no driver, skipping page source");
            return Ok(());
        };
        let source = driver.page_source()?;
        if failed {
            self.reporter
                .warn(&format!("page source of failed test {}", ctx.description()));
        } else {
            self.reporter
                .info(&format!("page source of finished test {}", ctx.description()));
        }
        self.reporter.page_source(ctx.description(), &source);
        Ok(())
    }
}

impl<D: WebDriver> Decorator<D> for PageSourceOnFailure {
    fn name(&self) -> &str {
        "page-source-on-failure"
    }

    fn on_failure(&self, _failure: &Failure, ctx: &TestContext<'_, D>) -> anyhow::Result<()> {
        self.report(ctx, true)
    }

    fn on_finish(&self, ctx: &TestContext<'_, D>) -> anyhow::Result<()> {
        if self.report_on_finish {
            self.report(ctx, false)?;
        }
        Ok(())
    }
}
