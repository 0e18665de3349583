//! The composed browser test rule.
//!
//! A [`BrowserRule`] owns a driver factory, the decorator chain and the
//! retry engine. Each call to [`BrowserRule::run`] executes one test:
//!
//! ```text
//! retry engine                       outermost, re-runs everything below
//! └── TestLogger
//!     └── PageSourceOnFailure
//!         └── ScreenshotOnFailure
//!             └── custom decorators
//!                 └── driver acquire / body / release
//! ```
//!
//! # Example
//!
//! ```ignore
//! let reporter: Arc<dyn Reporter> = Arc::new(TracingReporter::new());
//! let mut rule = BrowserRule::configure(ChromeDriverFactory::default())
//!     .with_test_logger(reporter.clone())
//!     .take_screenshot_on_failure(OutputType::Base64, reporter)
//!     .retry(RetryConfig::new(2)?)
//!     .build();
//!
//! rule.run(&TestDescription::new("Login", "shows_form").flaky(), |ctx| {
//!     let driver = ctx.driver()?;
//!     driver.navigate("http://localhost:8080/login")?;
//!     assert_eq!(driver.title()?, "Login");
//!     Ok(())
//! })?;
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::chain::{Decorator, DecoratorChain, TestContext, TestState};
use crate::config::RulesConfig;
use crate::description::TestDescription;
use crate::driver::{DriverFactory, DriverResource};
use crate::error::Result;
use crate::failure::Failure;
use crate::reporter::Reporter;
use crate::retry::{RetryConfig, RetryReport, RetryRule};
use crate::screenshot::{OutputType, ScreenshotOnFailure};
use crate::test_logger::{LogEvents, PageSourceOnFailure, TestLogger};

/// Builder for [`BrowserRule`]; every method consumes and returns it.
pub struct BrowserRuleBuilder<F: DriverFactory> {
    factory: F,
    logger: Option<TestLogger>,
    page_source: Option<PageSourceOnFailure>,
    screenshot: Option<ScreenshotOnFailure>,
    custom: Vec<Box<dyn Decorator<F::Driver>>>,
    retry: RetryConfig,
}

impl<F: DriverFactory> BrowserRuleBuilder<F> {
    fn new(factory: F) -> Self {
        Self {
            factory,
            logger: None,
            page_source: None,
            screenshot: None,
            custom: Vec::new(),
            retry: RetryConfig::disabled(),
        }
    }

    /// Reports test starts and outcomes. Installed outermost.
    #[must_use]
    pub fn with_test_logger(self, reporter: Arc<dyn Reporter>) -> Self {
        self.with_test_logger_events(reporter, LogEvents::ALL)
    }

    /// Reports the selected lifecycle events.
    #[must_use]
    pub fn with_test_logger_events(
        mut self,
        reporter: Arc<dyn Reporter>,
        events: LogEvents,
    ) -> Self {
        self.logger = Some(TestLogger::with_events(reporter, events));
        self
    }

    /// Reports the page source of failing tests.
    #[must_use]
    pub fn with_page_source_on_failure(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.page_source = Some(PageSourceOnFailure::new(reporter));
        self
    }

    /// Captures a screenshot of failing tests.
    #[must_use]
    pub fn take_screenshot_on_failure(
        mut self,
        output: OutputType,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        self.screenshot = Some(ScreenshotOnFailure::new(output, reporter));
        self
    }

    /// Adds a custom decorator inside the built-in ones and inside custom
    /// decorators added earlier.
    #[must_use]
    pub fn around(mut self, decorator: impl Decorator<F::Driver> + 'static) -> Self {
        self.custom.push(Box::new(decorator));
        self
    }

    /// Retries flaky tests.
    #[must_use]
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    /// Assembles the rule.
    pub fn build(self) -> BrowserRule<F> {
        let mut chain = DecoratorChain::new();
        if let Some(logger) = self.logger {
            chain.push(Box::new(logger));
        }
        if let Some(page_source) = self.page_source {
            chain.push(Box::new(page_source));
        }
        if let Some(screenshot) = self.screenshot {
            chain.push(Box::new(screenshot));
        }
        for decorator in self.custom {
            chain.push(decorator);
        }
        debug!(decorators = ?chain, retries = self.retry.max_retries(), "browser rule built");

        BrowserRule {
            chain,
            resource: DriverResource::new(self.factory),
            retry: RetryRule::new(self.retry),
            state: TestState::NotStarted,
        }
    }
}

/// Runs tests with a fresh driver per attempt, lifecycle decorators and
/// optional retries.
pub struct BrowserRule<F: DriverFactory> {
    chain: DecoratorChain<F::Driver>,
    resource: DriverResource<F>,
    retry: RetryRule,
    state: TestState,
}

impl<F: DriverFactory> BrowserRule<F> {
    /// Starts building a rule around `factory`.
    pub fn configure(factory: F) -> BrowserRuleBuilder<F> {
        BrowserRuleBuilder::new(factory)
    }

    /// A rule without decorators or retries.
    pub fn new(factory: F) -> Self {
        Self::configure(factory).build()
    }

    /// Builds a rule from configuration, reporting through `reporter`.
    ///
    /// # Errors
    ///
    /// Returns the validation error of `config`.
    pub fn from_config(
        config: &RulesConfig,
        factory: F,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self> {
        config.validate()?;
        let mut builder = Self::configure(factory).retry(config.retry_config()?);
        if let Some(events) = config.log.events() {
            builder = builder.with_test_logger_events(reporter.clone(), events);
        }
        if config.log.page_source_on_failure {
            builder = builder.with_page_source_on_failure(reporter.clone());
        }
        if let Some(output) = &config.screenshot {
            builder = builder.take_screenshot_on_failure(output.clone(), reporter);
        }
        Ok(builder.build())
    }

    /// Runs one test.
    ///
    /// # Errors
    ///
    /// Returns the test's failure; for flaky tests that failed on every
    /// execution, [`Failure::RetriesExhausted`].
    pub fn run<B>(
        &mut self,
        description: &TestDescription,
        body: B,
    ) -> std::result::Result<(), Failure>
    where
        B: FnMut(&TestContext<'_, F::Driver>) -> std::result::Result<(), Failure>,
    {
        self.run_with_report(description, body).map(|_| ())
    }

    /// Runs one test and reports how many executions it took.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub fn run_with_report<B>(
        &mut self,
        description: &TestDescription,
        mut body: B,
    ) -> std::result::Result<RetryReport, Failure>
    where
        B: FnMut(&TestContext<'_, F::Driver>) -> std::result::Result<(), Failure>,
    {
        let Self {
            chain,
            resource,
            retry,
            state,
        } = self;

        let outcome = retry.run(description, |attempt| {
            transition(state, TestState::Running, description);
            let result = chain.run_with_driver(description, attempt, resource, &mut body);
            let next = match &result {
                Ok(()) => TestState::Succeeded,
                Err(failure) if failure.is_skipped() => TestState::Skipped,
                Err(_) => TestState::FailedPendingRetry,
            };
            transition(state, next, description);
            result
        });

        if *state == TestState::FailedPendingRetry {
            transition(state, TestState::Failed, description);
        }
        outcome
    }

    /// State reached by the most recent test.
    #[must_use]
    pub fn state(&self) -> TestState {
        self.state
    }

    /// The retry engine.
    #[must_use]
    pub fn retry_rule(&self) -> RetryRule {
        self.retry
    }

    /// Names of the installed decorators, outermost first.
    pub fn decorators(&self) -> impl Iterator<Item = &str> {
        self.chain.names()
    }

    /// The driver factory.
    pub fn factory(&self) -> &F {
        self.resource.factory()
    }
}

fn transition(state: &mut TestState, next: TestState, description: &TestDescription) {
    debug!(test = %description, from = ?*state, to = ?next, "test state");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testing::FakeFactory;
    use crate::reporter::{MemoryReporter, ReportEvent};
    use std::path::PathBuf;

    #[test]
    fn builder_orders_builtins_before_custom() {
        let reporter: Arc<dyn Reporter> = Arc::new(MemoryReporter::new());
        let rule = BrowserRule::configure(FakeFactory::default())
            .around(crate::chain::Hooks::new("custom"))
            .take_screenshot_on_failure(OutputType::Bytes, reporter.clone())
            .with_page_source_on_failure(reporter.clone())
            .with_test_logger(reporter)
            .build();

        assert_eq!(
            rule.decorators().collect::<Vec<_>>(),
            vec![
                "test-logger",
                "page-source-on-failure",
                "screenshot-on-failure",
                "custom"
            ]
        );
    }

    #[test]
    fn flaky_test_recovers_with_fresh_driver_each_attempt() {
        let factory = FakeFactory::default();
        let mut rule = BrowserRule::configure(factory.clone())
            .retry(RetryConfig::new(2).unwrap())
            .build();
        let mut seen = Vec::new();

        let report = rule
            .run_with_report(&TestDescription::named("t").flaky(), |ctx| {
                let driver = ctx.driver()?;
                seen.push(driver.id);
                if driver.id < 2 {
                    return Err(Failure::assertion("not yet"));
                }
                Ok(())
            })
            .unwrap();

        assert_eq!(report.executions, 2);
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(rule.state(), TestState::Succeeded);
        assert_eq!(
            factory.journal.entries(),
            vec!["create 1", "quit 1", "create 2", "quit 2"]
        );
    }

    #[test]
    fn exhausted_retries_end_in_failed_state() {
        let mut rule = BrowserRule::configure(FakeFactory::default())
            .retry(RetryConfig::new(1).unwrap())
            .build();

        let failure = rule
            .run(&TestDescription::named("t").flaky(), |_| Err(Failure::assertion("always")))
            .unwrap_err();

        assert_eq!(failure.as_retry_error().map(|e| e.len()), Some(2));
        assert_eq!(rule.state(), TestState::Failed);
    }

    #[test]
    fn skipped_test_is_not_retried() {
        let factory = FakeFactory::default();
        let mut rule = BrowserRule::configure(factory.clone())
            .retry(RetryConfig::new(3).unwrap())
            .build();

        let failure = rule
            .run(&TestDescription::named("t").flaky(), |_| Err(Failure::skip("not today")))
            .unwrap_err();

        assert!(failure.is_skipped());
        assert_eq!(rule.state(), TestState::Skipped);
        assert_eq!(factory.journal.entries().len(), 2);
    }

    #[test]
    fn from_config_installs_configured_decorators() {
        let reporter = MemoryReporter::new();
        let config = RulesConfig {
            retries: 1,
            screenshot: Some(OutputType::Base64),
            ..RulesConfig::default()
        };

        let mut rule =
            BrowserRule::from_config(&config, FakeFactory::default(), Arc::new(reporter.clone()))
                .unwrap();
        assert_eq!(
            rule.decorators().collect::<Vec<_>>(),
            vec!["test-logger", "screenshot-on-failure"]
        );

        let _ = rule.run(&TestDescription::named("t"), |_| Err(Failure::assertion("x")));
        let events = reporter.events();
        assert!(matches!(events[0], ReportEvent::Starting { .. }));
        assert!(matches!(events[1], ReportEvent::Screenshot { .. }));
        assert!(matches!(events[2], ReportEvent::Failed { .. }));
    }

    #[test]
    fn from_config_rejects_invalid_configuration() {
        let config = RulesConfig {
            screenshot: Some(OutputType::File { dir: PathBuf::new() }),
            ..RulesConfig::default()
        };
        let result = BrowserRule::from_config(
            &config,
            FakeFactory::default(),
            Arc::new(MemoryReporter::new()),
        );
        assert!(result.is_err());
    }
}
