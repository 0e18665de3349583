//! Bounded re-execution of flaky tests.
//!
//! A [`RetryRule`] configured with `n` retries runs a flaky test at most
//! `n + 1` times. Retryable failures are recorded; the first success ends the
//! loop; a fatal failure or a skip ends it immediately and propagates
//! unchanged. When every execution fails, the recorded failures are raised
//! together as a [`RetryError`].
//!
//! ```text
//! RetryRule::new(2)
//! ├── attempt 1: assertion failed   -> recorded, retry
//! ├── attempt 2: element not found  -> recorded, retry
//! └── attempt 3: assertion failed   -> recorded, exhausted
//!     => Failure::RetriesExhausted(RetryError { 3 failures })
//! ```
//!
//! Tests that are not flagged flaky, and rules configured with zero retries,
//! bypass the loop entirely: the test runs once and its outcome is returned
//! as is.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classify::{Classification, classify};
use crate::description::TestDescription;
use crate::error::{Result, RuleError};
use crate::failure::Failure;

/// How many times a flaky test may be re-run after its first execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct RetryConfig {
    max_retries: u32,
}

impl RetryConfig {
    /// Creates a configuration allowing `retries` re-executions.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidRetries`] for negative values (or values
    /// too large to count).
    pub fn new(retries: i64) -> Result<Self> {
        let max_retries =
            u32::try_from(retries).map_err(|_| RuleError::InvalidRetries(retries))?;
        // max_executions must stay representable
        if max_retries == u32::MAX {
            return Err(RuleError::InvalidRetries(retries));
        }
        Ok(Self { max_retries })
    }

    /// A configuration that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Re-executions allowed after the first attempt.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total executions allowed, `max_retries + 1`.
    #[must_use]
    pub fn max_executions(&self) -> u32 {
        self.max_retries + 1
    }
}

impl TryFrom<i64> for RetryConfig {
    type Error = RuleError;

    fn try_from(retries: i64) -> Result<Self> {
        Self::new(retries)
    }
}

impl From<RetryConfig> for i64 {
    fn from(config: RetryConfig) -> Self {
        i64::from(config.max_retries)
    }
}

/// One failed execution of a flaky test.
#[derive(Debug)]
pub struct FailureRecord {
    /// 1-based execution index.
    pub attempt: u32,
    /// What went wrong.
    pub failure: Failure,
}

/// Raised when a flaky test failed on every permitted execution.
///
/// The message lists every recorded failure in order, with its detail.
pub struct RetryError {
    display_name: String,
    failures: Vec<FailureRecord>,
}

impl RetryError {
    /// Builds the aggregate error for `display_name`.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::EmptyFailures`] if `failures` is empty.
    pub fn new(display_name: impl Into<String>, failures: Vec<FailureRecord>) -> Result<Self> {
        if failures.is_empty() {
            return Err(RuleError::EmptyFailures);
        }
        Ok(Self {
            display_name: display_name.into(),
            failures,
        })
    }

    /// Display name of the test that kept failing.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// The recorded failures, oldest first.
    #[must_use]
    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    /// Number of recorded failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Always false: construction rejects empty lists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Consumes the error, returning the recorded failures.
    #[must_use]
    pub fn into_failures(self) -> Vec<FailureRecord> {
        self.failures
    }
}

impl fmt::Display for RetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Flaky test '{}' failed {} time(s):",
            self.display_name,
            self.failures.len()
        )?;
        for (i, record) in self.failures.iter().enumerate() {
            let prefix = format!("  {}. ", i + 1);
            let detail = format!("{:?}", record.failure);
            let mut lines = detail.lines();
            write!(f, "\n{prefix}{}", lines.next().unwrap_or_default())?;
            // continuation lines line up under the item text
            let indent = " ".repeat(prefix.len());
            for line in lines {
                if line.is_empty() {
                    f.write_str("\n")?;
                } else {
                    write!(f, "\n{indent}{line}")?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for RetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Result of a flaky test that eventually passed.
#[derive(Debug, Default)]
pub struct RetryReport {
    /// How many times the test was executed.
    pub executions: u32,
    /// Failures that preceded the successful execution.
    pub recovered: Vec<FailureRecord>,
}

impl RetryReport {
    /// Returns true if the test only passed after at least one failure.
    #[must_use]
    pub fn was_retried(&self) -> bool {
        !self.recovered.is_empty()
    }
}

/// Re-runs flaky tests until they pass, up to a configured number of retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryRule {
    config: RetryConfig,
}

impl RetryRule {
    /// Creates a rule from a validated configuration.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Creates a rule allowing `retries` re-executions.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidRetries`] for negative values.
    pub fn with_retries(retries: i64) -> Result<Self> {
        RetryConfig::new(retries).map(Self::new)
    }

    /// The rule's configuration.
    #[must_use]
    pub fn config(&self) -> RetryConfig {
        self.config
    }

    /// Returns true if a failure of `description` may trigger a retry.
    #[must_use]
    pub fn applies_to(&self, description: &TestDescription) -> bool {
        self.config.max_retries > 0 && description.is_flaky()
    }

    /// Runs `attempt` until it passes or the retries are used up.
    ///
    /// `attempt` receives the 1-based execution index. It must perform the
    /// whole test invocation, teardown included, before returning.
    ///
    /// # Errors
    ///
    /// Returns the failure unchanged when the test is not eligible, or when
    /// the failure classifies as fatal or skip, and
    /// [`Failure::RetriesExhausted`] once every execution failed.
    pub fn run<F>(
        &self,
        description: &TestDescription,
        mut attempt: F,
    ) -> std::result::Result<RetryReport, Failure>
    where
        F: FnMut(u32) -> std::result::Result<(), Failure>,
    {
        if !self.applies_to(description) {
            attempt(1)?;
            return Ok(RetryReport {
                executions: 1,
                recovered: Vec::new(),
            });
        }

        let max_executions = self.config.max_executions();
        let mut failures = Vec::new();

        for index in 1..=max_executions {
            let failure = match attempt(index) {
                Ok(()) => {
                    log_recovered(description, &failures);
                    return Ok(RetryReport {
                        executions: index,
                        recovered: failures,
                    });
                }
                Err(failure) => failure,
            };

            match classify(&failure) {
                Classification::Retryable => {
                    let remaining = max_executions - index;
                    if remaining > 0 {
                        info!(
                            target: "browser_rules::retry",
                            test = %description,
                            attempt = index,
                            remaining,
                            "flaky test failed, retrying: {failure}"
                        );
                    }
                    failures.push(FailureRecord {
                        attempt: index,
                        failure,
                    });
                }
                classification => {
                    debug!(
                        target: "browser_rules::retry",
                        test = %description,
                        attempt = index,
                        ?classification,
                        "not retrying"
                    );
                    return Err(failure);
                }
            }
        }

        let error =
            RetryError::new(description.display_name(), failures).map_err(Failure::Driver)?;
        Err(Failure::RetriesExhausted(error))
    }
}

fn log_recovered(description: &TestDescription, failures: &[FailureRecord]) {
    for record in failures {
        warn!(
            target: "browser_rules::retry",
            test = %description,
            attempt = record.attempt,
            "flaky test passed after failing: {:?}",
            record.failure
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{DecoratorChain, Hooks};
    use crate::driver::testing::FakeDriver;
    use std::cell::Cell;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn flaky() -> TestDescription {
        TestDescription::new("RetryRuleTest", "flaky_test").flaky()
    }

    #[test]
    fn negative_retries_are_rejected() {
        let err = RetryConfig::new(-1).unwrap_err();
        assert_eq!(
            err.to_string(),
            "The number of retries needs to be an integer >= 0 but was: -1"
        );
        assert!(RetryConfig::new(0).is_ok());
        assert!(RetryConfig::new(1).is_ok());
    }

    #[test]
    fn max_executions_is_retries_plus_one() {
        assert_eq!(RetryConfig::new(2).unwrap().max_executions(), 3);
        assert_eq!(RetryConfig::disabled().max_executions(), 1);
    }

    #[test]
    fn zero_retries_runs_flaky_test_once() {
        let rule = RetryRule::with_retries(0).unwrap();
        let calls = Cell::new(0);
        let result = rule.run(&flaky(), |_| {
            calls.set(calls.get() + 1);
            Err(Failure::assertion("simulated"))
        });
        assert!(matches!(result, Err(Failure::Assertion { .. })));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn non_flaky_test_is_not_retried_and_error_is_unmodified() {
        let rule = RetryRule::with_retries(2).unwrap();
        let calls = Cell::new(0);
        let result = rule.run(&TestDescription::named("stable"), |_| {
            calls.set(calls.get() + 1);
            Err(Failure::Error(anyhow::anyhow!("simulated")))
        });
        let failure = result.unwrap_err();
        assert_eq!(failure.to_string(), "simulated");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn passing_on_first_attempt_runs_once() {
        let rule = RetryRule::with_retries(2).unwrap();
        let report = rule.run(&flaky(), |_| Ok(())).unwrap();
        assert_eq!(report.executions, 1);
        assert!(!report.was_retried());
    }

    #[test]
    fn failing_once_then_passing_runs_twice_and_keeps_failure() {
        let rule = RetryRule::with_retries(2).unwrap();
        let report = rule
            .run(&flaky(), |attempt| {
                if attempt == 1 {
                    Err(Failure::assertion("first run"))
                } else {
                    Ok(())
                }
            })
            .unwrap();
        assert_eq!(report.executions, 2);
        assert_eq!(report.recovered.len(), 1);
        assert_eq!(report.recovered[0].attempt, 1);
    }

    #[test]
    fn exhaustion_lists_failures_in_order() {
        let rule = RetryRule::with_retries(2).unwrap();
        let calls = Cell::new(0);
        let failure = rule
            .run(&flaky(), |attempt| {
                calls.set(calls.get() + 1);
                Err(Failure::assertion(format!("failure {attempt}")))
            })
            .unwrap_err();

        assert_eq!(calls.get(), 3);
        let err = failure.as_retry_error().expect("aggregate error");
        assert_eq!(err.len(), 3);

        let message = err.to_string();
        assert!(message.starts_with("Flaky test 'flaky_test(RetryRuleTest)' failed 3 time(s):"));
        let first = message.find("1. assertion failed: failure 1").unwrap();
        let second = message.find("2. assertion failed: failure 2").unwrap();
        let third = message.find("3. assertion failed: failure 3").unwrap();
        assert!(first < second && second < third);
    }

    #[test]
    fn fatal_failure_is_not_retried() {
        let rule = RetryRule::with_retries(2).unwrap();
        let calls = Cell::new(0);
        let failure = rule
            .run(&flaky(), |_| {
                calls.set(calls.get() + 1);
                Err(Failure::fatal(anyhow::anyhow!("simulated OOM")))
            })
            .unwrap_err();
        assert!(matches!(failure, Failure::Fatal(_)));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn skip_is_not_retried() {
        let rule = RetryRule::with_retries(2).unwrap();
        let calls = Cell::new(0);
        let failure = rule
            .run(&flaky(), |_| {
                calls.set(calls.get() + 1);
                Err(Failure::skip("simulated assumption"))
            })
            .unwrap_err();
        assert!(failure.is_skipped());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn fatal_after_retryable_drops_recorded_failures() {
        let rule = RetryRule::with_retries(3).unwrap();
        let failure = rule
            .run(&flaky(), |attempt| match attempt {
                1 => Err(Failure::assertion("flaky")),
                _ => Err(Failure::fatal(anyhow::anyhow!("browser crashed"))),
            })
            .unwrap_err();
        assert_eq!(failure.to_string(), "fatal: browser crashed");
    }

    #[test]
    fn missing_driver_in_body_is_not_retried() {
        let rule = RetryRule::with_retries(2).unwrap();
        let chain: DecoratorChain<FakeDriver> = DecoratorChain::new();
        let description = flaky();
        let calls = Cell::new(0);

        let failure = rule
            .run(&description, |attempt| {
                chain.run_once(&description, attempt, |ctx| {
                    calls.set(calls.get() + 1);
                    ctx.driver()?;
                    Ok(())
                })
            })
            .unwrap_err();

        assert_eq!(calls.get(), 1);
        assert!(failure.as_retry_error().is_none());
        assert_eq!(failure.to_string(), "the driver has not been initialized yet");
    }

    #[test]
    fn missing_driver_in_hook_is_not_retried() {
        let rule = RetryRule::with_retries(2).unwrap();
        let starts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&starts);
        let chain = DecoratorChain::new().around(Hooks::<FakeDriver>::new("needs-driver").on_start(
            move |ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                ctx.driver()?;
                Ok(())
            },
        ));
        let description = flaky();

        let failure = rule
            .run(&description, |attempt| chain.run_once(&description, attempt, |_| Ok(())))
            .unwrap_err();

        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(classify(&failure), Classification::Fatal);
        assert!(failure.to_string().contains("on_start hook of 'needs-driver' failed"));
    }

    #[test]
    fn multi_line_failures_are_indented_under_their_item() {
        let failures = vec![
            FailureRecord {
                attempt: 1,
                failure: Failure::Driver(RuleError::DriverCreation {
                    reason: "chrome exited".into(),
                    source: Some(anyhow::anyhow!("exit status 1")),
                }),
            },
            FailureRecord {
                attempt: 2,
                failure: Failure::Driver(RuleError::DriverUninitialized),
            },
        ];
        let message = RetryError::new("t", failures).unwrap().to_string();

        assert_eq!(
            message,
            "Flaky test 't' failed 2 time(s):\n\
             \n  1. driver factory failed creating a new driver: chrome exited\
             \n         caused by: exit status 1\
             \n  2. the driver has not been initialized yet"
        );
    }

    #[test]
    fn aggregate_shows_where_each_assertion_failed() {
        let rule = RetryRule::with_retries(1).unwrap();
        let chain: DecoratorChain<FakeDriver> = DecoratorChain::new();
        let description = flaky();

        let failure = rule
            .run(&description, |attempt| {
                chain.run_once(&description, attempt, |_| {
                    assert_eq!(1, 2, "attempt {attempt}");
                    Ok(())
                })
            })
            .unwrap_err();

        let message = failure.as_retry_error().unwrap().to_string();
        let located = format!("\n         at {}:", file!());
        assert_eq!(message.matches(&located).count(), 2, "{message}");
        assert!(message.contains("\n       left: 1"), "{message}");
    }

    #[test]
    fn empty_failure_list_is_rejected() {
        let err = RetryError::new("t", Vec::new()).unwrap_err();
        assert_eq!(err.to_string(), "The list of failures must not be empty");
    }

    #[test]
    fn retry_config_deserializes_from_integer() {
        let config: RetryConfig = serde_json::from_str("3").unwrap();
        assert_eq!(config.max_retries(), 3);
        assert!(serde_json::from_str::<RetryConfig>("-2").is_err());
    }
}
