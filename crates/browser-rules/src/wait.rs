//! Polling waits for conditions inside test bodies.
//!
//! Browser tests often have to wait for the page to settle before asserting.
//! [`Wait::until`] polls a condition until it yields a value or the timeout
//! expires. Errors raised by the condition are treated as transient.

use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::error::{Result, RuleError};

/// Default timeout for wait operations (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default poll interval for checking conditions (100ms).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Timeout and poll interval of a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wait {
    /// Maximum time to wait for the condition.
    pub timeout: Duration,

    /// How often to check the condition.
    pub poll_interval: Duration,
}

impl Default for Wait {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }
}

impl Wait {
    /// Creates a wait with explicit timeout and poll interval.
    #[must_use]
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    /// Creates a wait with `timeout` and the default poll interval.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(timeout, DEFAULT_POLL_INTERVAL)
    }

    /// Polls `condition` until it returns `Ok(Some(value))`.
    ///
    /// `Ok(None)` and `Err(_)` keep polling. The condition is always
    /// evaluated at least once, even with a zero timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::WaitTimeout`] naming `description` once the
    /// timeout expires.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let title = Wait::with_timeout(Duration::from_secs(5))
    ///     .until("title to be set", || {
    ///         let title = driver.title()?;
    ///         Ok((!title.is_empty()).then_some(title))
    ///     })?;
    /// ```
    pub fn until<T, F>(&self, description: &str, mut condition: F) -> Result<T>
    where
        F: FnMut() -> anyhow::Result<Option<T>>,
    {
        let start = Instant::now();

        loop {
            match condition() {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(err) => {
                    trace!(condition = description, "transient error while waiting: {err:#}");
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= self.timeout {
                return Err(RuleError::WaitTimeout {
                    condition: description.to_string(),
                    timeout: self.timeout,
                });
            }

            thread::sleep(self.poll_interval.min(self.timeout - elapsed));
        }
    }

    /// Polls a boolean condition until it holds.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::WaitTimeout`] once the timeout expires.
    pub fn until_true<F>(&self, description: &str, mut condition: F) -> Result<()>
    where
        F: FnMut() -> anyhow::Result<bool>,
    {
        self.until(description, || Ok(condition()?.then_some(())))
    }
}
