//! Per-test driver lifecycle.
//!
//! A [`DriverResource`] asks its [`DriverFactory`] for a fresh driver before
//! each test attempt and quits it afterwards, whatever the outcome. The
//! handle never outlives a single invocation and is never shared between
//! invocations.
//!
//! # Resource Safety
//!
//! `DriverResource` implements Drop and quits a driver that is still held,
//! so a panicking caller does not leak a browser process. The chain always
//! releases explicitly; Drop is the backstop.

use tracing::{debug, warn};

use crate::error::{Result, RuleError};

/// A browser driver as seen by the rules.
///
/// Only the operations the rules themselves need are part of the trait;
/// test bodies use the concrete driver type for everything else.
pub trait WebDriver {
    /// Error raised by driver operations.
    ///
    /// Being a `std::error::Error`, it converts into a [`Failure`] through
    /// `?` inside test bodies.
    ///
    /// [`Failure`]: crate::failure::Failure
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the HTML source of the current page.
    ///
    /// # Errors
    ///
    /// Returns an error if the browser cannot be queried.
    fn page_source(&self) -> std::result::Result<String, Self::Error>;

    /// Captures the visible page as PNG bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the capture fails.
    fn screenshot_png(&self) -> std::result::Result<Vec<u8>, Self::Error>;

    /// Shuts the driver down, closing the browser.
    ///
    /// # Errors
    ///
    /// Returns an error if the browser does not shut down cleanly.
    fn quit(self) -> std::result::Result<(), Self::Error>;
}

/// Creates drivers on demand.
///
/// `Ok(None)` means the factory ran but produced no usable driver.
pub trait DriverFactory {
    /// The driver type produced.
    type Driver: WebDriver;

    /// Creates a new driver.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver cannot be created.
    fn create(&self) -> anyhow::Result<Option<Self::Driver>>;
}

impl<D, F> DriverFactory for F
where
    D: WebDriver,
    F: Fn() -> anyhow::Result<Option<D>>,
{
    type Driver = D;

    fn create(&self) -> anyhow::Result<Option<D>> {
        self()
    }
}

/// Owns the driver for the duration of one test invocation.
pub struct DriverResource<F: DriverFactory> {
    factory: F,
    driver: Option<F::Driver>,
}

impl<F: DriverFactory> DriverResource<F> {
    /// Creates a resource that has not acquired a driver yet.
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            driver: None,
        }
    }

    /// Creates a new driver through the factory.
    ///
    /// A driver still held from an earlier acquisition is released first.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::DriverCreation`] if the factory fails or returns
    /// no driver.
    pub fn acquire(&mut self) -> Result<&F::Driver> {
        if self.driver.is_some() {
            warn!("acquiring a new driver while the previous one is still held; releasing it");
            self.release();
        }

        let created = self
            .factory
            .create()
            .map_err(|e| RuleError::DriverCreation {
                reason: "the factory returned an error".to_string(),
                source: Some(e),
            })?
            .ok_or_else(|| RuleError::DriverCreation {
                reason: "the driver returned was empty".to_string(),
                source: None,
            })?;

        debug!("driver acquired");
        Ok(&*self.driver.insert(created))
    }

    /// Quits the driver, if one is held.
    ///
    /// Teardown errors are logged and swallowed so that they never mask the
    /// outcome of the test.
    pub fn release(&mut self) {
        if let Some(driver) = self.driver.take() {
            match driver.quit() {
                Ok(()) => debug!("driver released"),
                Err(e) => warn!("failed to quit driver: {e}"),
            }
        }
    }

    /// Returns the current driver.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::DriverUninitialized`] before a successful
    /// [`acquire`](Self::acquire).
    pub fn handle(&self) -> Result<&F::Driver> {
        self.driver.as_ref().ok_or(RuleError::DriverUninitialized)
    }

    /// Returns true while a driver is held.
    #[must_use]
    pub fn is_acquired(&self) -> bool {
        self.driver.is_some()
    }

    /// The factory used to create drivers.
    pub fn factory(&self) -> &F {
        &self.factory
    }
}

impl<F: DriverFactory> Drop for DriverResource<F> {
    fn drop(&mut self) {
        if self.driver.is_some() {
            warn!("DriverResource dropped while holding a driver - quitting it via Drop");
            self.release();
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory driver used by unit tests across the crate.

    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    /// Records what happened to every driver it hands out.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct Journal(Arc<Mutex<Vec<String>>>);

    impl Journal {
        pub(crate) fn push(&self, entry: impl Into<String>) {
            self.0.lock().unwrap().push(entry.into());
        }

        pub(crate) fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    #[derive(Debug)]
    pub(crate) struct FakeDriver {
        pub(crate) id: usize,
        pub(crate) journal: Journal,
        pub(crate) fail_quit: bool,
    }

    impl WebDriver for FakeDriver {
        type Error = io::Error;

        fn page_source(&self) -> io::Result<String> {
            Ok(format!("<html><body>driver {}</body></html>", self.id))
        }

        fn screenshot_png(&self) -> io::Result<Vec<u8>> {
            Ok(vec![0x89, b'P', b'N', b'G'])
        }

        fn quit(self) -> io::Result<()> {
            self.journal.push(format!("quit {}", self.id));
            if self.fail_quit {
                return Err(io::Error::other("browser already gone"));
            }
            Ok(())
        }
    }

    /// Factory producing numbered fake drivers.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct FakeFactory {
        pub(crate) journal: Journal,
        pub(crate) created: Arc<Mutex<usize>>,
        pub(crate) fail_quit: bool,
    }

    impl DriverFactory for FakeFactory {
        type Driver = FakeDriver;

        fn create(&self) -> anyhow::Result<Option<FakeDriver>> {
            let mut created = self.created.lock().unwrap();
            *created += 1;
            self.journal.push(format!("create {}", *created));
            Ok(Some(FakeDriver {
                id: *created,
                journal: self.journal.clone(),
                fail_quit: self.fail_quit,
            }))
        }
    }
}
