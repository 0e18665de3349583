//! Suite-scoped driver services such as a `chromedriver` process.
//!
//! A driver service outlives individual tests: it is started once before a
//! group of tests and stopped after the last one. Per-test browsers come
//! from a [`DriverResource`](crate::driver::DriverResource) instead.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use tracing::{debug, info, warn};

use crate::error::{Result, RuleError};

/// A long running process that browsers connect to.
pub trait DriverService {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Starts the service. Starting a running service is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::ServiceStart`] if the service cannot start.
    fn start(&mut self) -> Result<()>;

    /// Stops the service. Stopping a stopped service is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not shut down cleanly.
    fn stop(&mut self) -> anyhow::Result<()>;

    /// Returns true while the service is up.
    fn is_running(&mut self) -> bool;

    /// Address clients should connect to, if known.
    fn url(&self) -> Option<&str>;
}

/// Starts and stops a [`DriverService`] around a group of tests.
#[derive(Debug)]
pub struct DriverServiceResource<S: DriverService> {
    service: S,
}

impl<S: DriverService> DriverServiceResource<S> {
    /// Wraps a service that has not been started yet.
    pub fn new(service: S) -> Self {
        Self { service }
    }

    /// Starts the service.
    ///
    /// # Errors
    ///
    /// Propagates the start error of the service.
    pub fn start(&mut self) -> Result<()> {
        info!(service = self.service.name(), "starting driver service");
        self.service.start()
    }

    /// Stops the service, logging teardown errors.
    pub fn stop(&mut self) {
        match self.service.stop() {
            Ok(()) => debug!(service = self.service.name(), "driver service stopped"),
            Err(e) => warn!(service = self.service.name(), "failed to stop driver service: {e:#}"),
        }
    }

    /// The wrapped service.
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Mutable access to the wrapped service.
    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }

    /// Starts the service, runs `f`, and stops the service again even if
    /// `f` panics.
    ///
    /// # Errors
    ///
    /// Returns the start error; `f` is not run in that case.
    pub fn scoped<T>(&mut self, f: impl FnOnce(&S) -> T) -> Result<T> {
        self.start()?;
        let result = panic::catch_unwind(AssertUnwindSafe(|| f(&self.service)));
        self.stop();
        match result {
            Ok(value) => Ok(value),
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}

impl<S: DriverService> Drop for DriverServiceResource<S> {
    fn drop(&mut self) {
        if self.service.is_running() {
            self.stop();
        }
    }
}

/// Runs an executable as a driver service.
///
/// ```ignore
/// let service = CommandService::new("chromedriver", "/usr/bin/chromedriver")
///     .arg("--port=9515")
///     .with_url("http://localhost:9515");
/// ```
#[derive(Debug)]
pub struct CommandService {
    name: String,
    program: PathBuf,
    args: Vec<String>,
    url: Option<String>,
    child: Option<Child>,
}

impl CommandService {
    /// Creates a service running `program` without arguments.
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            url: None,
            child: None,
        }
    }

    /// Appends a command line argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets the address reported by [`DriverService::url`].
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Process id of the running service.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }
}

impl DriverService for CommandService {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| RuleError::ServiceStart {
                name: self.name.clone(),
                source,
            })?;
        debug!(service = %self.name, pid = child.id(), "driver service spawned");
        self.child = Some(child);
        Ok(())
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if child.try_wait()?.is_none() {
            child.kill()?;
        }
        let status = child.wait()?;
        debug!(service = %self.name, %status, "driver service exited");
        Ok(())
    }

    fn is_running(&mut self) -> bool {
        self.child
            .as_mut()
            .is_some_and(|child| matches!(child.try_wait(), Ok(None)))
    }

    fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }
}
