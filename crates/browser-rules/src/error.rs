//! Error types raised by the rules themselves.
//!
//! These are usage and construction errors: an invalid retry count, a driver
//! factory that produced nothing, a driver asked for before it exists.
//! Failures of the test under execution are modelled separately by
//! [`Failure`](crate::failure::Failure).

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The error type for rule construction, configuration and driver management.
#[derive(Debug, Error)]
pub enum RuleError {
    /// A negative retry count was supplied.
    #[error("The number of retries needs to be an integer >= 0 but was: {0}")]
    InvalidRetries(i64),

    /// An aggregate retry error was requested without any failures.
    #[error("The list of failures must not be empty")]
    EmptyFailures,

    /// The driver factory returned an error or no driver at all.
    #[error("driver factory failed creating a new driver: {reason}")]
    DriverCreation {
        /// Why creation failed
        reason: String,
        /// Error reported by the factory, if any
        #[source]
        source: Option<anyhow::Error>,
    },

    /// The driver was requested before it was created.
    #[error("the driver has not been initialized yet")]
    DriverUninitialized,

    /// A driver service could not be started.
    #[error("driver service '{name}' failed to start")]
    ServiceStart {
        /// Service name used in logs
        name: String,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// A wait condition was not satisfied within the timeout.
    #[error("wait condition '{condition}' timed out after {timeout:?}")]
    WaitTimeout {
        /// Description of the condition that timed out
        condition: String,
        /// How long we waited before timing out
        timeout: Duration,
    },

    /// A screenshot could not be stored.
    #[error("failed to write screenshot to {path}")]
    ScreenshotWrite {
        /// Target file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The configuration could not be loaded or is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<figment::Error> for RuleError {
    fn from(err: figment::Error) -> Self {
        RuleError::Config(err.to_string())
    }
}

/// A specialized Result type for rule operations.
pub type Result<T> = std::result::Result<T, RuleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_retries_message() {
        assert_eq!(
            RuleError::InvalidRetries(-1).to_string(),
            "The number of retries needs to be an integer >= 0 but was: -1"
        );
    }

    #[test]
    fn driver_creation_keeps_source() {
        let err = RuleError::DriverCreation {
            reason: "chrome exited".into(),
            source: Some(anyhow::anyhow!("exit status 1")),
        };
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("exit status 1"));
    }
}
