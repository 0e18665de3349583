//! Failure classification for retry decisions.
//!
//! ```text
//! Failure
//! ├── Skip
//! │   └── Skipped            - assumption not met, never counted
//! ├── Fatal
//! │   ├── Fatal              - explicitly severe
//! │   ├── Driver             - resource creation / usage error
//! │   ├── RetriesExhausted   - already aggregated by an inner retry rule
//! │   ├── Error(driver)      - no driver to run against, anywhere in the chain
//! │   └── Error(OOM)         - resource exhaustion anywhere in the chain
//! └── Retryable
//!     ├── Assertion
//!     └── Error              - everything else
//! ```

use std::collections::TryReserveError;

use crate::error::RuleError;
use crate::failure::Failure;

/// What the retry engine should do with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Record the failure and run the test again if attempts remain.
    Retryable,
    /// Propagate immediately, unrecorded.
    Fatal,
    /// The test was skipped; propagate immediately, never counted.
    Skip,
}

impl Classification {
    /// Returns true if another attempt may follow.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Classification::Retryable)
    }
}

/// Classifies a failure raised by a flaky test.
///
/// Whether the test is eligible for retries at all is decided earlier by
/// [`RetryRule::applies_to`](crate::retry::RetryRule::applies_to).
#[must_use]
pub fn classify(failure: &Failure) -> Classification {
    match failure {
        Failure::Skipped { .. } => Classification::Skip,
        Failure::Fatal(_) | Failure::Driver(_) | Failure::RetriesExhausted(_) => {
            Classification::Fatal
        }
        Failure::Error(err) if is_driver_unavailable(err) || is_resource_exhaustion(err) => {
            Classification::Fatal
        }
        Failure::Assertion { .. } | Failure::Error(_) => Classification::Retryable,
    }
}

// `TestContext::driver()?` and `DriverResource::handle()?` arrive here as
// plain errors; another attempt would not give them a driver either.
fn is_driver_unavailable(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<RuleError>(),
            Some(RuleError::DriverUninitialized | RuleError::DriverCreation { .. })
        )
    })
}

fn is_resource_exhaustion(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io| io.kind() == std::io::ErrorKind::OutOfMemory)
            || cause.is::<TryReserveError>()
    })
}
