//! The ways a test invocation can end other than by passing.
//!
//! Test bodies return `Result<(), Failure>`. Any `std::error::Error` converts
//! into [`Failure::Error`] through `?`, and panics raised by assertions inside
//! the body are caught by the chain and turned into [`Failure::Assertion`].
//! `Failure` deliberately does not implement `std::error::Error` itself so
//! that the blanket conversion stays coherent, the same trick `anyhow` uses.
//!
//! Assertion failures remember where they were raised: the call site of
//! [`Failure::assertion`] or [`fail!`], or the panic location for caught
//! panics, plus a backtrace when `RUST_BACKTRACE` enables one.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::Once;

use crate::error::RuleError;
use crate::retry::RetryError;

/// Why a test invocation did not pass.
pub enum Failure {
    /// An assumption of the test was not met; the test is skipped.
    Skipped {
        /// Human readable reason
        reason: String,
    },

    /// An assertion-style failure, including panics caught from the body.
    Assertion {
        /// The assertion message
        message: String,
        /// `file:line:column` where the assertion was raised, if known
        location: Option<String>,
        /// Stack at the point of failure
        backtrace: Backtrace,
    },

    /// Any other error raised by the test body or a decorator.
    Error(anyhow::Error),

    /// A severe error that must surface immediately and is never retried.
    Fatal(anyhow::Error),

    /// The driver resource could not provide a driver.
    Driver(RuleError),

    /// A flaky test failed on every permitted execution.
    RetriesExhausted(RetryError),
}

impl Failure {
    /// Creates a skip signal.
    pub fn skip(reason: impl Into<String>) -> Self {
        Failure::Skipped {
            reason: reason.into(),
        }
    }

    /// Creates an assertion failure located at the caller.
    #[track_caller]
    pub fn assertion(message: impl Into<String>) -> Self {
        Failure::Assertion {
            message: message.into(),
            location: Some(Location::caller().to_string()),
            backtrace: Backtrace::capture(),
        }
    }

    /// Marks an error as fatal so it bypasses any retry.
    pub fn fatal(error: impl Into<anyhow::Error>) -> Self {
        Failure::Fatal(error.into())
    }

    /// Converts a panic payload caught from a test body.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>, site: Option<PanicSite>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "test panicked with a non-string payload".to_string()
        };
        let (location, backtrace) = match site {
            Some(site) => (site.location, site.backtrace),
            None => (None, Backtrace::disabled()),
        };
        Failure::Assertion {
            message,
            location,
            backtrace,
        }
    }

    /// Returns true for [`Failure::Skipped`].
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Failure::Skipped { .. })
    }

    /// Where an assertion failure was raised, as `file:line:column`.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        match self {
            Failure::Assertion { location, .. } => location.as_deref(),
            _ => None,
        }
    }

    /// The captured stack of an assertion failure, if backtraces are enabled.
    #[must_use]
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            Failure::Assertion { backtrace, .. }
                if backtrace.status() == BacktraceStatus::Captured =>
            {
                Some(backtrace)
            }
            _ => None,
        }
    }

    /// Returns the aggregate error when retries were exhausted.
    #[must_use]
    pub fn as_retry_error(&self) -> Option<&RetryError> {
        match self {
            Failure::RetriesExhausted(err) => Some(err),
            _ => None,
        }
    }

    /// Adds context to errors raised outside the test body.
    pub(crate) fn context(self, context: String) -> Self {
        match self {
            Failure::Error(err) => Failure::Error(err.context(context)),
            Failure::Fatal(err) => Failure::Fatal(err.context(context)),
            other => other,
        }
    }
}

impl<E> From<E> for Failure
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Failure::Error(anyhow::Error::new(error))
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Skipped { reason } => write!(f, "skipped: {reason}"),
            Failure::Assertion { message, .. } => write!(f, "assertion failed: {message}"),
            Failure::Error(err) => write!(f, "{err:#}"),
            Failure::Fatal(err) => write!(f, "fatal: {err:#}"),
            Failure::Driver(err) => write!(f, "{err}"),
            Failure::RetriesExhausted(err) => write!(f, "{err}"),
        }
    }
}

// Debug is what `#[test] fn .. -> Result<(), Failure>` prints, so keep it readable.
impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Assertion { message, .. } => {
                write!(f, "assertion failed: {message}")?;
                if let Some(location) = self.location() {
                    write!(f, "\n    at {location}")?;
                }
                if let Some(backtrace) = self.backtrace() {
                    write!(f, "\n\nStack backtrace:\n{backtrace}")?;
                }
                Ok(())
            }
            Failure::Error(err) => write!(f, "{err:?}"),
            Failure::Fatal(err) => write!(f, "fatal: {err:?}"),
            Failure::Driver(err) => {
                write!(f, "{err}")?;
                let mut source = std::error::Error::source(err);
                while let Some(cause) = source {
                    write!(f, "\n    caused by: {cause}")?;
                    source = cause.source();
                }
                Ok(())
            }
            other => fmt::Display::fmt(other, f),
        }
    }
}

/// Where a caught panic happened.
pub(crate) struct PanicSite {
    location: Option<String>,
    backtrace: Backtrace,
}

thread_local! {
    static CATCHING: Cell<bool> = const { Cell::new(false) };
    static LAST_PANIC: RefCell<Option<PanicSite>> = const { RefCell::new(None) };
}

static INSTALL_HOOK: Once = Once::new();

// Chains onto the existing hook; only panics raised inside `catch_panic` on
// the same thread are recorded instead of printed.
fn install_panic_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if CATCHING.try_with(Cell::get).unwrap_or(false) {
                let site = PanicSite {
                    location: info.location().map(ToString::to_string),
                    backtrace: Backtrace::capture(),
                };
                let _ = LAST_PANIC.try_with(|slot| slot.replace(Some(site)));
            } else {
                previous(info);
            }
        }));
    });
}

/// Runs `f`, turning a panic into a [`Failure::Assertion`] that keeps the
/// panic location and backtrace.
pub(crate) fn catch_panic<T>(f: impl FnOnce() -> T) -> Result<T, Failure> {
    install_panic_hook();
    LAST_PANIC.with(|slot| slot.borrow_mut().take());
    let outer = CATCHING.with(|catching| catching.replace(true));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    CATCHING.with(|catching| catching.set(outer));

    result.map_err(|payload| {
        let site = LAST_PANIC.with(|slot| slot.borrow_mut().take());
        Failure::from_panic(payload, site)
    })
}

/// Skips the test unless `condition` holds.
///
/// # Errors
///
/// Returns [`Failure::Skipped`] when the condition is false.
pub fn assume(condition: bool, reason: impl Into<String>) -> Result<(), Failure> {
    if condition {
        Ok(())
    } else {
        Err(Failure::skip(reason))
    }
}

/// Returns early with [`Failure::Skipped`] unless the condition holds.
///
/// ```ignore
/// assume!(std::env::var("CI").is_ok(), "only runs in CI");
/// ```
#[macro_export]
macro_rules! assume {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return ::std::result::Result::Err($crate::Failure::skip(format!($($arg)+)));
        }
    };
    ($cond:expr $(,)?) => {
        if !$cond {
            return ::std::result::Result::Err($crate::Failure::skip(
                concat!("assumption failed: ", stringify!($cond)),
            ));
        }
    };
}

/// Returns early with an assertion [`Failure`].
#[macro_export]
macro_rules! fail {
    ($($arg:tt)+) => {
        return ::std::result::Result::Err($crate::Failure::assertion(format!($($arg)+)))
    };
}
