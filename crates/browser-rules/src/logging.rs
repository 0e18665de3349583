//! Tracing subscriber setup for test binaries.
//!
//! The rules log through `tracing`; nothing is printed unless a subscriber is
//! installed. Test suites either call [`init_logging`] once from their
//! harness or [`init_test_logging`] at the top of individual tests.
//!
//! # Verbosity
//!
//! 1. `verbose`: DEBUG for `browser_rules` crates
//! 2. `quiet`: ERROR only
//! 3. `RUST_LOG` environment variable: custom filter
//! 4. Default: INFO for `browser_rules` crates
//!
//! ```rust,no_run
//! use browser_rules::logging::init_logging;
//!
//! init_logging(false, false, !browser_rules::logging::should_use_colors());
//! ```

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const VERBOSE_FILTER: &str = "browser_rules=debug,browser_rules_chrome=debug";
const QUIET_FILTER: &str = "browser_rules=error,browser_rules_chrome=error";
const DEFAULT_FILTER: &str = "browser_rules=info,browser_rules_chrome=info";

/// Builds the filter for the given flags; `verbose` wins over `quiet`.
fn filter_for(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Installs the global subscriber.
///
/// Returns false if a subscriber was already installed, in which case the
/// existing one stays in place.
pub fn init_logging(verbose: bool, quiet: bool, no_color: bool) -> bool {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color)
        .compact();

    tracing_subscriber::registry()
        .with(filter_for(verbose, quiet))
        .with(fmt_layer)
        .try_init()
        .is_ok()
}

/// Installs a subscriber writing through the test harness capture.
///
/// Safe to call from every test; only the first call has an effect.
pub fn init_test_logging() {
    let _ = tracing_subscriber::registry()
        .with(filter_for(false, false))
        .with(fmt::layer().with_test_writer().with_ansi(false).compact())
        .try_init();
}

/// Checks whether colored output should be enabled.
///
/// `NO_COLOR` disables colors, `FORCE_COLOR` forces them; otherwise the
/// terminal capabilities of stdout decide.
#[must_use]
pub fn should_use_colors() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var_os("FORCE_COLOR").is_some() {
        return true;
    }
    console::Term::stdout().features().colors_supported()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_tolerates_repeated_calls() {
        init_test_logging();
        init_test_logging();
        // Another subscriber is already installed by now.
        assert!(!init_logging(true, false, true));
    }
}
