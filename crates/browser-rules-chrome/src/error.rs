//! Error types for the Chrome driver.
//!
//! Distinguishes launch failures, which surface through the driver factory,
//! from failures of individual page operations inside a test body.

use browser_rules::RuleError;
use thiserror::Error;

/// The error type for Chrome driver operations.
#[derive(Debug, Error)]
pub enum ChromeError {
    /// Failed to launch the browser process.
    ///
    /// This typically occurs when Chrome/Chromium is not installed,
    /// or when there are permission issues with the executable.
    #[error("failed to launch browser: {reason}")]
    LaunchFailed {
        /// Human-readable reason for the launch failure
        reason: String,
        /// Optional underlying error that caused the failure
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The private runtime driving the browser could not be created.
    #[error("failed to start the driver runtime")]
    Runtime(#[source] std::io::Error),

    /// The DevTools connection failed after launch.
    #[error("CDP connection failed: {0}")]
    ConnectionFailed(String),

    /// Navigation to a URL failed.
    #[error("navigation to '{url}' failed: {reason}")]
    NavigationFailed {
        /// The URL that failed to load
        url: String,
        /// Reason for the navigation failure
        reason: String,
    },

    /// JavaScript execution in the page context failed.
    #[error("JavaScript execution failed: {0}")]
    ScriptExecutionFailed(String),

    /// Capturing a screenshot failed.
    #[error("screenshot capture failed: {0}")]
    ScreenshotFailed(String),

    /// A wait inside the page timed out.
    #[error(transparent)]
    Wait(#[from] RuleError),

    /// An operation was attempted on a closed browser.
    #[error("browser instance is already closed")]
    AlreadyClosed,

    /// Wraps errors from the chromiumoxide library.
    #[error("chromiumoxide error: {0}")]
    ChromiumOxide(#[from] chromiumoxide::error::CdpError),

    /// The `[chrome]` configuration table is invalid.
    #[error("invalid chrome configuration: {0}")]
    Config(String),
}

/// A specialized Result type for Chrome driver operations.
pub type Result<T> = std::result::Result<T, ChromeError>;
