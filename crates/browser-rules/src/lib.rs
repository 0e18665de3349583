//! # browser-rules
//!
//! Composable lifecycle rules for browser-driven tests.
//!
//! A test body runs inside a [`BrowserRule`], which gives every attempt a
//! fresh driver, runs lifecycle decorators around it and retries tests that
//! opted in as flaky.
//!
//! ## Architecture
//!
//! - **RetryRule**: re-runs flaky tests and aggregates their failures
//! - **classify**: decides whether a failure may be retried
//! - **DecoratorChain**: ordered start/outcome/finish hooks around a body
//! - **DriverResource**: acquires and always releases one driver per attempt
//! - **Reporter**: sink for lifecycle events, page sources and screenshots
//! - **DriverServiceResource**: suite-scoped driver processes
//!
//! ## Example Usage
//!
//! ```ignore
//! use browser_rules::{BrowserRule, Failure, TestDescription, RetryConfig};
//!
//! #[test]
//! fn login_form_is_shown() -> Result<(), Failure> {
//!     let mut rule = BrowserRule::configure(my_factory())
//!         .retry(RetryConfig::new(2)?)
//!         .build();
//!
//!     rule.run(&TestDescription::new("Login", "form_is_shown").flaky(), |ctx| {
//!         let driver = ctx.driver()?;
//!         assert!(driver.page_source()?.contains("<form"));
//!         Ok(())
//!     })
//! }
//! ```
//!
//! ## Testing Strategy
//!
//! Unit tests drive the rules with an in-memory driver; the
//! `browser-rules-chrome` crate carries the real-browser tests, which are
//! `#[ignore]`d because they need Chrome installed.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod chain;
pub mod classify;
pub mod config;
pub mod description;
pub mod driver;
pub mod error;
pub mod failure;
pub mod logging;
pub mod reporter;
pub mod retry;
pub mod rule;
pub mod screenshot;
pub mod service;
pub mod test_logger;
pub mod wait;

// Re-export main types for convenience
pub use chain::{Decorator, DecoratorChain, Hooks, TestContext, TestState};
pub use classify::{Classification, classify};
pub use config::{LogConfig, RulesConfig};
pub use description::{FLAKY_TAG, TestDescription};
pub use driver::{DriverFactory, DriverResource, WebDriver};
pub use error::{Result, RuleError};
pub use failure::{Failure, assume};
pub use reporter::{Level, MemoryReporter, ReportEvent, Reporter, TracingReporter};
pub use retry::{FailureRecord, RetryConfig, RetryError, RetryReport, RetryRule};
pub use rule::{BrowserRule, BrowserRuleBuilder};
pub use screenshot::{OutputType, Screenshot, ScreenshotOnFailure};
pub use service::{CommandService, DriverService, DriverServiceResource};
pub use test_logger::{LogEvents, PageSourceOnFailure, TestLogger};
pub use wait::{DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT, Wait};
