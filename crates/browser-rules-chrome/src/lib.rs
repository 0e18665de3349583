//! # browser-rules-chrome
//!
//! Headless Chrome driver for `browser-rules`, built on chromiumoxide.
//!
//! [`ChromeDriverFactory`] plugs into a
//! [`BrowserRule`](browser_rules::BrowserRule): each test attempt launches a
//! fresh browser with its own profile and quits it afterwards.
//!
//! ## Example Usage
//!
//! ```ignore
//! use browser_rules::{BrowserRule, OutputType, RetryConfig, RulesConfig, TestDescription, TracingReporter};
//! use browser_rules_chrome::{ChromeConfig, ChromeDriverFactory};
//! use std::sync::Arc;
//!
//! #[test]
//! #[ignore] // Requires Chrome to be installed
//! fn home_page_has_title() -> Result<(), browser_rules::Failure> {
//!     let figment = RulesConfig::figment(None);
//!     let config = RulesConfig::from_figment(&figment)?;
//!     let factory = ChromeDriverFactory::new(ChromeConfig::from_figment(&figment)?);
//!     let mut rule = BrowserRule::from_config(&config, factory, Arc::new(TracingReporter::new()))?;
//!
//!     rule.run(&TestDescription::new("Home", "has_title"), |ctx| {
//!         let driver = ctx.driver()?;
//!         driver.navigate("http://localhost:8080/")?;
//!         assert_eq!(driver.title()?, "Home");
//!         Ok(())
//!     })
//! }
//! ```
//!
//! ## Testing Strategy
//!
//! Configuration is unit tested; everything that launches Chrome lives in
//! `tests/integration.rs` and is `#[ignore]`d. Run it with
//! `cargo test -p browser-rules-chrome -- --ignored`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod driver;
pub mod error;

// Re-export main types for convenience
pub use config::{CONFIG_TABLE, ChromeConfig};
pub use driver::{ChromeDriver, ChromeDriverFactory};
pub use error::{ChromeError, Result};
