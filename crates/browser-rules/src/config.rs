//! Rule configuration loaded from files and the environment.
//!
//! Sources, later ones winning:
//!
//! 1. built-in defaults
//! 2. `browser-rules.toml` in the working directory, or an explicit file
//! 3. `BROWSER_RULES_*` environment variables, nested keys split on `__`
//!    (`BROWSER_RULES_LOG__ON_START=false`)
//!
//! ```toml
//! retries = 2
//!
//! [log]
//! on_start = true
//! on_finish = true
//! page_source_on_failure = true
//!
//! [screenshot]
//! format = "file"
//! dir = "target/screenshots"
//!
//! [chrome]
//! headless = true
//! ```
//!
//! Driver crates read their own tables (such as `[chrome]`) from the same
//! [`Figment`] returned by [`RulesConfig::figment`].

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format as _, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RuleError};
use crate::retry::RetryConfig;
use crate::screenshot::OutputType;
use crate::test_logger::LogEvents;

/// Default configuration file name.
pub const CONFIG_FILE: &str = "browser-rules.toml";

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "BROWSER_RULES_";

/// Which logging decorators to install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Report test starts.
    pub on_start: bool,
    /// Report test outcomes.
    pub on_finish: bool,
    /// Report the page source of failing tests.
    pub page_source_on_failure: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            on_start: true,
            on_finish: true,
            page_source_on_failure: false,
        }
    }
}

impl LogConfig {
    /// The [`TestLogger`](crate::test_logger::TestLogger) events selected, or
    /// `None` when both are off.
    #[must_use]
    pub fn events(&self) -> Option<LogEvents> {
        (self.on_start || self.on_finish).then_some(LogEvents {
            on_start: self.on_start,
            on_finish: self.on_finish,
        })
    }
}

/// Configuration of a [`BrowserRule`](crate::rule::BrowserRule).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Extra executions for flaky tests; must be `>= 0`.
    pub retries: i64,

    /// Logging decorators.
    pub log: LogConfig,

    /// Screenshot output on failure; no screenshots when absent.
    pub screenshot: Option<OutputType>,
}

impl RulesConfig {
    /// Builds the layered figment: defaults, then the config file, then the
    /// environment.
    ///
    /// With `path == None`, `browser-rules.toml` is used when it exists.
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        let config_file = path.map(Path::to_path_buf).or_else(|| {
            let default_path = Path::new(CONFIG_FILE);
            default_path.exists().then(|| default_path.to_path_buf())
        });
        if let Some(file) = config_file {
            figment = figment.merge(Toml::file(file));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Loads and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Config`] if an explicit `path` does not exist, a
    /// source cannot be parsed, or the result fails [`validate`](Self::validate).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path.filter(|p| !p.exists()) {
            return Err(RuleError::Config(format!(
                "configuration file {} does not exist",
                path.display()
            )));
        }
        Self::from_figment(&Self::figment(path))
    }

    /// Extracts and validates the configuration from `figment`.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Config`] on extraction or validation failure.
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values serde cannot check.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidRetries`] for a negative retry count and
    /// [`RuleError::Config`] for a file screenshot output without directory.
    pub fn validate(&self) -> Result<()> {
        self.retry_config()?;
        if let Some(OutputType::File { dir }) = &self.screenshot {
            if dir.as_os_str().is_empty() {
                return Err(RuleError::Config(
                    "screenshot.dir must be set when screenshot.format is \"file\"".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// The retry configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidRetries`] for a negative retry count.
    pub fn retry_config(&self) -> Result<RetryConfig> {
        RetryConfig::new(self.retries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use std::path::PathBuf;

    #[test]
    fn defaults_without_sources() {
        Jail::expect_with(|_jail| {
            let config = RulesConfig::load(None).map_err(|e| e.to_string())?;
            assert_eq!(config, RulesConfig::default());
            assert_eq!(config.log.events(), Some(LogEvents::ALL));
            Ok(())
        });
    }

    #[test]
    fn file_then_environment() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
                    retries = 2

                    [log]
                    on_start = false
                    page_source_on_failure = true

                    [screenshot]
                    format = "file"
                    dir = "shots"

                    [chrome]
                    headless = false
                "#,
            )?;
            jail.set_env("BROWSER_RULES_RETRIES", "4");
            jail.set_env("BROWSER_RULES_LOG__ON_FINISH", "false");

            let config = RulesConfig::load(None).map_err(|e| e.to_string())?;

            assert_eq!(config.retries, 4);
            assert_eq!(config.log.events(), None);
            assert!(config.log.page_source_on_failure);
            assert_eq!(
                config.screenshot,
                Some(OutputType::File {
                    dir: PathBuf::from("shots")
                })
            );
            Ok(())
        });
    }

    #[test]
    fn negative_retries_are_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("BROWSER_RULES_RETRIES", "-1");
            let err = RulesConfig::load(None).unwrap_err();
            assert!(matches!(err, RuleError::InvalidRetries(-1)));
            Ok(())
        });
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        Jail::expect_with(|_jail| {
            let err = RulesConfig::load(Some(Path::new("missing.toml"))).unwrap_err();
            assert!(err.to_string().contains("missing.toml"));
            Ok(())
        });
    }

    #[test]
    fn explicit_file_is_used() {
        Jail::expect_with(|jail| {
            jail.create_file("ci.toml", "retries = 1\n[screenshot]\nformat = \"bytes\"")?;
            let config = RulesConfig::load(Some(Path::new("ci.toml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.retry_config().map_err(|e| e.to_string())?.max_retries(), 1);
            assert_eq!(config.screenshot, Some(OutputType::Bytes));
            Ok(())
        });
    }

    #[test]
    fn file_screenshots_need_a_directory() {
        let config = RulesConfig {
            screenshot: Some(OutputType::File { dir: PathBuf::new() }),
            ..RulesConfig::default()
        };
        assert!(matches!(config.validate(), Err(RuleError::Config(_))));
    }
}
