//! Chrome launch configuration.

use std::path::{Path, PathBuf};

use chromiumoxide::browser::BrowserConfig;
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{ChromeError, Result};

/// Name of the configuration table read by [`ChromeConfig::from_figment`].
pub const CONFIG_TABLE: &str = "chrome";

/// How to launch Chrome for a test attempt.
///
/// Defaults target headless runs in CI containers. Loaded from the
/// `[chrome]` table of the rules configuration:
///
/// ```toml
/// [chrome]
/// headless = false
/// window_size = [1280, 800]
/// chrome_path = "/usr/bin/chromium"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromeConfig {
    /// Run without a visible window (default: true, false with the
    /// `visible` feature).
    pub headless: bool,

    /// Browser window size (default: 1920x1080).
    pub window_size: (u32, u32),

    /// Chrome command line arguments.
    pub args: Vec<String>,

    /// Chrome executable; auto-detected when absent.
    pub chrome_path: Option<PathBuf>,

    /// Page opened right after launch.
    pub start_url: String,
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            headless: !cfg!(feature = "visible"),
            window_size: (1920, 1080),
            args: vec![
                // Required where user namespaces are unavailable (containers).
                // Only for isolated test environments.
                "--no-sandbox".to_string(),
                // Prevents /dev/shm exhaustion in containers
                "--disable-dev-shm-usage".to_string(),
            ],
            chrome_path: None,
            start_url: "about:blank".to_string(),
        }
    }
}

impl ChromeConfig {
    /// Creates a config with defaults for headless testing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the `[chrome]` table; missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ChromeError::Config`] if the table has invalid values.
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        figment
            .focus(CONFIG_TABLE)
            .extract()
            .map_err(|e| ChromeError::Config(e.to_string()))
    }

    /// Shows the browser window, for debugging.
    #[must_use]
    pub fn visible(mut self) -> Self {
        self.headless = false;
        self
    }

    /// Sets the window size.
    #[must_use]
    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window_size = (width, height);
        self
    }

    /// Appends Chrome arguments.
    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Uses a specific Chrome executable.
    #[must_use]
    pub fn with_chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }

    /// Sets the page opened after launch.
    #[must_use]
    pub fn with_start_url(mut self, url: impl Into<String>) -> Self {
        self.start_url = url.into();
        self
    }

    /// Command line passed to Chrome for a profile in `user_data_dir`.
    pub(crate) fn launch_args(&self, user_data_dir: &Path) -> Vec<String> {
        let mut args = vec![
            format!("--window-size={},{}", self.window_size.0, self.window_size.1),
            // A profile per launch avoids ProcessSingleton conflicts between
            // parallel tests.
            format!("--user-data-dir={}", user_data_dir.display()),
        ];
        args.extend(self.args.iter().cloned());
        args
    }

    /// Converts to a chromiumoxide `BrowserConfig` using a fresh profile
    /// directory, which is returned alongside.
    pub(crate) fn to_browser_config(&self) -> Result<(BrowserConfig, PathBuf)> {
        let user_data_dir =
            std::env::temp_dir().join(format!("browser-rules-chrome-{}", uuid::Uuid::new_v4()));

        let mut builder = BrowserConfig::builder();
        if !self.headless {
            builder = builder.with_head();
        }
        for arg in self.launch_args(&user_data_dir) {
            builder = builder.arg(arg);
        }
        if let Some(path) = &self.chrome_path {
            builder = builder.chrome_executable(path.clone());
        }

        let config = builder.build().map_err(|e| ChromeError::LaunchFailed {
            reason: format!("invalid browser configuration: {e}"),
            source: None,
        })?;
        Ok((config, user_data_dir))
    }
}
