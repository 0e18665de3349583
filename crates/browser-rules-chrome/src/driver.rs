//! Blocking Chrome driver on top of chromiumoxide.
//!
//! The rules are synchronous, chromiumoxide is async. Every [`ChromeDriver`]
//! owns a small private tokio runtime that drives the DevTools connection
//! and blocks on each page operation.
//!
//! # Resource Safety
//!
//! [`WebDriver::quit`] closes the browser gracefully. A driver dropped
//! without quitting still kills the Chrome process through chromiumoxide's
//! own Drop. Neither must happen inside another async runtime: dropping the
//! private runtime there panics.

use std::path::PathBuf;
use std::time::Duration;

use browser_rules::{DriverFactory, Wait, WebDriver};
use chromiumoxide::Page;
use chromiumoxide::browser::Browser;
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::ChromeConfig;
use crate::error::{ChromeError, Result};

/// A Chrome instance with one open page.
pub struct ChromeDriver {
    page: Page,
    browser: Option<Browser>,
    handler: JoinHandle<()>,
    user_data_dir: PathBuf,
    wait: Wait,
    // Dropped last; everything above needs it alive.
    runtime: Runtime,
}

impl ChromeDriver {
    /// Launches Chrome and opens `config.start_url`.
    ///
    /// # Errors
    ///
    /// Returns `LaunchFailed` if Chrome is not installed or fails to start,
    /// and `ConnectionFailed` if the first page cannot be opened.
    pub fn launch(config: &ChromeConfig) -> Result<Self> {
        debug!("Launching browser with config: {:?}", config);

        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("browser-rules-chrome")
            .enable_all()
            .build()
            .map_err(ChromeError::Runtime)?;

        let (browser_config, user_data_dir) = config.to_browser_config()?;

        let (browser, mut handler) =
            runtime
                .block_on(Browser::launch(browser_config))
                .map_err(|e| ChromeError::LaunchFailed {
                    reason: "failed to launch Chrome process".to_string(),
                    source: Some(Box::new(e)),
                })?;

        // chromiumoxide only processes CDP events while the handler is polled
        let handler = runtime.spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("Browser handler error: {}", e);
                }
            }
        });

        let page = runtime
            .block_on(browser.new_page(config.start_url.as_str()))
            .map_err(|e| ChromeError::ConnectionFailed(e.to_string()))?;

        debug!(profile = %user_data_dir.display(), "Browser launched successfully");

        Ok(Self {
            page,
            browser: Some(browser),
            handler,
            user_data_dir,
            wait: Wait::default(),
            runtime,
        })
    }

    /// Uses `wait` for page loads and selector waits.
    #[must_use]
    pub fn with_wait(mut self, wait: Wait) -> Self {
        self.wait = wait;
        self
    }

    /// Navigates to an absolute URL and waits until the document is ready.
    ///
    /// # Errors
    ///
    /// Returns `NavigationFailed` if the page fails to load, or a wait error
    /// if it never becomes ready.
    pub fn navigate(&self, url: &str) -> Result<()> {
        self.runtime
            .block_on(self.page.goto(url))
            .map_err(|e| ChromeError::NavigationFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        self.wait_for_load()
    }

    /// Waits for `document.readyState` to become `complete`.
    ///
    /// # Errors
    ///
    /// Returns a wait error on timeout.
    pub fn wait_for_load(&self) -> Result<()> {
        self.wait.until_true("document ready", || {
            let state: String = self.evaluate("document.readyState")?;
            Ok(state == "complete")
        })?;
        Ok(())
    }

    /// Waits for a CSS selector to match an element.
    ///
    /// # Errors
    ///
    /// Returns a wait error on timeout.
    pub fn wait_for_selector(&self, selector: &str) -> Result<()> {
        // JSON encoding escapes quotes, backticks and newlines safely
        let escaped = serde_json::to_string(selector)
            .map_err(|e| ChromeError::ScriptExecutionFailed(e.to_string()))?;
        let script = format!("!!document.querySelector({escaped})");

        self.wait.until_true(&format!("selector '{selector}'"), || {
            Ok(self.evaluate::<bool>(&script)?)
        })?;
        Ok(())
    }

    /// Evaluates JavaScript in the page and deserializes the result.
    ///
    /// Do not pass unsanitized input; see [`wait_for_selector`](Self::wait_for_selector)
    /// for escaping values into scripts.
    ///
    /// # Errors
    ///
    /// Returns `ScriptExecutionFailed` if the script throws or the result
    /// does not deserialize into `T`.
    pub fn evaluate<T: DeserializeOwned>(&self, script: &str) -> Result<T> {
        let result = self
            .runtime
            .block_on(self.page.evaluate(script))
            .map_err(|e| ChromeError::ScriptExecutionFailed(e.to_string()))?;
        result
            .into_value()
            .map_err(|e| ChromeError::ScriptExecutionFailed(e.to_string()))
    }

    /// Returns the page title.
    ///
    /// # Errors
    ///
    /// Returns an error if script execution fails.
    pub fn title(&self) -> Result<String> {
        self.evaluate("document.title")
    }

    /// Returns the current page URL.
    ///
    /// # Errors
    ///
    /// Returns an error if script execution fails.
    pub fn url(&self) -> Result<String> {
        self.evaluate("window.location.href")
    }

    /// Blocks for `duration`, letting the browser keep processing events.
    pub fn pause(&self, duration: Duration) {
        self.runtime.block_on(tokio::time::sleep(duration));
    }

    /// The underlying chromiumoxide page, for operations not wrapped here.
    ///
    /// Futures obtained from it must be driven by [`block_on`](Self::block_on).
    #[must_use]
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Runs a future on the driver's runtime.
    pub fn block_on<T>(&self, future: impl std::future::Future<Output = T>) -> T {
        self.runtime.block_on(future)
    }
}

impl WebDriver for ChromeDriver {
    type Error = ChromeError;

    fn page_source(&self) -> Result<String> {
        Ok(self.runtime.block_on(self.page.content())?)
    }

    fn screenshot_png(&self) -> Result<Vec<u8>> {
        self.runtime
            .block_on(self.page.screenshot(ScreenshotParams::default()))
            .map_err(|e| ChromeError::ScreenshotFailed(e.to_string()))
    }

    fn quit(mut self) -> Result<()> {
        let mut browser = self.browser.take().ok_or(ChromeError::AlreadyClosed)?;
        debug!("Closing browser gracefully");
        self.runtime.block_on(async {
            browser.close().await?;
            // Reap the process so no zombie outlives the test
            if let Err(e) = browser.wait().await {
                debug!("waiting for browser exit failed: {e}");
            }
            Ok::<_, ChromeError>(())
        })
    }
}

impl Drop for ChromeDriver {
    fn drop(&mut self) {
        if self.browser.is_some() {
            warn!("ChromeDriver dropped without quit() - forcing shutdown via Drop");
        }
        self.handler.abort();
        if let Err(e) = std::fs::remove_dir_all(&self.user_data_dir) {
            debug!(profile = %self.user_data_dir.display(), "profile cleanup skipped: {e}");
        }
    }
}

/// Launches a fresh [`ChromeDriver`] for every test attempt.
#[derive(Debug, Clone, Default)]
pub struct ChromeDriverFactory {
    config: ChromeConfig,
}

impl ChromeDriverFactory {
    /// Creates a factory launching Chrome with `config`.
    #[must_use]
    pub fn new(config: ChromeConfig) -> Self {
        Self { config }
    }

    /// The launch configuration.
    #[must_use]
    pub fn config(&self) -> &ChromeConfig {
        &self.config
    }
}

impl DriverFactory for ChromeDriverFactory {
    type Driver = ChromeDriver;

    fn create(&self) -> anyhow::Result<Option<ChromeDriver>> {
        Ok(Some(ChromeDriver::launch(&self.config)?))
    }
}
