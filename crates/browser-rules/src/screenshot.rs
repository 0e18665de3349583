//! Screenshot capture on test failure.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chain::{Decorator, TestContext};
use crate::description::TestDescription;
use crate::driver::WebDriver;
use crate::error::{Result, RuleError};
use crate::failure::Failure;
use crate::reporter::Reporter;

/// How a captured screenshot is handed to the reporter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum OutputType {
    /// Raw PNG bytes.
    Bytes,
    /// PNG bytes encoded as standard base64.
    #[default]
    Base64,
    /// A PNG file written into `dir`.
    File {
        /// Directory receiving the screenshots; created on demand
        dir: PathBuf,
    },
}

impl OutputType {
    /// Converts captured PNG bytes into this output type.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::ScreenshotWrite`] if a file output cannot be
    /// written.
    pub fn encode(&self, png: Vec<u8>, description: &TestDescription) -> Result<Screenshot> {
        match self {
            OutputType::Bytes => Ok(Screenshot::Bytes(png)),
            OutputType::Base64 => Ok(Screenshot::Base64(STANDARD.encode(png))),
            OutputType::File { dir } => write_png(dir, description, &png).map(Screenshot::File),
        }
    }
}

/// A captured screenshot in its output form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum Screenshot {
    /// Raw PNG bytes.
    Bytes(Vec<u8>),
    /// Base64 encoded PNG.
    Base64(String),
    /// Path of the written PNG file.
    File(PathBuf),
}

impl Screenshot {
    /// Renders the screenshot as an HTML `<img>` element, suitable for
    /// HTML test reports.
    #[must_use]
    pub fn to_html_img(&self, alt: &str) -> String {
        let src = match self {
            Screenshot::Bytes(png) => format!("data:image/png;base64,{}", STANDARD.encode(png)),
            Screenshot::Base64(data) => format!("data:image/png;base64,{data}"),
            Screenshot::File(path) => path.display().to_string(),
        };
        format!(
            "<img src=\"{}\" alt=\"{}\"/>",
            escape_attr(&src),
            escape_attr(alt)
        )
    }

    /// Size of the screenshot payload in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Screenshot::Bytes(png) => png.len(),
            Screenshot::Base64(data) => data.len(),
            Screenshot::File(path) => fs::metadata(path).map_or(0, |m| m.len() as usize),
        }
    }

    /// Returns true for an empty payload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Writes `png` to `dir/<test>-<uuid>.png`, creating `dir` if needed.
fn write_png(dir: &Path, description: &TestDescription, png: &[u8]) -> Result<PathBuf> {
    let path = dir.join(format!(
        "{}-{}.png",
        file_stem(&description.display_name()),
        uuid::Uuid::new_v4()
    ));
    fs::create_dir_all(dir)
        .and_then(|()| fs::write(&path, png))
        .map_err(|source| RuleError::ScreenshotWrite {
            path: path.clone(),
            source,
        })?;
    debug!(path = %path.display(), "screenshot written");
    Ok(path)
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Captures a screenshot when a test fails and hands it to a reporter.
pub struct ScreenshotOnFailure {
    output: OutputType,
    reporter: Arc<dyn Reporter>,
}

impl ScreenshotOnFailure {
    /// Creates the decorator.
    pub fn new(output: OutputType, reporter: Arc<dyn Reporter>) -> Self {
        Self { output, reporter }
    }

    /// The configured output type.
    #[must_use]
    pub fn output(&self) -> &OutputType {
        &self.output
    }
}

impl<D: WebDriver> Decorator<D> for ScreenshotOnFailure {
    fn name(&self) -> &str {
        "screenshot-on-failure"
    }

    fn on_failure(&self, _failure: &Failure, ctx: &TestContext<'_, D>) -> anyhow::Result<()> {
        // Without a driver there is nothing to capture.
        let Ok(driver) = ctx.driver() else {
            debug!(test = %ctx.description(), "no driver, skipping screenshot");
            return Ok(());
        };
        let png = driver.screenshot_png()?;
        let screenshot = self.output.encode(png, ctx.description())?;
        self.reporter.screenshot(ctx.description(), &screenshot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::DecoratorChain;
    use crate::driver::DriverResource;
    use crate::driver::testing::FakeFactory;
    use crate::reporter::{MemoryReporter, ReportEvent};

    #[test]
    fn base64_is_standard_encoding() {
        let shot = OutputType::Base64
            .encode(b"png".to_vec(), &TestDescription::named("t"))
            .unwrap();
        assert_eq!(shot, Screenshot::Base64("cG5n".to_string()));
        assert_eq!(
            shot.to_html_img("t"),
            "<img src=\"data:image/png;base64,cG5n\" alt=\"t\"/>"
        );
    }

    #[test]
    fn file_output_writes_into_directory() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = temp.path().join("shots");
        let output = OutputType::File { dir: dir.clone() };

        let shot = output
            .encode(vec![1, 2, 3], &TestDescription::new("Login Test", "opens"))
            .unwrap();

        let Screenshot::File(path) = &shot else {
            panic!("expected a file screenshot, got {shot:?}");
        };
        assert!(path.starts_with(&dir));
        let name = path.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("opens_Login_Test_-"), "{name}");
        assert_eq!(fs::read(path).unwrap(), vec![1, 2, 3]);
        assert_eq!(shot.len(), 3);
    }

    #[test]
    fn output_type_from_config_shape() {
        let output: OutputType =
            serde_json::from_str(r#"{"format":"file","dir":"target/shots"}"#).unwrap();
        assert_eq!(
            output,
            OutputType::File {
                dir: PathBuf::from("target/shots")
            }
        );
        let output: OutputType = serde_json::from_str(r#"{"format":"bytes"}"#).unwrap();
        assert_eq!(output, OutputType::Bytes);
    }

    #[test]
    fn reports_screenshot_only_on_failure() {
        let reporter = MemoryReporter::new();
        let chain = DecoratorChain::new().around(ScreenshotOnFailure::new(
            OutputType::Bytes,
            Arc::new(reporter.clone()),
        ));
        let mut resource = DriverResource::new(FakeFactory::default());
        let desc = TestDescription::named("t");

        chain.run_with_driver(&desc, 1, &mut resource, |_| Ok(())).unwrap();
        assert!(reporter.is_empty());

        let _ = chain.run_with_driver(&desc, 1, &mut resource, |_| Err(Failure::assertion("x")));
        assert_eq!(
            reporter.events(),
            vec![ReportEvent::Screenshot {
                test: "t".to_string(),
                screenshot: Screenshot::Bytes(vec![0x89, b'P', b'N', b'G']),
            }]
        );
    }
}
