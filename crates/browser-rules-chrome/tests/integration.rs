//! Integration tests for browser-rules-chrome
//!
//! These tests require Chrome/Chromium to be installed and are marked #[ignore]
//! by default. Run with: cargo test --package browser-rules-chrome -- --ignored

use std::cell::Cell;
use std::sync::Arc;

use browser_rules::{
    BrowserRule, Failure, MemoryReporter, OutputType, ReportEvent, RetryConfig, Screenshot,
    TestDescription, WebDriver,
};
use browser_rules_chrome::{ChromeConfig, ChromeDriver, ChromeDriverFactory};

/// Helper to create a simple HTML page for testing
fn test_page_url() -> String {
    let html = r#"
    <!DOCTYPE html>
    <html>
    <head>
        <title>Test Page</title>
    </head>
    <body>
        <h1 id="heading">Test Heading</h1>
        <script>
            setTimeout(() => {
                const late = document.createElement('p');
                late.id = 'late';
                document.body.appendChild(late);
            }, 200);
        </script>
    </body>
    </html>
    "#;
    format!("data:text/html,{}", urlencoding::encode(html))
}

#[test]
#[ignore] // Requires Chrome to be installed
fn driver_navigates_and_reads_page() {
    let driver = ChromeDriver::launch(&ChromeConfig::default()).expect("failed to launch");

    driver.navigate(&test_page_url()).expect("failed to navigate");

    assert_eq!(driver.title().unwrap(), "Test Page");
    assert!(driver.url().unwrap().starts_with("data:text/html"));
    assert!(driver.page_source().unwrap().contains("Test Heading"));
    driver.wait_for_selector("#late").expect("late element never appeared");

    let png = driver.screenshot_png().unwrap();
    assert_eq!(&png[1..4], b"PNG");

    driver.quit().expect("failed to close browser");
}

#[test]
#[ignore]
fn failing_test_reports_screenshot_and_page_source() {
    let reporter = MemoryReporter::new();
    let mut rule = BrowserRule::configure(ChromeDriverFactory::default())
        .with_test_logger(Arc::new(reporter.clone()))
        .with_page_source_on_failure(Arc::new(reporter.clone()))
        .take_screenshot_on_failure(OutputType::Base64, Arc::new(reporter.clone()))
        .build();

    let result = rule.run(&TestDescription::new("Chrome", "wrong_title"), |ctx| {
        let driver = ctx.driver()?;
        driver.navigate(&test_page_url())?;
        if driver.title()? != "Another Page" {
            return Err(Failure::assertion("unexpected title"));
        }
        Ok(())
    });

    assert!(matches!(result, Err(Failure::Assertion { .. })));
    let events = reporter.events_for("wrong_title(Chrome)");
    assert!(events.iter().any(|e| matches!(
        e,
        ReportEvent::Screenshot { screenshot: Screenshot::Base64(data), .. } if !data.is_empty()
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        ReportEvent::PageSource { source, .. } if source.contains("Test Heading")
    )));
}

#[test]
#[ignore]
fn flaky_test_gets_a_new_browser_per_attempt() {
    let mut rule = BrowserRule::configure(ChromeDriverFactory::default())
        .retry(RetryConfig::new(1).unwrap())
        .build();
    let attempts = Cell::new(0);

    let report = rule
        .run_with_report(&TestDescription::new("Chrome", "flaky").flaky(), |ctx| {
            attempts.set(attempts.get() + 1);
            let driver = ctx.driver()?;
            // Every attempt starts from a blank page.
            assert_eq!(driver.url()?, "about:blank");
            driver.navigate(&test_page_url())?;
            if attempts.get() == 1 {
                return Err(Failure::assertion("first attempt fails"));
            }
            Ok(())
        })
        .expect("second attempt should pass");

    assert_eq!(report.executions, 2);
    assert!(report.was_retried());
}
