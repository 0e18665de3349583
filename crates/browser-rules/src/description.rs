//! Test metadata handed to rules, reporters and the retry classifier.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Tag that marks a test as flaky when passed to [`TestDescription::with_tag`].
pub const FLAKY_TAG: &str = "flaky";

/// Describes one test: its name, whether it may be retried, and free-form tags.
///
/// Retry eligibility is an explicit opt-in. A description is only retried
/// by [`RetryRule`](crate::retry::RetryRule) after [`flaky`](Self::flaky)
/// (or a `"flaky"` tag) has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestDescription {
    /// Name of the suite or module containing the test (may be empty).
    pub class_name: String,

    /// Name of the test itself.
    pub method_name: String,

    /// Whether the test tolerates intermittent failure and may be retried.
    #[serde(default)]
    pub flaky: bool,

    /// Free-form tags, forwarded to reporters.
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl TestDescription {
    /// Creates a description for `method_name` inside `class_name`.
    pub fn new(class_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
            flaky: false,
            tags: BTreeSet::new(),
        }
    }

    /// Creates a description for a test without an enclosing suite.
    pub fn named(method_name: impl Into<String>) -> Self {
        Self::new(String::new(), method_name)
    }

    /// Marks the test as flaky.
    #[must_use]
    pub fn flaky(mut self) -> Self {
        self.flaky = true;
        self
    }

    /// Adds a tag. The `"flaky"` tag also sets the flaky flag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if tag == FLAKY_TAG {
            self.flaky = true;
        }
        self.tags.insert(tag);
        self
    }

    /// Returns true if the test opted in to retries.
    #[must_use]
    pub fn is_flaky(&self) -> bool {
        self.flaky
    }

    /// Returns `method(class)`, or just `method` when there is no class.
    #[must_use]
    pub fn display_name(&self) -> String {
        if self.class_name.is_empty() {
            self.method_name.clone()
        } else {
            format!("{}({})", self.method_name, self.class_name)
        }
    }
}

impl fmt::Display for TestDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_follows_method_class_convention() {
        let desc = TestDescription::new("LoginTest", "rejects_bad_password");
        assert_eq!(desc.display_name(), "rejects_bad_password(LoginTest)");
        assert_eq!(TestDescription::named("smoke").to_string(), "smoke");
    }

    #[test]
    fn flaky_tag_marks_description() {
        let desc = TestDescription::named("t").with_tag("slow");
        assert!(!desc.is_flaky());

        let desc = desc.with_tag(FLAKY_TAG);
        assert!(desc.is_flaky());
        assert_eq!(desc.tags.len(), 2);
    }
}
