//! Section declarations for a configuration tree.
//!
//! A [`Schema`] is the table of sections the engine is allowed to touch,
//! declared once next to the configuration types. Top-level fields without a
//! [`SectionSpec`] are invisible to the engine.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Error returned by a section's [`SectionConfig::validate`] hook.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Behavior hooks for a section's typed value.
///
/// Both hooks have defaults, so a plain config struct only needs
/// `impl SectionConfig for MyConfig {}`. Override `validate` to reject
/// inconsistent option combinations after an override has been applied, and
/// `defaults` to seed newly created list elements with something other than
/// `Default::default()`.
pub trait SectionConfig: Serialize + DeserializeOwned + Default {
    /// Seed value for a newly created list element.
    fn defaults() -> Self {
        Self::default()
    }

    /// Post-override validation of the resolved section value.
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Internal result of re-checking a resolved section value against its type.
#[derive(Debug)]
pub(crate) enum CheckError {
    /// The value no longer decodes into the section's type.
    Decode(String),
    /// The type decoded but its `validate` hook rejected it.
    Validation(ValidationError),
}

type CheckFn = fn(&Value) -> Result<(), CheckError>;
type SeedFn = fn() -> Result<Value, serde_json::Error>;

fn check_section<T: SectionConfig>(value: &Value) -> Result<(), CheckError> {
    let section: T =
        serde_json::from_value(value.clone()).map_err(|e| CheckError::Decode(e.to_string()))?;
    section.validate().map_err(CheckError::Validation)
}

fn seed_section<T: SectionConfig>() -> Result<Value, serde_json::Error> {
    serde_json::to_value(T::defaults())
}

/// Declaration of one overridable section.
pub struct SectionSpec {
    name: &'static str,
    element_key: Option<&'static str>,
    redacted: &'static [&'static str],
    check: CheckFn,
    seed: SeedFn,
}

impl SectionSpec {
    /// Declare a singleton section named `name` holding a `T`.
    pub fn singleton<T: SectionConfig>(name: &'static str) -> Self {
        Self {
            name,
            element_key: None,
            redacted: &[],
            check: check_section::<T>,
            seed: seed_section::<T>,
        }
    }

    /// Declare a list-valued section named `name` holding a `Vec<T>`,
    /// where `element_key` is the serde name of the string field that
    /// uniquely identifies each element.
    pub fn list<T: SectionConfig>(name: &'static str, element_key: &'static str) -> Self {
        Self {
            name,
            element_key: Some(element_key),
            redacted: &[],
            check: check_section::<T>,
            seed: seed_section::<T>,
        }
    }

    /// Mark the named options as sensitive. Redacted options are reported
    /// as a boolean "was it set?" instead of their value.
    pub fn redact(mut self, options: &'static [&'static str]) -> Self {
        self.redacted = options;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn element_key(&self) -> Option<&'static str> {
        self.element_key
    }

    pub fn is_list(&self) -> bool {
        self.element_key.is_some()
    }

    pub fn is_redacted(&self, option: &str) -> bool {
        self.redacted.contains(&option)
    }

    pub(crate) fn redacted_options(&self) -> &'static [&'static str] {
        self.redacted
    }

    pub(crate) fn check_value(&self, value: &Value) -> Result<(), CheckError> {
        (self.check)(value)
    }

    pub(crate) fn seed_element(&self) -> Result<Value, serde_json::Error> {
        (self.seed)()
    }
}

impl std::fmt::Debug for SectionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionSpec")
            .field("name", &self.name)
            .field("element_key", &self.element_key)
            .field("redacted", &self.redacted)
            .finish()
    }
}

/// The full set of section declarations for one configuration tree.
#[derive(Debug)]
pub struct Schema {
    sections: Vec<SectionSpec>,
}

impl Schema {
    pub fn new(sections: Vec<SectionSpec>) -> Self {
        Self { sections }
    }

    /// Look up a section declaration by name.
    pub fn section(&self, name: &str) -> Option<&SectionSpec> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn sections(&self) -> &[SectionSpec] {
        &self.sections
    }

    /// Map of section name to element-key field name. Singleton sections
    /// map to the empty string.
    pub fn element_keys(&self) -> BTreeMap<String, String> {
        self.sections
            .iter()
            .map(|s| {
                (
                    s.name.to_string(),
                    s.element_key.unwrap_or_default().to_string(),
                )
            })
            .collect()
    }
}
