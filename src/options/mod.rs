//! Options binding.
//!
//! # Data Flow
//! ```text
//! ConfigView
//!     → section(name) (pinned snapshot)
//!     → config::Value deserializer (section sub-tree)
//!     → T::validate (semantic checks)
//!     → Arc<T> in the service registry / OptionsMonitor<T>
//! ```
//!
//! # Design Decisions
//! - Fail fast: the host binds every registered options type before any
//!   worker is constructed
//! - Errors name the full configuration key that failed

pub mod monitor;

use ::config::{Map, Value, ValueKind};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::loader::combine;
use crate::config::stack::{ConfigSection, ConfigView};
use crate::config::validation::{join, ValidationError};

pub use monitor::{OptionsMonitor, Rebind};

/// A settings type bound from one configuration section.
pub trait Options: DeserializeOwned + Send + Sync + 'static {
    /// Section the type is bound from (e.g. `"host"`).
    const SECTION: &'static str;

    /// Semantic checks run after a successful bind.
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        Ok(())
    }
}

/// Errors produced while binding options.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BindingError {
    #[error("required configuration key `{key}` is missing")]
    Missing { section: String, key: String },

    #[error("configuration key `{key}` is invalid: {message}")]
    Invalid {
        section: String,
        key: String,
        message: String,
    },

    #[error("configuration section `{section}` is invalid: {message}")]
    Section { section: String, message: String },

    #[error("options `{section}` failed validation: {}", join(.errors))]
    Validation {
        section: String,
        errors: Vec<ValidationError>,
    },
}

impl BindingError {
    /// Section the failure belongs to.
    pub fn section(&self) -> &str {
        match self {
            Self::Missing { section, .. }
            | Self::Invalid { section, .. }
            | Self::Section { section, .. }
            | Self::Validation { section, .. } => section,
        }
    }

    fn from_config(section: &str, err: ::config::ConfigError) -> Self {
        let owner = section.to_string();
        // Errors raised below a field arrive wrapped with that field's path.
        let (path, err) = match err {
            ::config::ConfigError::At {
                error,
                key: Some(key),
                ..
            } => (combine(section, &key), *error),
            other => (owner.clone(), other),
        };
        match err {
            ::config::ConfigError::Type {
                key,
                unexpected,
                expected,
                ..
            } => Self::Invalid {
                section: owner,
                key: match key {
                    Some(key) => combine(&path, &key),
                    None => path,
                },
                message: format!("invalid type: {unexpected}, expected {expected}"),
            },
            ::config::ConfigError::Message(message) => match missing_field(&message) {
                Some(field) => Self::Missing {
                    key: combine(&path, field),
                    section: owner,
                },
                None if path != owner => Self::Invalid {
                    section: owner,
                    key: path,
                    message,
                },
                None => Self::Section {
                    section: owner,
                    message,
                },
            },
            other => Self::Section {
                section: owner,
                message: other.to_string(),
            },
        }
    }
}

/// Field name from serde's "missing field `x`" message.
fn missing_field(message: &str) -> Option<&str> {
    message
        .strip_prefix("missing field `")?
        .split('`')
        .next()
}

/// Project `section` of the current configuration onto `T`.
pub fn bind<T: DeserializeOwned>(view: &ConfigView, section: &str) -> Result<T, BindingError> {
    bind_section(&view.section(section))
}

/// Project an already pinned section onto `T`.
///
/// An absent section binds as an empty table, so `#[serde(default)]` types
/// fall back to their defaults.
pub fn bind_section<T: DeserializeOwned>(section: &ConfigSection) -> Result<T, BindingError> {
    let value = section
        .to_value()
        .unwrap_or_else(|| Value::new(None, ValueKind::Table(Map::new())));
    T::deserialize(value).map_err(|err| BindingError::from_config(section.path(), err))
}

/// Bind `T` from its own section and run its validation.
pub fn bind_options<T: Options>(view: &ConfigView) -> Result<T, BindingError> {
    let options: T = bind(view, T::SECTION)?;
    options
        .validate()
        .map_err(|errors| BindingError::Validation {
            section: T::SECTION.to_string(),
            errors,
        })?;
    Ok(options)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use ::config::{File, FileFormat};
    use serde::Deserialize;

    use super::*;
    use crate::config::source::MemorySource;
    use crate::config::stack::ConfigStack;
    use crate::config::validation::Validator;

    fn view(toml: &str) -> ConfigView {
        let mut stack = ConfigStack::new();
        stack.add_source(File::from_str(toml, FileFormat::Toml));
        stack.build().unwrap()
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Limits {
        max: u32,
        ratio: f64,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    enum Mode {
        Fast,
        Safe,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        enabled: bool,
        limits: Limits,
        mode: Mode,
        tags: Vec<String>,
        nickname: Option<String>,
        #[serde(default)]
        retries: u8,
        labels: BTreeMap<String, String>,
    }

    impl Options for Sample {
        const SECTION: &'static str = "sample";

        fn validate(&self) -> Result<(), Vec<ValidationError>> {
            let mut v = Validator::new();
            v.check(!self.name.is_empty(), "name", "must not be empty")
                .check(self.limits.max > 0, "limits.max", "must be positive");
            v.finish()
        }
    }

    const FULL_SAMPLE: &str = r#"
        [Sample]
        Name = "node"
        enabled = true
        mode = "safe"
        tags = ["a", "b", "k"]

        [Sample.Limits]
        max = 10
        ratio = 0.5

        [Sample.labels]
        zone = "eu"
    "#;

    #[test]
    fn test_bind_nested_struct() {
        let bound: Sample = bind(&view(FULL_SAMPLE), "Sample").unwrap();
        assert_eq!(
            bound,
            Sample {
                name: "node".into(),
                enabled: true,
                limits: Limits { max: 10, ratio: 0.5 },
                mode: Mode::Safe,
                tags: vec!["a".into(), "b".into(), "k".into()],
                nickname: None,
                retries: 0,
                labels: BTreeMap::from([("zone".to_string(), "eu".to_string())]),
            }
        );
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Flags {
        enabled: bool,
        mode: Mode,
        limits: Limits,
    }

    #[test]
    fn test_string_values_parse_into_fields() {
        let mut stack = ConfigStack::new();
        stack.add_source(MemorySource::new(
            "flat",
            [
                ("Flags:ENABLED", "true"),
                ("flags.mode", "Fast"),
                ("flags.limits.max", "10"),
                ("Flags:Limits:Ratio", "0.5"),
            ],
        ));
        let bound: Flags = bind(&stack.build().unwrap(), "flags").unwrap();
        assert_eq!(
            bound,
            Flags {
                enabled: true,
                mode: Mode::Fast,
                limits: Limits { max: 10, ratio: 0.5 },
            }
        );
    }

    #[test]
    fn test_missing_required_key_is_named() {
        let toml = FULL_SAMPLE.replace("max = 10", "");
        let err = bind::<Sample>(&view(&toml), "Sample").unwrap_err();
        assert_eq!(
            err,
            BindingError::Missing {
                section: "sample".into(),
                key: "sample.limits.max".into(),
            }
        );
    }

    #[test]
    fn test_absent_section_reports_a_missing_field() {
        let err = bind::<Sample>(&view(""), "sample").unwrap_err();
        assert!(matches!(err, BindingError::Missing { ref key, .. } if key.starts_with("sample.")));
    }

    #[test]
    fn test_unparseable_value_names_key() {
        let toml = FULL_SAMPLE.replace("max = 10", "max = \"many\"");
        match bind::<Sample>(&view(&toml), "sample").unwrap_err() {
            BindingError::Invalid { key, message, .. } => {
                assert_eq!(key, "sample.limits.max");
                assert!(message.contains("many"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_enum_variant() {
        let toml = FULL_SAMPLE.replace("mode = \"safe\"", "mode = \"reckless\"");
        let err = bind::<Sample>(&view(&toml), "sample").unwrap_err();
        assert!(matches!(err, BindingError::Invalid { ref key, .. } if key == "sample.mode"));
        assert!(err.to_string().contains("reckless"), "{err}");
    }

    #[test]
    fn test_validation_collects_errors() {
        let toml = FULL_SAMPLE
            .replace("Name = \"node\"", "Name = \"\"")
            .replace("max = 10", "max = 0");
        match bind_options::<Sample>(&view(&toml)).unwrap_err() {
            BindingError::Validation { section, errors } => {
                assert_eq!(section, "sample");
                assert_eq!(errors.len(), 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_option_present() {
        let toml = FULL_SAMPLE.replace("[Sample]\n", "[Sample]\nnickname = \"n\"\n");
        let bound: Sample = bind(&view(&toml), "sample").unwrap();
        assert_eq!(bound.nickname.as_deref(), Some("n"));
    }

    #[test]
    fn test_missing_field_message() {
        assert_eq!(missing_field("missing field `max`"), Some("max"));
        assert_eq!(missing_field("something else"), None);
    }
}
