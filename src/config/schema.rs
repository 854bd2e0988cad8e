//! Settings the host itself binds from configuration.
//!
//! Field names are snake_case, matching the folded configuration keys.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::validation::{ValidationError, Validator};
use crate::options::Options;
use crate::worker::FaultPolicy;

/// `host` section.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct HostSettings {
    /// Grace period for workers to stop after cancellation.
    pub shutdown_timeout_seconds: u64,

    /// What a worker fault does to the rest of the host.
    pub fault_policy: FaultPolicy,
}

impl HostSettings {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            shutdown_timeout_seconds: 5,
            fault_policy: FaultPolicy::StopHost,
        }
    }
}

impl Options for HostSettings {
    const SECTION: &'static str = "host";

    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut v = Validator::new();
        v.check(
            self.shutdown_timeout_seconds <= 3600,
            "shutdown_timeout_seconds",
            "must be at most 3600",
        );
        v.finish()
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// A level, or a table of levels for targets below this one.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum LevelSetting {
    Level(String),
    Targets(BTreeMap<String, LevelSetting>),
}

/// `logging` section.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingSettings {
    /// Level per target; `default` applies to everything else.
    /// Nested tables name module paths: `log_level.sage.worker`.
    pub log_level: BTreeMap<String, LevelSetting>,

    pub format: LogFormat,
}

impl LoggingSettings {
    /// Every configured level as `(target, level)`, nested targets joined
    /// with `::`.
    pub fn levels(&self) -> Vec<(String, String)> {
        fn walk(prefix: &str, table: &BTreeMap<String, LevelSetting>, out: &mut Vec<(String, String)>) {
            for (name, setting) in table {
                let target = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}::{name}")
                };
                match setting {
                    LevelSetting::Level(level) => out.push((target, level.clone())),
                    LevelSetting::Targets(inner) => walk(&target, inner, out),
                }
            }
        }

        let mut out = Vec::new();
        walk("", &self.log_level, &mut out);
        out
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: BTreeMap::from([(
                "default".to_string(),
                LevelSetting::Level("information".to_string()),
            )]),
            format: LogFormat::Pretty,
        }
    }
}

impl Options for LoggingSettings {
    const SECTION: &'static str = "logging";

    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut v = Validator::new();
        for (target, level) in self.levels() {
            v.check(
                crate::observability::logging::parse_level(&level).is_some(),
                &format!("log_level.{target}"),
                format!("unknown log level `{level}`"),
            );
        }
        v.finish()
    }
}
