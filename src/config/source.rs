//! Configuration sources.
//!
//! Every source is a [`config::Source`](::config::Source). [`ConfigSource`]
//! adds the one thing the stack needs beyond that: which file, if any, to
//! watch for live reload. Sources are layered by
//! [`ConfigStack`](crate::config::stack::ConfigStack) in registration order,
//! so a source added later overrides earlier ones.

use std::path::{Path, PathBuf};

use ::config::{
    Environment, File, FileFormat, FileSourceFile, FileSourceString, Map, Source, Value, ValueKind,
};

use crate::config::loader::normalize_key;

/// A source the stack can layer.
pub trait ConfigSource: Source + Send + Sync + 'static {
    /// File to watch for live reload, if the source is file-backed and asked for it.
    fn watch_path(&self) -> Option<&Path> {
        None
    }
}

impl ConfigSource for Environment {}

impl ConfigSource for File<FileSourceString, FileFormat> {}

impl ConfigSource for File<FileSourceFile, FileFormat> {}

/// Fixed in-memory values, typically the built-in defaults.
///
/// Keys are paths such as `host.fault_policy` (`:` works as a separator too).
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    values: Vec<(String, String)>,
}

impl MemorySource {
    pub fn new<I, K, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl Source for MemorySource {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<Map<String, Value>, ::config::ConfigError> {
        Ok(string_values(&self.name, &self.values))
    }
}

impl ConfigSource for MemorySource {}

/// Flat `path → string` entries; later duplicates win.
fn string_values(origin: &str, values: &[(String, String)]) -> Map<String, Value> {
    let origin = origin.to_string();
    values
        .iter()
        .map(|(key, value)| {
            (
                normalize_key(key),
                Value::new(Some(&origin), ValueKind::String(value.clone())),
            )
        })
        .collect()
}

/// A settings file. The format follows the extension (`.toml`, `.json`, ...).
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    optional: bool,
    reload_on_change: bool,
}

impl FileSource {
    /// A required file that is read on every load and not watched.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            optional: false,
            reload_on_change: false,
        }
    }

    /// A missing optional file contributes no values instead of failing.
    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn reload_on_change(mut self, reload: bool) -> Self {
        self.reload_on_change = reload;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Source for FileSource {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<Map<String, Value>, ::config::ConfigError> {
        if self.optional && !self.path.exists() {
            tracing::debug!(path = ?self.path, "Optional configuration file not found, skipping");
            return Ok(Map::new());
        }
        File::from(self.path.as_path())
            .required(!self.optional)
            .collect()
    }
}

impl ConfigSource for FileSource {
    fn watch_path(&self) -> Option<&Path> {
        self.reload_on_change.then_some(self.path.as_path())
    }
}

/// Command-line arguments.
///
/// Accepted forms: `--Key=Value`, `--Key Value`, `/Key=Value`, `/Key Value`
/// and `Key=Value`. Single-dash switches and bare words are ignored, as is
/// a trailing `--Key` with no value.
#[derive(Debug, Clone)]
pub struct CommandLineSource {
    values: Vec<(String, String)>,
}

impl CommandLineSource {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        Self {
            values: parse_args(&args),
        }
    }
}

impl Source for CommandLineSource {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<Map<String, Value>, ::config::ConfigError> {
        Ok(string_values("command line", &self.values))
    }
}

impl ConfigSource for CommandLineSource {}

fn parse_args(args: &[String]) -> Vec<(String, String)> {
    let mut values = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let (prefixed, body) = if let Some(rest) = arg.strip_prefix("--") {
            (true, rest)
        } else if let Some(rest) = arg.strip_prefix('/') {
            (true, rest)
        } else if arg.starts_with('-') {
            continue;
        } else {
            (false, arg.as_str())
        };

        match body.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                values.push((key.to_string(), value.to_string()));
            }
            Some(_) => continue,
            None => {
                if !prefixed || body.is_empty() {
                    continue;
                }
                if let Some(value) = iter.next() {
                    values.push((body.to_string(), value.clone()));
                }
            }
        }
    }
    values
}
