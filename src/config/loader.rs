//! Loading through the `config` crate.
//!
//! Every source is wrapped in [`Folded`] before it reaches the builder, so
//! keys coming from files, the environment and the command line all end up
//! lower-case. Lookups normalize the requested key the same way, which makes
//! them case-insensitive.

use ::config::{Map, Source, Value, ValueKind};
use thiserror::Error;

/// Separator between path segments of a configuration key.
pub const KEY_SEPARATOR: char = '.';

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("configuration reload task failed: {0}")]
    Reload(String),
}

/// Canonical form of a key: trimmed, lower-case, `.`-separated.
///
/// `:` is accepted as a separator too (`Host:FaultPolicy`).
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace(':', ".")
}

/// Join a parent path and a child key.
pub fn combine(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else if key.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix}{KEY_SEPARATOR}{key}")
    }
}

/// Last path segment of a key (`"a.b.c"` → `"c"`).
pub fn last_segment(key: &str) -> &str {
    key.rsplit(KEY_SEPARATOR).next().unwrap_or(key)
}

/// A source whose keys are lower-cased on every collect.
#[derive(Debug)]
pub(crate) struct Folded {
    inner: Box<dyn Source + Send + Sync>,
}

impl Folded {
    pub(crate) fn new(source: impl Source + Send + Sync + 'static) -> Self {
        Self {
            inner: Box::new(source),
        }
    }
}

impl Clone for Folded {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_into_box(),
        }
    }
}

impl Source for Folded {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<Map<String, Value>, ::config::ConfigError> {
        Ok(fold_table(self.inner.collect()?))
    }
}

fn fold_table(table: Map<String, Value>) -> Map<String, Value> {
    let mut folded = Map::new();
    for (key, mut value) in table {
        fold_value(&mut value);
        insert_merged(&mut folded, key.to_lowercase(), value);
    }
    folded
}

/// Keys that differ only in case fold together; tables under them merge.
fn insert_merged(table: &mut Map<String, Value>, key: String, value: Value) {
    match table.get_mut(&key) {
        Some(existing) => merge(existing, value),
        None => {
            table.insert(key, value);
        }
    }
}

fn merge(into: &mut Value, from: Value) {
    match (&mut into.kind, from.kind) {
        (ValueKind::Table(target), ValueKind::Table(source)) => {
            for (key, value) in source {
                insert_merged(target, key, value);
            }
        }
        (slot, kind) => *slot = kind,
    }
}

fn fold_value(value: &mut Value) {
    match &mut value.kind {
        ValueKind::Table(table) => *table = fold_table(std::mem::take(table)),
        ValueKind::Array(items) => items.iter_mut().for_each(fold_value),
        _ => {}
    }
}
