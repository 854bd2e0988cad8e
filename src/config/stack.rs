//! Layered configuration.
//!
//! [`ConfigStack`] collects sources in precedence order (lowest first) on a
//! `config::ConfigBuilder`. [`ConfigStack::build`] merges them into a
//! [`ConfigView`], a cheap, cloneable handle onto the current snapshot.
//!
//! Reloads rebuild from the same sources and publish the result with a
//! single atomic swap, so readers see either the old or the new snapshot,
//! never a mix.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use ::config::builder::DefaultState;
use ::config::{Config, ConfigBuilder, Map, Value, ValueKind};
use arc_swap::ArcSwap;
use tokio::sync::watch;

use crate::config::loader::{combine, last_segment, normalize_key, ConfigError, Folded};
use crate::config::source::ConfigSource;

/// Ordered list of sources, lowest precedence first.
pub struct ConfigStack {
    builder: ConfigBuilder<DefaultState>,
    sources: usize,
    watch: Vec<PathBuf>,
}

impl ConfigStack {
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
            sources: 0,
            watch: Vec::new(),
        }
    }

    /// Append a source. It overrides every source added before it.
    pub fn add_source(&mut self, source: impl ConfigSource) -> &mut Self {
        if let Some(path) = source.watch_path() {
            self.watch.push(path.to_path_buf());
        }
        let builder = std::mem::replace(&mut self.builder, Config::builder());
        self.builder = builder.add_source(Folded::new(source));
        self.sources += 1;
        self
    }

    pub fn len(&self) -> usize {
        self.sources
    }

    pub fn is_empty(&self) -> bool {
        self.sources == 0
    }

    /// Load every source and merge them into a view.
    pub fn build(self) -> Result<ConfigView, ConfigError> {
        let config = self.builder.build_cloned()?;
        let (changes, _) = watch::channel(0);
        tracing::debug!(sources = self.sources, "Configuration merged");
        Ok(ConfigView {
            shared: Arc::new(Shared {
                builder: self.builder,
                sources: self.sources,
                watch: self.watch,
                snapshot: ArcSwap::from_pointee(ConfigSnapshot {
                    config,
                    generation: 0,
                }),
                generation: AtomicU64::new(0),
                reload_lock: Mutex::new(()),
                changes,
            }),
        })
    }
}

impl Default for ConfigStack {
    fn default() -> Self {
        Self::new()
    }
}

/// An immutable merged configuration.
pub struct ConfigSnapshot {
    config: Config,
    generation: u64,
}

impl ConfigSnapshot {
    /// A scalar value as a string. Tables and absent keys give `None`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.value(key)?.into_string().ok()
    }

    /// The raw value at `key`, table or scalar.
    pub fn value(&self, key: &str) -> Option<Value> {
        let key = normalize_key(key);
        if key.is_empty() {
            return Some(Value::new(None, ValueKind::Table(self.root())));
        }
        self.config.get::<Value>(&key).ok()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.value(key).is_some()
    }

    /// Top-level keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.root().into_keys().collect();
        keys.sort();
        keys
    }

    /// The underlying merged `config::Config`.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Incremented by every successful reload; `0` for the initial build.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn root(&self) -> Map<String, Value> {
        self.config.clone().try_deserialize().unwrap_or_default()
    }
}

impl std::fmt::Debug for ConfigSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigSnapshot")
            .field("keys", &self.keys())
            .field("generation", &self.generation)
            .finish()
    }
}

struct Shared {
    builder: ConfigBuilder<DefaultState>,
    sources: usize,
    watch: Vec<PathBuf>,
    snapshot: ArcSwap<ConfigSnapshot>,
    generation: AtomicU64,
    reload_lock: Mutex<()>,
    changes: watch::Sender<u64>,
}

/// Handle onto the live merged configuration.
#[derive(Clone)]
pub struct ConfigView {
    shared: Arc<Shared>,
}

impl ConfigView {
    /// Resolve a key against the current snapshot. Case is ignored.
    pub fn get(&self, key: &str) -> Option<String> {
        self.shared.snapshot.load().get(key)
    }

    /// The current snapshot. Holding it pins that version.
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.shared.snapshot.load_full()
    }

    /// A sub-tree of the current snapshot rooted at `path`.
    pub fn section(&self, path: &str) -> ConfigSection {
        ConfigSection {
            snapshot: self.snapshot(),
            path: normalize_key(path),
        }
    }

    pub fn generation(&self) -> u64 {
        self.shared.snapshot.load().generation
    }

    /// Re-read every source and swap in the merged result.
    ///
    /// On failure the previous snapshot stays in place. File sources are read
    /// on the calling thread; async callers use [`reload_async`](Self::reload_async).
    pub fn reload(&self) -> Result<u64, ConfigError> {
        let _guard = self
            .shared
            .reload_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let config = self.shared.builder.build_cloned()?;
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared
            .snapshot
            .store(Arc::new(ConfigSnapshot { config, generation }));
        self.shared.changes.send_replace(generation);
        tracing::info!(generation, "Configuration reloaded");
        Ok(generation)
    }

    /// [`reload`](Self::reload) on the blocking thread pool.
    pub async fn reload_async(&self) -> Result<u64, ConfigError> {
        let view = self.clone();
        tokio::task::spawn_blocking(move || view.reload())
            .await
            .map_err(|e| ConfigError::Reload(e.to_string()))?
    }

    /// Receive the generation number of each successful reload.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.changes.subscribe()
    }

    /// Files whose sources asked to be reloaded on change.
    pub fn watch_paths(&self) -> Vec<PathBuf> {
        self.shared.watch.clone()
    }

    pub fn source_count(&self) -> usize {
        self.shared.sources
    }
}

impl std::fmt::Debug for ConfigView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigView")
            .field("sources", &self.shared.sources)
            .field("generation", &self.generation())
            .finish()
    }
}

/// A pinned view of one configuration sub-tree.
#[derive(Debug, Clone)]
pub struct ConfigSection {
    snapshot: Arc<ConfigSnapshot>,
    path: String,
}

impl ConfigSection {
    /// Full, normalized path of this section.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last segment of the path.
    pub fn key(&self) -> &str {
        last_segment(&self.path)
    }

    /// Scalar stored directly at this path.
    pub fn value(&self) -> Option<String> {
        self.snapshot.get(&self.path)
    }

    /// Scalar at a key relative to this section.
    pub fn get(&self, key: &str) -> Option<String> {
        self.snapshot.get(&combine(&self.path, &normalize_key(key)))
    }

    pub fn section(&self, key: &str) -> ConfigSection {
        ConfigSection {
            snapshot: Arc::clone(&self.snapshot),
            path: combine(&self.path, &normalize_key(key)),
        }
    }

    /// Whether anything is stored at this path.
    pub fn exists(&self) -> bool {
        self.snapshot.contains_key(&self.path)
    }

    /// The sub-tree as a `config::Value`, for binding.
    pub fn to_value(&self) -> Option<Value> {
        self.snapshot.value(&self.path)
    }

    /// Immediate child sections, in key order.
    pub fn children(&self) -> Vec<ConfigSection> {
        let Some(Ok(table)) = self.to_value().map(Value::into_table) else {
            return Vec::new();
        };
        let mut names: Vec<String> = table.into_keys().collect();
        names.sort();
        names.iter().map(|name| self.section(name)).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use ::config::{Environment, Source};

    use super::*;
    use crate::config::source::MemorySource;

    fn env(vars: &[(&str, &str)]) -> Environment {
        crate::config::defaults::environment_source().source(Some(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Map<String, String>>(),
        ))
    }

    #[test]
    fn test_later_source_overrides_earlier() {
        let mut stack = ConfigStack::new();
        stack
            .add_source(MemorySource::new("defaults", [("Level", "Info"), ("Name", "sage")]))
            .add_source(env(&[("SAGE_LEVEL", "Debug"), ("PATH", "/usr/bin")]));
        let view = stack.build().unwrap();

        assert_eq!(view.get("Level").as_deref(), Some("Debug"));
        assert_eq!(view.get("name").as_deref(), Some("sage"));
        assert_eq!(view.get("Missing"), None);
        assert_eq!(view.get("path"), None);
    }

    #[test]
    fn test_env_nesting_and_case() {
        let mut stack = ConfigStack::new();
        stack
            .add_source(MemorySource::new("defaults", [("Host:Fault_Policy", "StopHost")]))
            .add_source(env(&[("sage_host__FAULT_POLICY", "Isolate")]));
        let view = stack.build().unwrap();
        assert_eq!(view.get("host.fault_policy").as_deref(), Some("Isolate"));
        assert_eq!(view.get("HOST:FAULT_POLICY").as_deref(), Some("Isolate"));
    }

    #[test]
    fn test_precedence_holds_for_every_ordering() {
        let a = MemorySource::new("a", [("Key", "a")]);
        let b = MemorySource::new("b", [("Key", "b")]);
        let c = MemorySource::new("c", [("Key", "c")]);
        let orders = [
            [(&a, "a"), (&b, "b"), (&c, "c")],
            [(&a, "a"), (&c, "c"), (&b, "b")],
            [(&b, "b"), (&a, "a"), (&c, "c")],
            [(&b, "b"), (&c, "c"), (&a, "a")],
            [(&c, "c"), (&a, "a"), (&b, "b")],
            [(&c, "c"), (&b, "b"), (&a, "a")],
        ];
        for order in orders {
            let mut stack = ConfigStack::new();
            for (source, _) in order {
                stack.add_source(source.clone());
            }
            let expected = order[2].1.to_string();
            assert_eq!(stack.build().unwrap().get("key"), Some(expected));
        }
    }

    #[test]
    fn test_section_children() {
        let mut stack = ConfigStack::new();
        stack.add_source(MemorySource::new(
            "defaults",
            [
                ("Logging:Log_Level:Default", "Information"),
                ("Logging:Log_Level:notify", "Warning"),
                ("Logging:Format", "pretty"),
            ],
        ));
        let view = stack.build().unwrap();
        let logging = view.section("Logging");

        assert!(logging.exists());
        assert_eq!(logging.path(), "logging");
        assert_eq!(logging.get("Format").as_deref(), Some("pretty"));
        let children: Vec<_> = logging.children().iter().map(|c| c.key().to_string()).collect();
        assert_eq!(children, vec!["format", "log_level"]);
        assert_eq!(logging.section("log_level").children().len(), 2);
        assert!(!view.section("Nope").exists());
        assert_eq!(view.snapshot().keys(), vec!["logging"]);
    }

    #[derive(Debug, Clone)]
    struct Flaky {
        fail: Arc<AtomicBool>,
        value: Arc<Mutex<String>>,
    }

    impl Source for Flaky {
        fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
            Box::new(self.clone())
        }

        fn collect(&self) -> Result<Map<String, Value>, ::config::ConfigError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(::config::ConfigError::Message("boom".into()));
            }
            let value = self.value.lock().unwrap().clone();
            Ok([("key".to_string(), Value::new(None, ValueKind::String(value)))]
                .into_iter()
                .collect())
        }
    }

    impl ConfigSource for Flaky {}

    #[test]
    fn test_reload_swaps_and_failed_reload_keeps_previous() {
        let fail = Arc::new(AtomicBool::new(false));
        let value = Arc::new(Mutex::new("one".to_string()));
        let mut stack = ConfigStack::new();
        stack.add_source(Flaky {
            fail: fail.clone(),
            value: value.clone(),
        });
        let view = stack.build().unwrap();
        let mut changes = view.subscribe();
        let pinned = view.snapshot();

        *value.lock().unwrap() = "two".into();
        assert_eq!(view.reload().unwrap(), 1);
        assert_eq!(view.get("Key").as_deref(), Some("two"));
        assert_eq!(pinned.get("Key").as_deref(), Some("one"));
        assert!(changes.has_changed().unwrap());
        assert_eq!(*changes.borrow_and_update(), 1);

        fail.store(true, Ordering::SeqCst);
        assert!(view.reload().is_err());
        assert_eq!(view.get("Key").as_deref(), Some("two"));
        assert_eq!(view.generation(), 1);
    }

    #[tokio::test]
    async fn test_reload_async_runs_off_the_runtime() {
        let value = Arc::new(Mutex::new("one".to_string()));
        let mut stack = ConfigStack::new();
        stack.add_source(Flaky {
            fail: Arc::new(AtomicBool::new(false)),
            value: value.clone(),
        });
        let view = stack.build().unwrap();

        *value.lock().unwrap() = "two".into();
        assert_eq!(view.reload_async().await.unwrap(), 1);
        assert_eq!(view.get("key").as_deref(), Some("two"));
    }
}
