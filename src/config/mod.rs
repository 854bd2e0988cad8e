//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! sources (defaults, Sage.toml, Sage.{env}.toml, SAGE_* env, command line)
//!     → source.rs (config crate sources, keys folded to lowercase)
//!     → stack.rs (config::ConfigBuilder, later sources win)
//!     → ConfigView (immutable snapshot behind ArcSwap)
//!     → options binder, services, workers
//!
//! On file change or SIGHUP:
//!     watcher.rs detects change
//!     → stack.rs re-loads every source
//!     → atomic swap of the merged snapshot
//!     → subscribers (options monitors) re-bind
//! ```
//!
//! # Design Decisions
//! - Keys are case-insensitive `.`-separated paths; `:` is accepted too
//! - A reload that fails anywhere keeps the previous snapshot whole
//! - Parsing formats is the config crate's job; options bind through its
//!   deserializer

pub mod defaults;
pub mod loader;
pub mod schema;
pub mod source;
pub mod stack;
pub mod validation;
pub mod watcher;

pub use loader::ConfigError;
pub use schema::{HostSettings, LevelSetting, LogFormat, LoggingSettings};
pub use source::{CommandLineSource, ConfigSource, FileSource, MemorySource};
pub use stack::{ConfigSection, ConfigSnapshot, ConfigStack, ConfigView};
pub use validation::ValidationError;
pub use watcher::ConfigWatcher;
