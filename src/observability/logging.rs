//! Structured logging.
//!
//! # Responsibilities
//! - Translate the `logging` configuration section into an `EnvFilter`
//! - Install the global `tracing` subscriber
//!
//! # Design Decisions
//! - `RUST_LOG`, when set, replaces the configured levels entirely
//! - Level names accept both the configuration vocabulary (`Information`,
//!   `Warning`, `Critical`, `None`) and tracing's own (`info`, `warn`, `off`)
//! - Pretty format for development, JSON for machine parsing

use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{LogFormat, LoggingSettings};

/// Key in `logging.log_level` that sets the fallback level.
const DEFAULT_TARGET: &str = "default";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter `{directives}`: {message}")]
    Filter { directives: String, message: String },

    #[error("failed to install log subscriber: {0}")]
    Install(String),
}

/// Map a level name to a tracing filter. Case-insensitive.
pub fn parse_level(name: &str) -> Option<LevelFilter> {
    let level = match name.trim().to_ascii_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "information" | "info" => LevelFilter::INFO,
        "warning" | "warn" => LevelFilter::WARN,
        "error" | "critical" => LevelFilter::ERROR,
        "none" | "off" => LevelFilter::OFF,
        _ => return None,
    };
    Some(level)
}

/// Build `EnvFilter` directives from the configured levels.
///
/// The `default` entry becomes the bare global level; every other entry is
/// a target (`log_level.sage.worker` → `sage::worker`). Unknown level names
/// are skipped.
pub fn filter_directives(settings: &LoggingSettings) -> String {
    let mut global = LevelFilter::INFO;
    let mut targets = Vec::new();

    for (target, level) in settings.levels() {
        let Some(filter) = parse_level(&level) else {
            continue;
        };
        if target.eq_ignore_ascii_case(DEFAULT_TARGET) {
            global = filter;
        } else {
            targets.push(format!(
                "{target}={}",
                filter.to_string().to_ascii_lowercase()
            ));
        }
    }

    let mut directives = vec![global.to_string().to_ascii_lowercase()];
    directives.extend(targets);
    directives.join(",")
}

fn env_filter(settings: &LoggingSettings) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = filter_directives(settings);
    EnvFilter::try_new(&directives).map_err(|e| LoggingError::Filter {
        directives,
        message: e.to_string(),
    })
}

/// Install the global subscriber.
///
/// Fails if a global subscriber is already set, which callers that install
/// their own subscriber (tests, embedding) can ignore.
pub fn init(settings: &LoggingSettings) -> Result<(), LoggingError> {
    let filter = env_filter(settings)?;

    let fmt_layer = match settings.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer().pretty().boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer().compact().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))
}
