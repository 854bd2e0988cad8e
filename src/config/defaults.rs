//! Built-in default values, layered beneath every other source.

use ::config::Environment;

use crate::config::source::MemorySource;

/// Prefix for environment variables read by the default source stack.
/// `SAGE_HOST__FAULT_POLICY` sets `host.fault_policy`.
pub const ENV_PREFIX: &str = "SAGE";

/// Environment variable naming the hosting environment.
pub const ENVIRONMENT_VAR: &str = "SAGE_ENVIRONMENT";

pub const DEFAULT_ENVIRONMENT: &str = "Production";

/// Base settings file, looked up relative to the working directory.
pub const SETTINGS_FILE: &str = "Sage.toml";

pub const DEFAULT_VALUES: &[(&str, &str)] = &[
    ("logging.log_level.default", "information"),
    ("logging.log_level.notify", "warning"),
    ("logging.format", "pretty"),
    ("host.shutdown_timeout_seconds", "5"),
    ("host.fault_policy", "StopHost"),
];

pub fn defaults_source() -> MemorySource {
    MemorySource::new("defaults", DEFAULT_VALUES.iter().copied())
}

/// `SAGE_*` variables, `__` between path segments.
pub fn environment_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

/// `Sage.toml` → `Sage.Staging.toml`.
pub fn environment_file(base: &std::path::Path, environment: &str) -> std::path::PathBuf {
    let stem = base
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Sage");
    let name = match base.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}.{environment}.{ext}"),
        None => format!("{stem}.{environment}"),
    };
    base.with_file_name(name)
}
