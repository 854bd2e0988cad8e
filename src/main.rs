//! Sage application host.
//!
//! # Architecture Overview
//!
//! ```text
//!   defaults < Sage.toml < Sage.{Environment}.toml < SAGE_* env < --set
//!        │
//!        ▼
//!   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!   │ ConfigStack  │──▶│   options    │──▶│   registry   │
//!   │ (ConfigView) │   │ bind+monitor │   │ ServiceProv. │
//!   └──────┬───────┘   └──────────────┘   └──────┬───────┘
//!          │ reload (notify, SIGHUP)             │ resolve_all
//!          ▼                                     ▼
//!   ┌──────────────┐                     ┌──────────────┐
//!   │ rebind loop  │                     │  supervisor  │──▶ workers
//!   └──────────────┘                     └──────────────┘
//! ```
//!
//! Exit codes: 0 clean, 1 startup failure, 2 worker fault, 3 worker
//! abandoned at shutdown.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use sage::config::defaults::SETTINGS_FILE;
use sage::{app, HostBuilder, HostExit};

#[derive(Parser)]
#[command(name = "sage")]
#[command(about = "Generic application host for background workers", long_about = None)]
struct Cli {
    /// Base settings file; `<stem>.<Environment>.<ext>` is layered on top
    #[arg(short, long, default_value = SETTINGS_FILE)]
    config: PathBuf,

    /// Hosting environment (overrides SAGE_ENVIRONMENT)
    #[arg(short, long)]
    environment: Option<String>,

    /// Configuration override, highest precedence (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_override)]
    overrides: Vec<String>,
}

fn parse_override(raw: &str) -> Result<String, String> {
    match raw.split_once('=') {
        Some((key, _)) if !key.trim().is_empty() => Ok(raw.to_string()),
        _ => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut builder = HostBuilder::with_settings_file(cli.config, cli.environment, cli.overrides);
    app::register(&mut builder);

    let host = match builder.build() {
        Ok(host) => host,
        // Already logged by the builder.
        Err(_) => return HostExit::StartupFailed.into(),
    };

    match host.run().await {
        Ok(exit) => exit.into(),
        Err(e) => {
            tracing::error!(error = %e, "Host failed");
            HostExit::StartupFailed.into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_overrides() {
        let cli = Cli::try_parse_from([
            "sage",
            "--environment",
            "Staging",
            "--set",
            "heartbeat.interval_ms=100",
            "--set",
            "Host:Fault_Policy=Isolate",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("Sage.toml"));
        assert_eq!(cli.environment.as_deref(), Some("Staging"));
        assert_eq!(
            cli.overrides,
            vec!["heartbeat.interval_ms=100", "Host:Fault_Policy=Isolate"]
        );
    }

    #[test]
    fn test_cli_rejects_malformed_override() {
        assert!(Cli::try_parse_from(["sage", "--set", "novalue"]).is_err());
        assert!(Cli::try_parse_from(["sage", "--set", "=x"]).is_err());
    }
}
