//! Application host: builds configuration and services, runs workers.
//!
//! # Data Flow
//! ```text
//! HostBuilder (Building)
//!     → ConfigStack::build → logging init → bind Host/Logging + options
//!     → ServiceCollection::build → resolve_all::<dyn BackgroundWorker>
//!     → Host
//! Host::run (Running)
//!     → WorkerSupervisor::start_all
//!     → wait: signal | HostHandle::stop | caller future | escalated fault
//! StoppingRequested
//!     → stop_all(timeout) → ServiceProvider::dispose
//! Stopped
//!     → HostExit
//! ```
//!
//! # Design Decisions
//! - Everything that can fail fails in `build`, before any worker starts
//! - The host is an owned value; there is no global instance

pub mod builder;
pub mod exit;
pub mod runner;
pub mod state;

use std::sync::Arc;

use thiserror::Error;

use crate::config::validation::{join, ValidationError};
use crate::config::{ConfigError, ConfigView};
use crate::lifecycle::Shutdown;
use crate::options::BindingError;
use crate::registry::ResolveError;

pub use builder::HostBuilder;
pub use exit::HostExit;
pub use runner::Host;
pub use state::HostState;

use state::StateCell;

/// Startup failures. Each maps to exit code 1.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("options binding failed: {0}")]
    Binding(BindingError),

    #[error("options `{section}` failed validation: {}", join(.errors))]
    Validation {
        section: String,
        errors: Vec<ValidationError>,
    },

    #[error("service resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error("invalid host state transition from {from} to {to}")]
    InvalidState { from: HostState, to: HostState },
}

impl From<BindingError> for HostError {
    fn from(err: BindingError) -> Self {
        match err {
            BindingError::Validation { section, errors } => Self::Validation { section, errors },
            other => Self::Binding(other),
        }
    }
}

/// Cloneable handle to a host: observe its state, request a stop.
///
/// Registered in the service provider, so services and workers can stop
/// the host they run in.
#[derive(Clone)]
pub struct HostHandle {
    state: Arc<StateCell>,
    stop: Shutdown,
}

impl HostHandle {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(StateCell::new()),
            stop: Shutdown::new(),
        }
    }

    /// Ask the host to stop. Idempotent; a request made before `run`
    /// stops the host as soon as it starts.
    pub fn stop(&self) {
        if !self.stop.is_triggered() {
            tracing::info!(state = %self.state(), "Host stop requested");
        }
        self.stop.trigger();
    }

    pub fn state(&self) -> HostState {
        self.state.get()
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_triggered()
    }

    pub(crate) fn cell(&self) -> &StateCell {
        &self.state
    }

    pub(crate) fn stop_signal(&self) -> crate::lifecycle::ShutdownSignal {
        self.stop.subscribe()
    }
}

impl std::fmt::Debug for HostHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostHandle")
            .field("state", &self.state())
            .field("stop_requested", &self.is_stop_requested())
            .finish()
    }
}

/// What service registrations can see while the host is being built.
#[derive(Debug, Clone)]
pub struct HostContext {
    environment: String,
    config: ConfigView,
}

impl HostContext {
    pub(crate) fn new(environment: String, config: ConfigView) -> Self {
        Self {
            environment,
            config,
        }
    }

    /// Hosting environment name (`Production`, `Development`, ...).
    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn is_environment(&self, name: &str) -> bool {
        self.environment.eq_ignore_ascii_case(name)
    }

    pub fn config(&self) -> &ConfigView {
        &self.config
    }
}
