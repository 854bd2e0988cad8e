//! Sage: a generic application host.
//!
//! Layered configuration, typed options, a service registry and a worker
//! supervisor, tied together by [`HostBuilder`] and [`Host`].

pub mod app;
pub mod config;
pub mod host;
pub mod lifecycle;
pub mod observability;
pub mod options;
pub mod registry;
pub mod worker;

pub use crate::config::{ConfigStack, ConfigView};
pub use host::{Host, HostBuilder, HostContext, HostError, HostExit, HostHandle, HostState};
pub use lifecycle::{Shutdown, ShutdownSignal};
pub use options::{Options, OptionsMonitor};
pub use registry::{ServiceCollection, ServiceProvider};
pub use worker::{BackgroundWorker, FaultPolicy, WorkerError};
