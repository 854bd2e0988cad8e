//! The services and workers the `sage` binary ships with.
//!
//! # Data Flow
//! ```text
//! `heartbeat` section → OptionsMonitor<HeartbeatOptions>
//!     → HeartbeatWorker (every `interval_ms`)
//!     → StatusService::record_beat
//! ```
//!
//! Real deployments add their own options, services and workers through
//! the same [`HostBuilder`] calls `register` uses.

pub mod heartbeat;
pub mod status;

use std::sync::Arc;

use crate::host::HostBuilder;
use crate::options::OptionsMonitor;

pub use heartbeat::{HeartbeatOptions, HeartbeatWorker};
pub use status::{InMemoryStatus, StatusService};

/// Register the bundled options, services and workers.
pub fn register(builder: &mut HostBuilder) {
    builder
        .add_options::<HeartbeatOptions>()
        .configure_services(|_, services| {
            services.add_singleton::<dyn StatusService, _>(|_| {
                let status: Arc<dyn StatusService> = Arc::new(InMemoryStatus::default());
                Ok(status)
            });
        })
        .add_worker(|r| {
            Ok(Arc::new(HeartbeatWorker::new(
                r.resolve::<OptionsMonitor<HeartbeatOptions>>()?,
                r.resolve::<dyn StatusService>()?,
            )))
        });
}
