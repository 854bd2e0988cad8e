//! Periodic heartbeat worker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::app::status::StatusService;
use crate::config::validation::{ValidationError, Validator};
use crate::lifecycle::ShutdownSignal;
use crate::options::{Options, OptionsMonitor};
use crate::worker::{BackgroundWorker, WorkerError};

/// `heartbeat` section.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HeartbeatOptions {
    pub interval_ms: u64,
    pub message: String,
}

impl HeartbeatOptions {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for HeartbeatOptions {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            message: "alive".to_string(),
        }
    }
}

impl Options for HeartbeatOptions {
    const SECTION: &'static str = "heartbeat";

    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut v = Validator::new();
        v.check(self.interval_ms > 0, "interval_ms", "must be greater than 0");
        v.check(!self.message.trim().is_empty(), "message", "must not be empty");
        v.finish()
    }
}

/// Records a beat every `interval_ms`, re-reading its options before each
/// wait so reloads take effect without a restart.
pub struct HeartbeatWorker {
    options: Arc<OptionsMonitor<HeartbeatOptions>>,
    status: Arc<dyn StatusService>,
}

impl HeartbeatWorker {
    pub fn new(
        options: Arc<OptionsMonitor<HeartbeatOptions>>,
        status: Arc<dyn StatusService>,
    ) -> Self {
        Self { options, status }
    }
}

#[async_trait]
impl BackgroundWorker for HeartbeatWorker {
    fn name(&self) -> &str {
        "heartbeat"
    }

    async fn run(&self, mut shutdown: ShutdownSignal) -> Result<(), WorkerError> {
        loop {
            let options = self.options.get();
            tokio::select! {
                _ = tokio::time::sleep(options.interval()) => {
                    self.status.record_beat(&options.message);
                    tracing::debug!(
                        beats = self.status.beats(),
                        message = %options.message,
                        "Heartbeat"
                    );
                }
                _ = shutdown.recv() => return Ok(()),
            }
        }
    }
}
