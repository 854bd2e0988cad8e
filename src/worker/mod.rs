//! Background workers and their supervisor.
//!
//! # Data Flow
//! ```text
//! ServiceProvider::resolve_all::<dyn BackgroundWorker>()
//!     → WorkerSupervisor::register
//!     → start_all: one tokio task per worker, each with a ShutdownSignal
//!     → fault? logged once, reported on the fault channel
//!     → stop_all(timeout): trigger, wait against one deadline, abort stragglers
//! ```
//!
//! # Design Decisions
//! - Cancellation is cooperative and broadcast to all workers at once
//! - A panic inside a worker is a fault like any returned error
//! - No restarts: a faulted worker stays stopped

pub mod supervisor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lifecycle::shutdown::ShutdownSignal;

pub use supervisor::{StopReport, WorkerSupervisor};

/// A long-running unit of work owned by the host.
///
/// `run` should return promptly once `shutdown` fires. Returning `Ok(())`
/// earlier is a normal completion; returning `Err` is a fault.
#[async_trait]
pub trait BackgroundWorker: Send + Sync + 'static {
    /// Name used in logs and stop reports.
    fn name(&self) -> &str;

    async fn run(&self, shutdown: ShutdownSignal) -> Result<(), WorkerError>;
}

/// Failure returned by a worker's run loop.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl WorkerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// A worker that stopped because of an error or panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFault {
    pub worker: String,
    pub reason: String,
}

impl std::fmt::Display for WorkerFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker `{}` faulted: {}", self.worker, self.reason)
    }
}

/// What a worker fault does to the host.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum FaultPolicy {
    /// Request host shutdown; the host exits non-zero.
    #[default]
    StopHost,
    /// Log the fault and keep the other workers running.
    Isolate,
}
