//! Worker supervision: concurrent start, broadcast stop, bounded wait.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::lifecycle::shutdown::Shutdown;
use crate::worker::{BackgroundWorker, WorkerFault};

/// Stand-in deadline for timeouts the clock cannot represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// How a worker task ended.
#[derive(Debug, Clone)]
enum WorkerOutcome {
    Completed,
    Faulted(WorkerFault),
}

struct RunningWorker {
    name: String,
    handle: JoinHandle<WorkerOutcome>,
}

/// Result of [`WorkerSupervisor::stop_all`], by worker name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Exited normally (before or after cancellation).
    pub clean: Vec<String>,
    /// Ended with an error or panic.
    pub faulted: Vec<String>,
    /// Still running at the deadline; aborted and left behind.
    pub abandoned: Vec<String>,
}

impl StopReport {
    pub fn is_clean(&self) -> bool {
        self.faulted.is_empty() && self.abandoned.is_empty()
    }
}

/// Owns the registered workers and their tasks.
pub struct WorkerSupervisor {
    workers: Vec<Arc<dyn BackgroundWorker>>,
    running: Vec<RunningWorker>,
    shutdown: Shutdown,
    faults_tx: mpsc::UnboundedSender<WorkerFault>,
    faults_rx: Option<mpsc::UnboundedReceiver<WorkerFault>>,
}

impl WorkerSupervisor {
    pub fn new() -> Self {
        let (faults_tx, faults_rx) = mpsc::unbounded_channel();
        Self {
            workers: Vec::new(),
            running: Vec::new(),
            shutdown: Shutdown::new(),
            faults_tx,
            faults_rx: Some(faults_rx),
        }
    }

    pub fn register(&mut self, worker: Arc<dyn BackgroundWorker>) {
        self.workers.push(worker);
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.name().to_string()).collect()
    }

    /// Take the receiver of fault notifications. Available once.
    pub fn take_faults(&mut self) -> Option<mpsc::UnboundedReceiver<WorkerFault>> {
        self.faults_rx.take()
    }

    /// Spawn every registered worker on its own task and return immediately.
    pub fn start_all(&mut self) {
        if !self.running.is_empty() {
            tracing::warn!("Workers already started");
            return;
        }
        for worker in &self.workers {
            let name = worker.name().to_string();
            let handle = tokio::spawn(supervise(
                Arc::clone(worker),
                self.shutdown.clone(),
                self.faults_tx.clone(),
            ));
            tracing::info!(worker = %name, "Worker started");
            self.running.push(RunningWorker { name, handle });
        }
    }

    /// Cancel every worker at once and wait up to `timeout` for all of them.
    ///
    /// Workers still running at the deadline are aborted and reported as
    /// abandoned; this never waits longer than `timeout`.
    pub async fn stop_all(&mut self, timeout: Duration) -> StopReport {
        self.shutdown.trigger();
        let now = Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or(now + FAR_FUTURE);
        let mut report = StopReport::default();

        for RunningWorker { name, mut handle } in self.running.drain(..) {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(WorkerOutcome::Completed)) => report.clean.push(name),
                Ok(Ok(WorkerOutcome::Faulted(_))) => report.faulted.push(name),
                Ok(Err(e)) => {
                    tracing::error!(worker = %name, error = %e, "Worker task failed");
                    report.faulted.push(name);
                }
                Err(_) => {
                    handle.abort();
                    tracing::warn!(
                        worker = %name,
                        timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        "Worker did not stop within the shutdown timeout, abandoning"
                    );
                    report.abandoned.push(name);
                }
            }
        }

        tracing::info!(
            clean = report.clean.len(),
            faulted = report.faulted.len(),
            abandoned = report.abandoned.len(),
            "Workers stopped"
        );
        report
    }
}

impl Default for WorkerSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

async fn supervise(
    worker: Arc<dyn BackgroundWorker>,
    shutdown: Shutdown,
    faults: mpsc::UnboundedSender<WorkerFault>,
) -> WorkerOutcome {
    let name = worker.name().to_string();
    let outcome = AssertUnwindSafe(worker.run(shutdown.subscribe()))
        .catch_unwind()
        .await;

    let reason = match outcome {
        Ok(Ok(())) => {
            if shutdown.is_triggered() {
                tracing::info!(worker = %name, "Worker stopped");
            } else {
                tracing::info!(worker = %name, "Worker completed before shutdown");
            }
            return WorkerOutcome::Completed;
        }
        Ok(Err(e)) => e.to_string(),
        Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
    };

    let fault = WorkerFault {
        worker: name,
        reason,
    };
    tracing::error!(worker = %fault.worker, reason = %fault.reason, "Worker fault");
    let _ = faults.send(fault.clone());
    WorkerOutcome::Faulted(fault)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
