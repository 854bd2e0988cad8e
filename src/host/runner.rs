//! Running host.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::config::{ConfigView, ConfigWatcher};
use crate::host::{HostContext, HostError, HostExit, HostHandle, HostState};
use crate::lifecycle::signals;
use crate::options::Rebind;
use crate::registry::ServiceProvider;
use crate::worker::{FaultPolicy, WorkerFault, WorkerSupervisor};

/// Why the host left `Running`.
enum StopCause {
    Signal(signals::TerminationSignal),
    Requested,
    Caller,
    Fault(WorkerFault),
}

impl std::fmt::Display for StopCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopCause::Signal(signal) => write!(f, "signal {signal}"),
            StopCause::Requested => f.write_str("stop requested"),
            StopCause::Caller => f.write_str("run future completed"),
            StopCause::Fault(fault) => write!(f, "{fault}"),
        }
    }
}

/// A built host, ready to run. Produced by [`HostBuilder::build`](crate::host::HostBuilder::build).
pub struct Host {
    pub(crate) view: ConfigView,
    pub(crate) provider: ServiceProvider,
    pub(crate) supervisor: WorkerSupervisor,
    pub(crate) handle: HostHandle,
    pub(crate) context: HostContext,
    pub(crate) monitors: Vec<Arc<dyn Rebind>>,
    pub(crate) shutdown_timeout: Duration,
    pub(crate) fault_policy: FaultPolicy,
    pub(crate) watch_config: bool,
    pub(crate) handle_signals: bool,
}

impl Host {
    pub fn handle(&self) -> HostHandle {
        self.handle.clone()
    }

    pub fn services(&self) -> &ServiceProvider {
        &self.provider
    }

    pub fn config(&self) -> &ConfigView {
        &self.view
    }

    pub fn context(&self) -> &HostContext {
        &self.context
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    pub fn fault_policy(&self) -> FaultPolicy {
        self.fault_policy
    }

    pub fn worker_names(&self) -> Vec<String> {
        self.supervisor.names()
    }

    /// Run until a termination signal, [`HostHandle::stop`], or an escalated
    /// worker fault.
    pub async fn run(self) -> Result<HostExit, HostError> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Like [`run`](Self::run), also stopping when `stop` completes.
    pub async fn run_until<F>(mut self, stop: F) -> Result<HostExit, HostError>
    where
        F: Future<Output = ()>,
    {
        let state = self.handle.cell();
        state.advance(HostState::Building, HostState::Running)?;

        let mut faults = self.supervisor.take_faults();
        self.supervisor.start_all();

        let _watcher = if self.watch_config {
            start_watcher(&self.view)
        } else {
            None
        };
        let rebind = tokio::spawn(rebind_on_reload(
            self.view.clone(),
            self.view.subscribe(),
            std::mem::take(&mut self.monitors),
        ));
        let hangup = self
            .handle_signals
            .then(|| tokio::spawn(signals::reload_on_hangup(self.view.clone())));

        tracing::info!(
            workers = self.supervisor.len(),
            "Sage application configuration complete."
        );

        let mut isolated = Vec::new();
        let cause = {
            let termination = signals::wait_for_termination();
            tokio::pin!(termination);
            tokio::pin!(stop);
            let mut requested = self.handle.stop_signal();

            loop {
                let cause = tokio::select! {
                    received = &mut termination, if self.handle_signals => StopCause::Signal(received),
                    _ = requested.recv() => StopCause::Requested,
                    _ = &mut stop => StopCause::Caller,
                    fault = next_fault(&mut faults) => StopCause::Fault(fault),
                };
                match cause {
                    StopCause::Fault(fault) if self.fault_policy == FaultPolicy::Isolate => {
                        tracing::warn!(
                            worker = %fault.worker,
                            "Worker fault isolated, host keeps running"
                        );
                        isolated.push(fault);
                    }
                    cause => break cause,
                }
            }
        };

        state.advance(HostState::Running, HostState::StoppingRequested)?;
        tracing::info!(
            cause = %cause,
            timeout_ms = u64::try_from(self.shutdown_timeout.as_millis()).unwrap_or(u64::MAX),
            "Sage application stopping."
        );

        let report = self.supervisor.stop_all(self.shutdown_timeout).await;

        let mut escalated = Vec::new();
        if let StopCause::Fault(fault) = cause {
            escalated.push(fault);
        }
        if let Some(rx) = faults.as_mut() {
            while let Ok(fault) = rx.try_recv() {
                escalated.push(fault);
            }
        }
        if self.fault_policy == FaultPolicy::Isolate {
            isolated.append(&mut escalated);
        }

        rebind.abort();
        if let Some(hangup) = hangup {
            hangup.abort();
        }
        self.provider.dispose();

        state.advance(HostState::StoppingRequested, HostState::Stopped)?;

        let exit = if !escalated.is_empty() {
            HostExit::Faulted(escalated)
        } else if !report.abandoned.is_empty() {
            HostExit::Abandoned(report.abandoned)
        } else {
            HostExit::Clean
        };
        tracing::info!(
            exit_code = exit.code(),
            isolated_faults = isolated.len(),
            "Sage application stopped."
        );
        Ok(exit)
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("environment", &self.context.environment())
            .field("state", &self.handle.state())
            .field("workers", &self.supervisor.names())
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("fault_policy", &self.fault_policy)
            .finish()
    }
}

async fn next_fault(faults: &mut Option<mpsc::UnboundedReceiver<WorkerFault>>) -> WorkerFault {
    if let Some(rx) = faults.as_mut() {
        if let Some(fault) = rx.recv().await {
            return fault;
        }
    }
    std::future::pending().await
}

fn start_watcher(view: &ConfigView) -> Option<notify::RecommendedWatcher> {
    let watcher = ConfigWatcher::new(view.clone());
    if !watcher.has_files() {
        return None;
    }
    match watcher.run() {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to watch configuration files, hot reload disabled");
            None
        }
    }
}

/// Re-bind every options monitor after each successful reload.
async fn rebind_on_reload(
    view: ConfigView,
    mut changes: watch::Receiver<u64>,
    monitors: Vec<Arc<dyn Rebind>>,
) {
    while changes.changed().await.is_ok() {
        let generation = *changes.borrow_and_update();
        for monitor in &monitors {
            monitor.rebind(&view);
        }
        tracing::debug!(generation, monitors = monitors.len(), "Options refreshed");
    }
}
