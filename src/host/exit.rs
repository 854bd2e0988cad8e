//! How a host run ended.

use std::process::ExitCode;

use crate::worker::WorkerFault;

/// Outcome of [`Host::run`](crate::host::Host::run), mapped to a process exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostExit {
    /// Every worker stopped in time and none faulted.
    Clean,
    /// The host never reached `Running`.
    StartupFailed,
    /// A worker faulted while the fault policy was `StopHost`.
    Faulted(Vec<WorkerFault>),
    /// Workers still running at the shutdown deadline.
    Abandoned(Vec<String>),
}

impl HostExit {
    pub fn code(&self) -> u8 {
        match self {
            HostExit::Clean => 0,
            HostExit::StartupFailed => 1,
            HostExit::Faulted(_) => 2,
            HostExit::Abandoned(_) => 3,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, HostExit::Clean)
    }
}

impl From<HostExit> for ExitCode {
    fn from(exit: HostExit) -> Self {
        ExitCode::from(exit.code())
    }
}
