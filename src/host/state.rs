//! Host state machine.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::host::HostError;

/// Lifecycle state of a host. Moves forward only:
/// `Building → Running → StoppingRequested → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum HostState {
    Building = 0,
    Running = 1,
    StoppingRequested = 2,
    Stopped = 3,
}

impl HostState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Building,
            1 => Self::Running,
            2 => Self::StoppingRequested,
            _ => Self::Stopped,
        }
    }

    /// The only state this one may move to.
    pub fn successor(self) -> Option<Self> {
        match self {
            Self::Building => Some(Self::Running),
            Self::Running => Some(Self::StoppingRequested),
            Self::StoppingRequested => Some(Self::Stopped),
            Self::Stopped => None,
        }
    }
}

impl std::fmt::Display for HostState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Building => "Building",
            Self::Running => "Running",
            Self::StoppingRequested => "StoppingRequested",
            Self::Stopped => "Stopped",
        };
        f.write_str(name)
    }
}

/// Shared, atomically updated [`HostState`].
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(HostState::Building as u8))
    }

    pub(crate) fn get(&self) -> HostState {
        HostState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Move from `from` to its successor. Fails if the current state is not
    /// `from`, or if `to` is not the successor of `from`.
    pub(crate) fn advance(&self, from: HostState, to: HostState) -> Result<(), HostError> {
        if from.successor() != Some(to) {
            return Err(HostError::InvalidState { from, to });
        }
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|actual| HostError::InvalidState {
                from: HostState::from_u8(actual),
                to,
            })
    }
}
