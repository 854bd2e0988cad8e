//! Lifecycle plumbing shared by the host and its workers.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     HostHandle::stop / signal / fault → Shutdown::trigger
//!         → every ShutdownSignal::recv returns
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → host stop request
//!     SIGHUP → ConfigView::reload
//! ```
//!
//! # Design Decisions
//! - One broadcast coordinator per purpose; no per-worker tokens
//! - Signals are level-triggered so late subscribers never miss a stop

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
