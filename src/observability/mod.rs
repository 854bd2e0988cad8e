//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Every subsystem emits tracing events
//!     → EnvFilter built from Logging:LogLevel (or RUST_LOG)
//!     → fmt layer (pretty, compact or JSON per Logging:Format)
//!     → stdout
//! ```
//!
//! # Design Decisions
//! - Structured fields (`worker`, `generation`, `section`) over formatted text
//! - The subscriber is installed once by the host builder; embedders may
//!   install their own and skip it

pub mod logging;
