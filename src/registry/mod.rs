//! Service registry.
//!
//! # Data Flow
//! ```text
//! Building:
//!     ServiceCollection::add_* (contract, factory, lifetime)
//!     → build() freezes the table
//!
//! Running:
//!     ServiceProvider::resolve::<T>()
//!     → last registration for T
//!     → Resolver (tracks the active resolution path)
//!     → factory, cached per lifetime
//!
//! Stopping:
//!     ServiceProvider::dispose() → created singletons, reverse registration order
//! ```
//!
//! # Design Decisions
//! - Contracts are keyed by `TypeId`; `T` may be a trait object (`dyn Trait`)
//! - The last registration of a contract wins for `resolve`;
//!   `resolve_all` returns every registration in order
//! - Singletons are created at most once per provider, even under
//!   concurrent resolution
//! - The provider has no registration API, so it is read-only once built
//! - Scoped services can only be resolved through a [`Scope`], and never
//!   from inside a singleton factory

pub mod collection;
pub mod provider;
pub mod scope;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

pub use collection::ServiceCollection;
pub use provider::{Resolver, ServiceProvider};
pub use scope::Scope;

/// How long a resolved instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// One instance per provider.
    Singleton,
    /// One instance per [`Scope`].
    Scoped,
    /// A new instance on every resolve.
    Transient,
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Singleton => f.write_str("singleton"),
            Self::Scoped => f.write_str("scoped"),
            Self::Transient => f.write_str("transient"),
        }
    }
}

/// Cleanup hook for services holding resources.
pub trait Dispose {
    fn dispose(&self);
}

/// Errors raised while resolving a contract.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no service registered for `{contract}`")]
    Unresolved { contract: &'static str },

    #[error("dependency cycle detected: {}", .path.join(" -> "))]
    Cycle { path: Vec<&'static str> },

    #[error("scoped service `{contract}` cannot be resolved outside a scope")]
    ScopeRequired { contract: &'static str },

    #[error("factory for `{contract}` failed: {source}")]
    Factory {
        contract: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("service provider has been disposed")]
    Disposed,
}

impl ResolveError {
    /// Wrap a construction failure of `T`.
    pub fn factory<T: ?Sized>(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Factory {
            contract: std::any::type_name::<T>(),
            source: source.into(),
        }
    }

    /// Contract the failure is about, when there is one.
    pub fn contract(&self) -> Option<&'static str> {
        match self {
            Self::Unresolved { contract }
            | Self::ScopeRequired { contract }
            | Self::Factory { contract, .. } => Some(contract),
            Self::Cycle { path } => path.first().copied(),
            Self::Disposed => None,
        }
    }
}

/// A constructed service, stored as `Arc<T>` inside the `Any`.
pub(crate) type Instance = Arc<dyn Any + Send + Sync>;

pub(crate) type Factory =
    Arc<dyn Fn(&Resolver<'_>) -> Result<Instance, ResolveError> + Send + Sync>;

pub(crate) type Disposer = Arc<dyn Fn(&Instance) + Send + Sync>;

pub(crate) fn downcast<T: ?Sized + Send + Sync + 'static>(instance: &Instance) -> Option<Arc<T>> {
    instance.downcast_ref::<Arc<T>>().cloned()
}
