//! Explicit resolution scopes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::registry::provider::{ProviderInner, Resolver};
use crate::registry::{Instance, ResolveError};

pub(crate) struct ScopeState {
    instances: Vec<OnceCell<Instance>>,
    disposed: AtomicBool,
}

impl ScopeState {
    pub(crate) fn get_or_create<F>(&self, index: usize, create: F) -> Result<Instance, ResolveError>
    where
        F: FnOnce() -> Result<Instance, ResolveError>,
    {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(ResolveError::Disposed);
        }
        self.instances[index].get_or_try_init(create).cloned()
    }
}

/// A unit of work with its own scoped instances.
///
/// Singletons and transients resolve as they do from the provider; scoped
/// services are created once per scope. Scoped disposables are disposed, in
/// reverse registration order, when the scope is disposed or dropped.
pub struct Scope {
    provider: Arc<ProviderInner>,
    state: ScopeState,
}

impl Scope {
    pub(crate) fn new(provider: Arc<ProviderInner>) -> Self {
        let instances = provider.registrations.iter().map(|_| OnceCell::new()).collect();
        Self {
            provider,
            state: ScopeState {
                instances,
                disposed: AtomicBool::new(false),
            },
        }
    }

    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ResolveError> {
        Resolver::scoped(&self.provider, &self.state).resolve::<T>()
    }

    pub fn try_resolve<T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> Result<Option<Arc<T>>, ResolveError> {
        Resolver::scoped(&self.provider, &self.state).try_resolve::<T>()
    }

    pub fn resolve_all<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>, ResolveError> {
        Resolver::scoped(&self.provider, &self.state).resolve_all::<T>()
    }

    pub fn dispose(&self) {
        if self.state.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        for (registration, cell) in self
            .provider
            .registrations
            .iter()
            .zip(&self.state.instances)
            .rev()
        {
            if let (Some(dispose), Some(instance)) = (&registration.disposer, cell.get()) {
                dispose(instance);
            }
        }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.dispose();
    }
}
