//! Registration table built during host construction.

use std::any::{type_name, TypeId};
use std::sync::Arc;

use crate::registry::{
    downcast, Dispose, Disposer, Factory, Instance, Lifetime, ResolveError, Resolver,
    ServiceProvider,
};
use crate::worker::BackgroundWorker;

/// One contract → factory binding.
pub(crate) struct Registration {
    pub(crate) contract: TypeId,
    pub(crate) contract_name: &'static str,
    pub(crate) lifetime: Lifetime,
    pub(crate) factory: Factory,
    pub(crate) disposer: Option<Disposer>,
}

/// Mutable list of registrations; becomes a [`ServiceProvider`] on `build`.
#[derive(Default)]
pub struct ServiceCollection {
    registrations: Vec<Registration>,
}

impl ServiceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` with an explicit lifetime.
    pub fn add<T, F>(&mut self, lifetime: Lifetime, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, ResolveError> + Send + Sync + 'static,
    {
        self.push::<T, F>(lifetime, factory, None)
    }

    pub fn add_singleton<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, ResolveError> + Send + Sync + 'static,
    {
        self.add(Lifetime::Singleton, factory)
    }

    pub fn add_scoped<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, ResolveError> + Send + Sync + 'static,
    {
        self.add(Lifetime::Scoped, factory)
    }

    pub fn add_transient<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, ResolveError> + Send + Sync + 'static,
    {
        self.add(Lifetime::Transient, factory)
    }

    /// Register an already constructed singleton.
    pub fn add_instance<T>(&mut self, instance: Arc<T>) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.add_singleton(move |_| Ok(Arc::clone(&instance)))
    }

    /// Register a singleton that is disposed when the provider is.
    pub fn add_singleton_disposable<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Dispose + Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, ResolveError> + Send + Sync + 'static,
    {
        self.push::<T, F>(Lifetime::Singleton, factory, Some(disposer::<T>()))
    }

    /// Register a scoped service that is disposed with its scope.
    pub fn add_scoped_disposable<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Dispose + Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, ResolveError> + Send + Sync + 'static,
    {
        self.push::<T, F>(Lifetime::Scoped, factory, Some(disposer::<T>()))
    }

    /// Register a background worker. Every registration runs; workers are
    /// singletons under the `dyn BackgroundWorker` contract.
    pub fn add_worker<W, F>(&mut self, factory: F) -> &mut Self
    where
        W: BackgroundWorker,
        F: Fn(&Resolver<'_>) -> Result<Arc<W>, ResolveError> + Send + Sync + 'static,
    {
        self.add_singleton::<dyn BackgroundWorker, _>(move |resolver| {
            let worker: Arc<dyn BackgroundWorker> = factory(resolver)?;
            Ok(worker)
        })
    }

    /// Whether any registration exists for `T`.
    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        let contract = TypeId::of::<T>();
        self.registrations.iter().any(|r| r.contract == contract)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Freeze the table.
    pub fn build(self) -> ServiceProvider {
        ServiceProvider::new(self.registrations)
    }

    fn push<T, F>(&mut self, lifetime: Lifetime, factory: F, disposer: Option<Disposer>) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, ResolveError> + Send + Sync + 'static,
    {
        let erased: Factory = Arc::new(move |resolver: &Resolver<'_>| {
            let service: Arc<T> = factory(resolver)?;
            let instance: Instance = Arc::new(service);
            Ok(instance)
        });
        self.registrations.push(Registration {
            contract: TypeId::of::<T>(),
            contract_name: type_name::<T>(),
            lifetime,
            factory: erased,
            disposer,
        });
        self
    }
}

fn disposer<T>() -> Disposer
where
    T: ?Sized + Dispose + Send + Sync + 'static,
{
    Arc::new(|instance: &Instance| {
        if let Some(service) = downcast::<T>(instance) {
            service.dispose();
        }
    })
}
