//! Resolution of registered services.

use std::any::{type_name, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::ReentrantMutex;

use crate::registry::collection::Registration;
use crate::registry::scope::{Scope, ScopeState};
use crate::registry::{downcast, Instance, Lifetime, ResolveError};

pub(crate) struct ProviderInner {
    pub(crate) registrations: Vec<Registration>,
    /// Contract → registration indices, in registration order.
    index: HashMap<TypeId, Vec<usize>>,
    singletons: Vec<OnceCell<Instance>>,
    /// Held while any singleton is being built. Re-entered by nested
    /// singleton dependencies on the same thread.
    construction: ReentrantMutex<()>,
    disposed: AtomicBool,
}

/// Frozen registry. Cheap to clone; clones share singletons.
#[derive(Clone)]
pub struct ServiceProvider {
    inner: Arc<ProviderInner>,
}

impl ServiceProvider {
    pub(crate) fn new(registrations: Vec<Registration>) -> Self {
        let mut index: HashMap<TypeId, Vec<usize>> = HashMap::new();
        for (i, registration) in registrations.iter().enumerate() {
            index.entry(registration.contract).or_default().push(i);
        }
        let singletons = registrations.iter().map(|_| OnceCell::new()).collect();
        Self {
            inner: Arc::new(ProviderInner {
                registrations,
                index,
                singletons,
                construction: ReentrantMutex::new(()),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Resolve the last registration of `T`.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ResolveError> {
        Resolver::root(&self.inner).resolve::<T>()
    }

    /// Like [`resolve`](Self::resolve), but `Ok(None)` when `T` is not registered.
    pub fn try_resolve<T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> Result<Option<Arc<T>>, ResolveError> {
        Resolver::root(&self.inner).try_resolve::<T>()
    }

    /// Resolve every registration of `T`, in registration order.
    pub fn resolve_all<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>, ResolveError> {
        Resolver::root(&self.inner).resolve_all::<T>()
    }

    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.inner.index.contains_key(&TypeId::of::<T>())
    }

    /// Open a scope for scoped services.
    pub fn create_scope(&self) -> Scope {
        Scope::new(Arc::clone(&self.inner))
    }

    /// Dispose created singletons in reverse registration order.
    ///
    /// Only the first call has an effect; later resolves fail with
    /// [`ResolveError::Disposed`].
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut disposed = 0usize;
        for (registration, cell) in self
            .inner
            .registrations
            .iter()
            .zip(&self.inner.singletons)
            .rev()
        {
            if let (Some(dispose), Some(instance)) = (&registration.disposer, cell.get()) {
                tracing::debug!(contract = registration.contract_name, "Disposing service");
                dispose(instance);
                disposed += 1;
            }
        }
        tracing::debug!(disposed, "Service provider disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("registrations", &self.inner.registrations.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Resolution context handed to factories.
///
/// Carries the chain of contracts being constructed so a factory that
/// (transitively) depends on itself fails with [`ResolveError::Cycle`]
/// instead of recursing.
pub struct Resolver<'a> {
    provider: &'a ProviderInner,
    scope: Option<&'a ScopeState>,
    path: RefCell<Vec<(TypeId, &'static str)>>,
}

impl<'a> Resolver<'a> {
    fn root(provider: &'a ProviderInner) -> Self {
        Self {
            provider,
            scope: None,
            path: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn scoped(provider: &'a ProviderInner, scope: &'a ScopeState) -> Self {
        Self {
            provider,
            scope: Some(scope),
            path: RefCell::new(Vec::new()),
        }
    }

    /// Resolve the last registration of `T`.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ResolveError> {
        self.try_resolve::<T>()?.ok_or(ResolveError::Unresolved {
            contract: type_name::<T>(),
        })
    }

    pub fn try_resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>, ResolveError> {
        let Some(&index) = self
            .provider
            .index
            .get(&TypeId::of::<T>())
            .and_then(|indices| indices.last())
        else {
            return Ok(None);
        };
        let instance = self.resolve_index(index)?;
        downcast::<T>(&instance).map(Some).ok_or(ResolveError::Unresolved {
            contract: type_name::<T>(),
        })
    }

    /// Resolve every registration of `T`, in registration order.
    pub fn resolve_all<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>, ResolveError> {
        let Some(indices) = self.provider.index.get(&TypeId::of::<T>()) else {
            return Ok(Vec::new());
        };
        indices
            .iter()
            .map(|&index| {
                let instance = self.resolve_index(index)?;
                downcast::<T>(&instance).ok_or(ResolveError::Unresolved {
                    contract: type_name::<T>(),
                })
            })
            .collect()
    }

    fn resolve_index(&self, index: usize) -> Result<Instance, ResolveError> {
        if self.provider.disposed.load(Ordering::SeqCst) {
            return Err(ResolveError::Disposed);
        }
        let registration = &self.provider.registrations[index];
        {
            let path = self.path.borrow();
            if path.iter().any(|(id, _)| *id == registration.contract) {
                let mut cycle: Vec<&'static str> = path.iter().map(|(_, name)| *name).collect();
                cycle.push(registration.contract_name);
                return Err(ResolveError::Cycle { path: cycle });
            }
        }

        self.path
            .borrow_mut()
            .push((registration.contract, registration.contract_name));
        let result = self.construct(index, registration);
        self.path.borrow_mut().pop();
        result
    }

    fn construct(&self, index: usize, registration: &Registration) -> Result<Instance, ResolveError> {
        match registration.lifetime {
            Lifetime::Transient => (registration.factory)(self),
            Lifetime::Singleton => {
                let cell = &self.provider.singletons[index];
                if let Some(instance) = cell.get() {
                    return Ok(instance.clone());
                }
                // One singleton graph is built at a time, so a cycle entered
                // from two threads still shows up on a single resolution path.
                let _building = self.provider.construction.lock();
                cell.get_or_try_init(|| {
                    // Singletons outlive any scope, so their dependencies
                    // resolve from the root.
                    let root = Resolver {
                        provider: self.provider,
                        scope: None,
                        path: RefCell::new(self.path.borrow().clone()),
                    };
                    tracing::trace!(contract = registration.contract_name, "Creating singleton");
                    (registration.factory)(&root)
                })
                .cloned()
            }
            Lifetime::Scoped => {
                let scope = self.scope.ok_or(ResolveError::ScopeRequired {
                    contract: registration.contract_name,
                })?;
                scope.get_or_create(index, || (registration.factory)(self))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Condvar, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::registry::{Dispose, ServiceCollection};

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".into()
        }
    }

    struct French;

    impl Greeter for French {
        fn greet(&self) -> String {
            "bonjour".into()
        }
    }

    struct A(#[allow(dead_code)] Arc<B>);
    struct B(#[allow(dead_code)] Arc<C>);
    struct C(#[allow(dead_code)] Arc<A>);

    #[test]
    fn test_unregistered_contract_fails() {
        let provider = ServiceCollection::new().build();
        let err = provider.resolve::<dyn Greeter>().err().unwrap();
        assert!(matches!(err, ResolveError::Unresolved { .. }));
        assert!(provider.try_resolve::<dyn Greeter>().unwrap().is_none());
    }

    #[test]
    fn test_trait_object_contract() {
        let mut services = ServiceCollection::new();
        services.add_singleton::<dyn Greeter, _>(|_| Ok(Arc::new(English)));
        let provider = services.build();
        assert_eq!(provider.resolve::<dyn Greeter>().unwrap().greet(), "hello");
    }

    #[test]
    fn test_last_registration_wins_and_resolve_all_keeps_order() {
        let mut services = ServiceCollection::new();
        services
            .add_singleton::<dyn Greeter, _>(|_| Ok(Arc::new(English)))
            .add_singleton::<dyn Greeter, _>(|_| Ok(Arc::new(French)));
        let provider = services.build();

        assert_eq!(provider.resolve::<dyn Greeter>().unwrap().greet(), "bonjour");
        let all: Vec<_> = provider
            .resolve_all::<dyn Greeter>()
            .unwrap()
            .iter()
            .map(|g| g.greet())
            .collect();
        assert_eq!(all, vec!["hello", "bonjour"]);
    }

    #[test]
    fn test_singleton_factory_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut services = ServiceCollection::new();
        services.add_singleton(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(English))
        });
        let provider = services.build();

        let first = provider.resolve::<English>().unwrap();
        for _ in 0..10 {
            let again = provider.resolve::<English>().unwrap();
            assert!(Arc::ptr_eq(&first, &again));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_singleton_factory_runs_once_across_threads() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut services = ServiceCollection::new();
        services.add_singleton(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(10));
            Ok(Arc::new(English))
        });
        let provider = services.build();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let provider = provider.clone();
                std::thread::spawn(move || provider.resolve::<English>().map(|_| ()).is_ok())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transient_factory_runs_every_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut services = ServiceCollection::new();
        services.add_transient(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(English))
        });
        let provider = services.build();

        let a = provider.resolve::<English>().unwrap();
        let b = provider.resolve::<English>().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_direct_cycle_detected() {
        struct SelfRef(#[allow(dead_code)] Arc<SelfRef>);
        let mut services = ServiceCollection::new();
        services.add_singleton(|r| Ok(Arc::new(SelfRef(r.resolve::<SelfRef>()?))));
        let provider = services.build();

        match provider.resolve::<SelfRef>() {
            Err(ResolveError::Cycle { path }) => assert_eq!(path.len(), 2),
            other => panic!("expected cycle, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_transitive_cycle_detected() {
        let mut services = ServiceCollection::new();
        services
            .add_singleton(|r| Ok(Arc::new(A(r.resolve::<B>()?))))
            .add_transient(|r| Ok(Arc::new(B(r.resolve::<C>()?))))
            .add_singleton(|r| Ok(Arc::new(C(r.resolve::<A>()?))));
        let provider = services.build();

        let err = provider.resolve::<A>().err().unwrap();
        match err {
            ResolveError::Cycle { path } => {
                assert_eq!(path.len(), 4);
                assert_eq!(path.first(), path.last());
            }
            other => panic!("expected cycle, got {other}"),
        }
        // A failed build leaves the singleton unset; the cycle is reported again.
        assert!(matches!(provider.resolve::<B>(), Err(ResolveError::Cycle { .. })));
    }

    #[test]
    fn test_cycle_entered_from_both_ends_concurrently() {
        struct X(#[allow(dead_code)] Arc<Y>);
        struct Y(#[allow(dead_code)] Arc<X>);

        // Each factory waits briefly for the other thread so both race into
        // the cycle from opposite ends.
        fn rendezvous(arrived: &(Mutex<usize>, Condvar)) {
            let (count, ready) = arrived;
            let mut count = count.lock().unwrap();
            *count += 1;
            ready.notify_all();
            let _ = ready
                .wait_timeout_while(count, Duration::from_millis(200), |n| *n < 2)
                .unwrap();
        }

        let arrived = Arc::new((Mutex::new(0usize), Condvar::new()));
        let (at_x, at_y) = (arrived.clone(), arrived.clone());
        let mut services = ServiceCollection::new();
        services
            .add_singleton(move |r| {
                rendezvous(&at_x);
                Ok(Arc::new(X(r.resolve::<Y>()?)))
            })
            .add_singleton(move |r| {
                rendezvous(&at_y);
                Ok(Arc::new(Y(r.resolve::<X>()?)))
            });
        let provider = services.build();

        let (tx, rx) = std::sync::mpsc::channel();
        for from_x in [true, false] {
            let provider = provider.clone();
            let tx = tx.clone();
            std::thread::spawn(move || {
                let result = if from_x {
                    provider.resolve::<X>().map(drop)
                } else {
                    provider.resolve::<Y>().map(drop)
                };
                let _ = tx.send(result);
            });
        }

        for _ in 0..2 {
            let result = rx
                .recv_timeout(Duration::from_secs(5))
                .expect("resolution deadlocked");
            assert!(matches!(result, Err(ResolveError::Cycle { .. })));
        }
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        struct Shared;
        struct Left(#[allow(dead_code)] Arc<Shared>);
        struct Right(#[allow(dead_code)] Arc<Shared>);
        struct Top(#[allow(dead_code)] Arc<Left>, #[allow(dead_code)] Arc<Right>);

        let mut services = ServiceCollection::new();
        services
            .add_singleton(|_| Ok(Arc::new(Shared)))
            .add_transient(|r| Ok(Arc::new(Left(r.resolve()?))))
            .add_transient(|r| Ok(Arc::new(Right(r.resolve()?))))
            .add_transient(|r| Ok(Arc::new(Top(r.resolve()?, r.resolve()?))));
        assert!(services.build().resolve::<Top>().is_ok());
    }

    #[test]
    fn test_factory_error_is_wrapped() {
        let mut services = ServiceCollection::new();
        services.add_singleton::<English, _>(|_| Err(ResolveError::factory::<English>("no locale")));
        let err = services.build().resolve::<English>().err().unwrap();
        assert!(err.to_string().contains("no locale"));
        assert!(err.contract().unwrap().ends_with("English"));
    }

    struct Tracked {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Dispose for Tracked {
        fn dispose(&self) {
            self.log.lock().unwrap().push(self.name);
        }
    }

    struct First(Tracked);
    struct Second(Tracked);
    struct Never(Tracked);

    impl Dispose for First {
        fn dispose(&self) {
            self.0.dispose();
        }
    }

    impl Dispose for Second {
        fn dispose(&self) {
            self.0.dispose();
        }
    }

    impl Dispose for Never {
        fn dispose(&self) {
            self.0.dispose();
        }
    }

    #[test]
    fn test_dispose_reverse_registration_order_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (l1, l2, l3) = (log.clone(), log.clone(), log.clone());
        let mut services = ServiceCollection::new();
        services
            .add_singleton_disposable(move |_| {
                Ok(Arc::new(First(Tracked { name: "first", log: l1.clone() })))
            })
            .add_singleton_disposable(move |_| {
                Ok(Arc::new(Second(Tracked { name: "second", log: l2.clone() })))
            })
            .add_singleton_disposable(move |_| {
                Ok(Arc::new(Never(Tracked { name: "never", log: l3.clone() })))
            });
        let provider = services.build();

        // Resolve out of registration order; disposal still follows registration.
        provider.resolve::<Second>().unwrap();
        provider.resolve::<First>().unwrap();

        provider.dispose();
        provider.dispose();
        assert_eq!(*log.lock().unwrap(), vec!["second", "first"]);
        assert!(matches!(provider.resolve::<First>(), Err(ResolveError::Disposed)));
    }
}
