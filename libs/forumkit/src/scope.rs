//! Process-wide root container and the per-request service scope opened from it.
//!
//! Bindings are keyed by the requested type, which may be a trait object
//! (`dyn UrlBuilder`). Values are always handed out as `Arc<T>`.

use std::any::{type_name, Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

type Erased = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn(&ServiceScope) -> anyhow::Result<Erased> + Send + Sync>;

#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("no binding registered for '{0}'")]
    NotRegistered(&'static str),
    #[error("required binding for '{0}' is not registered")]
    MissingBinding(&'static str),
    #[error("root container is closed; no new scopes can be opened")]
    ContainerClosed,
    #[error("service scope has been disposed")]
    Disposed,
    #[error("circular dependency while resolving '{0}'")]
    Cycle(&'static str),
    #[error("singleton '{singleton}' cannot depend on scoped '{scoped}'")]
    CaptiveDependency {
        singleton: &'static str,
        scoped: &'static str,
    },
    #[error("binding for '{0}' produced a value of another type")]
    TypeMismatch(&'static str),
    #[error("factory for '{type_name}' failed")]
    Factory {
        type_name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifetime {
    /// One instance for the whole process, created on first resolution.
    Singleton,
    /// One instance per [`ServiceScope`].
    Scoped,
    /// A new instance on every resolution.
    Transient,
}

#[derive(Clone)]
struct Binding {
    type_name: &'static str,
    lifetime: Lifetime,
    factory: Factory,
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("type_name", &self.type_name)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

fn erase<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Erased {
    Arc::new(value)
}

fn unerase<T: ?Sized + Send + Sync + 'static>(value: &Erased) -> Result<Arc<T>, ScopeError> {
    value
        .downcast_ref::<Arc<T>>()
        .cloned()
        .ok_or(ScopeError::TypeMismatch(type_name::<T>()))
}

/// Collects bindings before the root container is sealed.
///
/// Later bindings for the same type replace earlier ones, so a host can
/// override a default implementation after registering it.
#[derive(Default)]
pub struct RootContainerBuilder {
    bindings: HashMap<TypeId, Binding>,
    required: Vec<(TypeId, &'static str)>,
}

impl RootContainerBuilder {
    fn bind<T, F>(mut self, lifetime: Lifetime, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceScope) -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        let binding = Binding {
            type_name: type_name::<T>(),
            lifetime,
            factory: Arc::new(move |scope| factory(scope).map(erase)),
        };
        if let Some(previous) = self.bindings.insert(TypeId::of::<T>(), binding) {
            tracing::debug!(service = previous.type_name, "binding overridden");
        }
        self
    }

    /// Register a pre-built value shared by every scope.
    pub fn instance<T: ?Sized + Send + Sync + 'static>(self, value: Arc<T>) -> Self {
        self.bind::<T, _>(Lifetime::Singleton, move |_| Ok(value.clone()))
    }

    pub fn singleton<T, F>(self, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceScope) -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        self.bind(Lifetime::Singleton, factory)
    }

    pub fn scoped<T, F>(self, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceScope) -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        self.bind(Lifetime::Scoped, factory)
    }

    pub fn transient<T, F>(self, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceScope) -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        self.bind(Lifetime::Transient, factory)
    }

    /// Declare a binding that must exist when the container is built.
    pub fn require<T: ?Sized + 'static>(mut self) -> Self {
        self.required.push((TypeId::of::<T>(), type_name::<T>()));
        self
    }

    pub fn build(self) -> Result<Arc<RootContainer>, ScopeError> {
        for &(id, name) in &self.required {
            if !self.bindings.contains_key(&id) {
                return Err(ScopeError::MissingBinding(name));
            }
        }

        tracing::debug!(bindings = self.bindings.len(), "root container built");

        Ok(Arc::new(RootContainer {
            bindings: self.bindings,
            singletons: DashMap::new(),
            closed: AtomicBool::new(false),
            next_scope_id: AtomicU64::new(1),
            live_scopes: AtomicUsize::new(0),
        }))
    }
}

/// Process-wide container. Shared across requests; each request opens its own scope.
pub struct RootContainer {
    bindings: HashMap<TypeId, Binding>,
    singletons: DashMap<TypeId, Erased>,
    closed: AtomicBool,
    next_scope_id: AtomicU64,
    live_scopes: AtomicUsize,
}

impl std::fmt::Debug for RootContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let services: Vec<&'static str> = self.bindings.values().map(|b| b.type_name).collect();
        f.debug_struct("RootContainer")
            .field("services", &services)
            .field("singletons_created", &self.singletons.len())
            .field("live_scopes", &self.live_scopes())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl RootContainer {
    pub fn builder() -> RootContainerBuilder {
        RootContainerBuilder::default()
    }

    pub fn is_registered<T: ?Sized + 'static>(&self) -> bool {
        self.bindings.contains_key(&TypeId::of::<T>())
    }

    /// Open a nested scope bound to one request.
    pub fn open_scope(self: &Arc<Self>) -> Result<ServiceScope, ScopeError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ScopeError::ContainerClosed);
        }
        let id = self.next_scope_id.fetch_add(1, Ordering::Relaxed);
        self.live_scopes.fetch_add(1, Ordering::AcqRel);
        tracing::trace!(scope_id = id, "service scope opened");

        Ok(ServiceScope {
            id,
            root: Arc::clone(self),
            instances: RefCell::new(HashMap::new()),
            resolving: RefCell::new(Vec::new()),
            disposed: Cell::new(false),
        })
    }

    /// Refuse new scopes. Scopes already open keep working until disposed.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Number of scopes opened and not yet disposed.
    pub fn live_scopes(&self) -> usize {
        self.live_scopes.load(Ordering::Acquire)
    }

    fn singleton(&self, id: TypeId, binding: &Binding, scope: &ServiceScope) -> Result<Erased, ScopeError> {
        if let Some(existing) = self.singletons.get(&id) {
            return Ok(existing.value().clone());
        }
        // Build outside the map lock: the factory may resolve other singletons.
        let built = (binding.factory)(scope).map_err(|source| ScopeError::Factory {
            type_name: binding.type_name,
            source,
        })?;
        Ok(self.singletons.entry(id).or_insert(built).value().clone())
    }
}

/// Nested, disposable scope owned by one request context.
///
/// Not `Sync`: a scope is used from the thread handling its request only.
pub struct ServiceScope {
    id: u64,
    root: Arc<RootContainer>,
    instances: RefCell<HashMap<TypeId, Erased>>,
    resolving: RefCell<Vec<Resolving>>,
    disposed: Cell<bool>,
}

#[derive(Clone, Copy)]
struct Resolving {
    id: TypeId,
    type_name: &'static str,
    lifetime: Lifetime,
}

/// Pops the innermost resolution frame, also when a factory unwinds.
struct ResolvingGuard<'a>(&'a RefCell<Vec<Resolving>>);

impl Drop for ResolvingGuard<'_> {
    fn drop(&mut self) {
        self.0.borrow_mut().pop();
    }
}

impl std::fmt::Debug for ServiceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceScope")
            .field("id", &self.id)
            .field("scoped_instances", &self.instances.borrow().len())
            .field("disposed", &self.disposed.get())
            .finish()
    }
}

impl ServiceScope {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    pub fn root(&self) -> &Arc<RootContainer> {
        &self.root
    }

    /// Resolve `T` through its registered binding.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ScopeError> {
        if self.disposed.get() {
            return Err(ScopeError::Disposed);
        }
        let id = TypeId::of::<T>();
        let binding = self
            .root
            .bindings
            .get(&id)
            .ok_or(ScopeError::NotRegistered(type_name::<T>()))?;

        {
            let stack = self.resolving.borrow();
            if stack.iter().any(|frame| frame.id == id) {
                return Err(ScopeError::Cycle(binding.type_name));
            }
            // A singleton outlives the scope, so it must not capture scope-owned values.
            if binding.lifetime == Lifetime::Scoped {
                if let Some(owner) = stack.iter().find(|f| f.lifetime == Lifetime::Singleton) {
                    return Err(ScopeError::CaptiveDependency {
                        singleton: owner.type_name,
                        scoped: binding.type_name,
                    });
                }
            }
        }
        self.resolving.borrow_mut().push(Resolving {
            id,
            type_name: binding.type_name,
            lifetime: binding.lifetime,
        });
        let guard = ResolvingGuard(&self.resolving);
        let result = self.resolve_binding(id, binding);
        drop(guard);

        unerase::<T>(&result?)
    }

    fn resolve_binding(&self, id: TypeId, binding: &Binding) -> Result<Erased, ScopeError> {
        match binding.lifetime {
            Lifetime::Singleton => self.root.singleton(id, binding, self),
            Lifetime::Scoped => {
                if let Some(existing) = self.instances.borrow().get(&id) {
                    return Ok(existing.clone());
                }
                let built = (binding.factory)(self).map_err(|source| ScopeError::Factory {
                    type_name: binding.type_name,
                    source,
                })?;
                self.instances.borrow_mut().insert(id, built.clone());
                Ok(built)
            }
            Lifetime::Transient => (binding.factory)(self).map_err(|source| ScopeError::Factory {
                type_name: binding.type_name,
                source,
            }),
        }
    }

    /// Release every scope-owned instance. Resolution fails afterwards.
    pub fn dispose(&self) -> Result<(), ScopeError> {
        if self.disposed.replace(true) {
            return Err(ScopeError::Disposed);
        }
        let released = {
            let mut instances = self.instances.borrow_mut();
            let count = instances.len();
            instances.clear();
            count
        };
        self.root.live_scopes.fetch_sub(1, Ordering::AcqRel);
        tracing::trace!(scope_id = self.id, released, "service scope disposed");
        Ok(())
    }
}

impl Drop for ServiceScope {
    fn drop(&mut self) {
        if !self.disposed.get() {
            let _ = self.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

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

    struct Counted(usize);

    #[test]
    fn resolves_trait_objects_and_honours_overrides() {
        let root = RootContainer::builder()
            .instance::<dyn Greeter>(Arc::new(English))
            .instance::<dyn Greeter>(Arc::new(French))
            .build()
            .unwrap();
        let scope = root.open_scope().unwrap();
        assert_eq!(scope.resolve::<dyn Greeter>().unwrap().greet(), "bonjour");
    }

    #[test]
    fn scoped_instances_are_shared_within_a_scope_only() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let root = RootContainer::builder()
            .scoped::<Counted, _>(move |_| Ok(Arc::new(Counted(c.fetch_add(1, Ordering::SeqCst)))))
            .build()
            .unwrap();

        let first = root.open_scope().unwrap();
        let a = first.resolve::<Counted>().unwrap();
        let b = first.resolve::<Counted>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let second = root.open_scope().unwrap();
        let c2 = second.resolve::<Counted>().unwrap();
        assert!(!Arc::ptr_eq(&a, &c2));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn singletons_are_shared_across_scopes_and_transients_are_not() {
        let root = RootContainer::builder()
            .singleton::<Counted, _>(|_| Ok(Arc::new(Counted(0))))
            .transient::<String, _>(|_| Ok(Arc::new("fresh".to_string())))
            .build()
            .unwrap();
        let s1 = root.open_scope().unwrap();
        let s2 = root.open_scope().unwrap();
        assert!(Arc::ptr_eq(
            &s1.resolve::<Counted>().unwrap(),
            &s2.resolve::<Counted>().unwrap()
        ));
        assert!(!Arc::ptr_eq(
            &s1.resolve::<String>().unwrap(),
            &s1.resolve::<String>().unwrap()
        ));
    }

    #[test]
    fn factories_can_resolve_their_dependencies() {
        let root = RootContainer::builder()
            .instance::<dyn Greeter>(Arc::new(English))
            .scoped::<String, _>(|scope| {
                let greeter = scope.resolve::<dyn Greeter>()?;
                Ok(Arc::new(format!("{} world", greeter.greet())))
            })
            .build()
            .unwrap();
        let scope = root.open_scope().unwrap();
        assert_eq!(scope.resolve::<String>().unwrap().as_str(), "hello world");
    }

    #[test]
    fn circular_dependencies_are_reported() {
        let root = RootContainer::builder()
            .scoped::<String, _>(|scope| {
                scope.resolve::<Counted>()?;
                Ok(Arc::new(String::new()))
            })
            .scoped::<Counted, _>(|scope| {
                scope.resolve::<String>()?;
                Ok(Arc::new(Counted(0)))
            })
            .build()
            .unwrap();
        let scope = root.open_scope().unwrap();
        let err = scope.resolve::<String>().unwrap_err();
        assert!(matches!(err, ScopeError::Factory { .. }), "got {err:?}");
        let chain = format!("{:#}", anyhow::Error::new(err));
        assert!(chain.contains("circular dependency"), "got {chain}");
    }

    #[test]
    fn panicking_factory_does_not_poison_later_resolution() {
        let tripped = Arc::new(AtomicBool::new(false));
        let t = tripped.clone();
        let root = RootContainer::builder()
            .scoped::<String, _>(move |_| {
                if !t.swap(true, Ordering::SeqCst) {
                    panic!("first build blows up");
                }
                Ok(Arc::new("recovered".to_string()))
            })
            .build()
            .unwrap();
        let scope = root.open_scope().unwrap();

        let first = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            scope.resolve::<String>()
        }));
        assert!(first.is_err());

        let second = scope.resolve::<String>();
        assert_eq!(second.unwrap().as_str(), "recovered");
    }

    #[derive(Debug)]
    struct PerRequest(usize);
    #[derive(Debug)]
    struct Shared(#[allow(dead_code)] Arc<PerRequest>);

    #[test]
    fn singleton_cannot_capture_a_scoped_service() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let root = RootContainer::builder()
            .scoped::<PerRequest, _>(move |_| Ok(Arc::new(PerRequest(c.fetch_add(1, Ordering::SeqCst)))))
            .singleton::<Shared, _>(|scope| Ok(Arc::new(Shared(scope.resolve::<PerRequest>()?))))
            .build()
            .unwrap();
        let scope = root.open_scope().unwrap();

        let source = match scope.resolve::<Shared>() {
            Err(ScopeError::Factory { source, .. }) => source,
            other => panic!("expected a factory error, got {other:?}"),
        };
        assert!(matches!(
            source.downcast_ref::<ScopeError>(),
            Some(ScopeError::CaptiveDependency { .. })
        ));
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        // Nothing was cached, and the scoped binding itself still resolves.
        assert!(scope.resolve::<Shared>().is_err());
        assert_eq!(scope.resolve::<PerRequest>().unwrap().0, 0);
    }

    #[test]
    fn scoped_services_may_depend_on_singletons() {
        let root = RootContainer::builder()
            .singleton::<Counted, _>(|_| Ok(Arc::new(Counted(7))))
            .scoped::<PerRequest, _>(|scope| Ok(Arc::new(PerRequest(scope.resolve::<Counted>()?.0))))
            .build()
            .unwrap();
        let scope = root.open_scope().unwrap();
        assert_eq!(scope.resolve::<PerRequest>().unwrap().0, 7);
    }

    #[test]
    fn missing_required_binding_fails_the_build() {
        let err = RootContainer::builder().require::<dyn Greeter>().build().unwrap_err();
        assert!(matches!(err, ScopeError::MissingBinding(_)));
    }

    #[test]
    fn unregistered_type_is_an_error() {
        let root = RootContainer::builder().build().unwrap();
        let scope = root.open_scope().unwrap();
        assert!(matches!(
            scope.resolve::<Counted>(),
            Err(ScopeError::NotRegistered(_))
        ));
    }

    #[test]
    fn disposed_scope_refuses_resolution_and_second_dispose() {
        let root = RootContainer::builder()
            .instance::<dyn Greeter>(Arc::new(English))
            .build()
            .unwrap();
        let scope = root.open_scope().unwrap();
        assert_eq!(root.live_scopes(), 1);

        scope.dispose().unwrap();
        assert_eq!(root.live_scopes(), 0);
        assert!(matches!(scope.resolve::<dyn Greeter>(), Err(ScopeError::Disposed)));
        assert!(matches!(scope.dispose(), Err(ScopeError::Disposed)));
        assert_eq!(root.live_scopes(), 0);
    }

    #[test]
    fn dropping_an_open_scope_releases_it() {
        let root = RootContainer::builder().build().unwrap();
        {
            let _scope = root.open_scope().unwrap();
            assert_eq!(root.live_scopes(), 1);
        }
        assert_eq!(root.live_scopes(), 0);
    }

    #[test]
    fn closed_container_cannot_open_scopes() {
        let root = RootContainer::builder().build().unwrap();
        root.close();
        assert!(matches!(root.open_scope(), Err(ScopeError::ContainerClosed)));
    }
}
