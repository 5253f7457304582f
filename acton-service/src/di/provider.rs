//! The DI container itself: [`ServiceCollection`] for registration and
//! [`Scope`] (aliased as [`ServiceProvider`] at the root) for resolution.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{Error, Result};

use super::descriptor::{unresolved, AnyArc, Disposable, KeyTuple, ServiceDescriptor};
use super::lifetime::Lifetime;

type DescriptorTable = HashMap<TypeId, Vec<Arc<ServiceDescriptor>>>;

struct Inner {
    descriptors: RwLock<DescriptorTable>,
}

/// Builder used at startup (and from `configure_services` callbacks, spec
/// §4.3) to register services before the container is sealed.
#[derive(Default)]
pub struct ServiceCollection {
    descriptors: DescriptorTable,
}

impl ServiceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a ready-made singleton value.
    pub fn add_singleton<T: Any + Send + Sync>(&mut self, value: T) -> &mut Self {
        self.push::<T>(ServiceDescriptor::instance(
            std::any::type_name::<T>(),
            Lifetime::Singleton,
            Arc::new(value),
        ));
        self
    }

    /// Registers a singleton value alongside a cleanup hook invoked when its
    /// owning scope is disposed (spec §4.1 "recognizable close capability").
    pub fn add_singleton_disposable<T>(&mut self, value: T) -> &mut Self
    where
        T: Any + Send + Sync + Disposable,
    {
        let value: AnyArc = Arc::new(value);
        let descriptor = ServiceDescriptor::factory(
            std::any::type_name::<T>(),
            Lifetime::Singleton,
            {
                let value = value.clone();
                Arc::new(move |_scope: &Scope, _keys: &[String]| Ok(value.clone()))
            },
            Some(Arc::new(|instance: &AnyArc| {
                if let Some(t) = instance.downcast_ref::<T>() {
                    t.dispose();
                }
            })),
        );
        self.push::<T>(descriptor);
        self
    }

    /// Registers a singleton constructed lazily by `factory`, keyed by an
    /// ordered tuple of strings (spec §3 "generic-keyed service type").
    /// Pass an empty slice for non-keyed resolution.
    pub fn add_keyed_singleton<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Any + Send + Sync,
        F: Fn(&Scope, &[String]) -> Result<T> + Send + Sync + 'static,
    {
        self.push_factory::<T, F>(Lifetime::Singleton, factory);
        self
    }

    /// Registers a plain (non-keyed) singleton factory.
    pub fn add_singleton_factory<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Any + Send + Sync,
        F: Fn(&Scope) -> Result<T> + Send + Sync + 'static,
    {
        self.add_keyed_singleton::<T, _>(move |scope, _keys| factory(scope))
    }

    /// Registers a scoped factory: one instance per DI scope (per inbound
    /// message, spec §4.3).
    pub fn add_scoped_factory<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Any + Send + Sync,
        F: Fn(&Scope) -> Result<T> + Send + Sync + 'static,
    {
        self.push_factory::<T, _>(Lifetime::Scoped, move |scope, _keys| factory(scope));
        self
    }

    /// Registers a keyed scoped factory.
    pub fn add_keyed_scoped<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Any + Send + Sync,
        F: Fn(&Scope, &[String]) -> Result<T> + Send + Sync + 'static,
    {
        self.push_factory::<T, F>(Lifetime::Scoped, factory);
        self
    }

    /// Registers a transient factory: never cached.
    pub fn add_transient_factory<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Any + Send + Sync,
        F: Fn(&Scope) -> Result<T> + Send + Sync + 'static,
    {
        self.push_factory::<T, _>(Lifetime::Transient, move |scope, _keys| factory(scope));
        self
    }

    fn push_factory<T, F>(&mut self, lifetime: Lifetime, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn(&Scope, &[String]) -> Result<T> + Send + Sync + 'static,
    {
        let descriptor = ServiceDescriptor::factory(
            std::any::type_name::<T>(),
            lifetime,
            Arc::new(move |scope: &Scope, keys: &[String]| {
                factory(scope, keys).map(|v| -> AnyArc { Arc::new(v) })
            }),
            None,
        );
        self.push::<T>(descriptor);
    }

    fn push<T: Any + 'static>(&mut self, descriptor: ServiceDescriptor) {
        self.descriptors
            .entry(TypeId::of::<T>())
            .or_default()
            .push(Arc::new(descriptor));
    }

    /// Seals registration and returns the root [`ServiceProvider`].
    pub fn build(self) -> ServiceProvider {
        let inner = Arc::new(Inner {
            descriptors: RwLock::new(self.descriptors),
        });
        Scope {
            inner,
            scoped_cache: Arc::new(RwLock::new(HashMap::new())),
            resolution_stack: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// The root container. An alias for [`Scope`]: the root is itself a scope
/// whose scoped cache simply never gets disposed until shutdown.
pub type ServiceProvider = Scope;

/// A (possibly root) DI scope: shares the descriptor table and every
/// descriptor's singleton cache with its root, but owns an independent
/// scoped-instance cache (spec §3 `ServiceProvider`).
#[derive(Clone)]
pub struct Scope {
    inner: Arc<Inner>,
    scoped_cache: Arc<RwLock<HashMap<(u64, KeyTuple), AnyArc>>>,
    resolution_stack: Arc<Mutex<Vec<TypeId>>>,
}

impl Scope {
    /// Registers additional services against the live container (spec §4.3
    /// `configure_services`); safe to call after `build()`.
    pub fn register(&self, configure: impl FnOnce(&mut ServiceCollection)) {
        let mut staging = ServiceCollection::new();
        configure(&mut staging);
        let mut table = self.inner.descriptors.write();
        for (type_id, mut descriptors) in staging.descriptors {
            table.entry(type_id).or_default().append(&mut descriptors);
        }
    }

    /// Creates a scoped child container (spec §4.1 `create_scope`): shares
    /// descriptors and singleton caches, starts with an empty scoped cache.
    #[must_use]
    pub fn create_scope(&self) -> Scope {
        Scope {
            inner: self.inner.clone(),
            scoped_cache: Arc::new(RwLock::new(HashMap::new())),
            resolution_stack: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Releases the scoped cache, running any registered dispose hooks
    /// (spec §4.1 `dispose_scope`).
    pub fn dispose_scope(&self) {
        let descriptors = self.inner.descriptors.read();
        let mut cache = self.scoped_cache.write();
        for ((descriptor_id, _), instance) in cache.drain() {
            for list in descriptors.values() {
                if let Some(descriptor) = list.iter().find(|d| d.id == descriptor_id) {
                    descriptor.run_dispose(&instance);
                }
            }
        }
    }

    /// Disposes every cached singleton instance across the container (spec
    /// §5 "Root container: created at startup, disposed at shutdown").
    /// Call once, from the root provider, during process shutdown.
    pub fn shutdown(&self) {
        let table = self.inner.descriptors.read();
        for list in table.values() {
            for descriptor in list {
                descriptor.dispose_all_singletons();
            }
        }
    }

    /// Resolves a single, non-keyed instance of `T` (spec §4.1 `resolve`).
    pub fn resolve<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        self.resolve_keyed::<T>(&[])
    }

    /// Resolves `T` keyed by an ordered tuple (spec §3 `Base[K1, K2, ...]`).
    pub fn resolve_keyed<T: Any + Send + Sync>(&self, keys: &[&str]) -> Result<Arc<T>> {
        let keys: KeyTuple = keys.iter().map(|s| s.to_string()).collect();
        let type_id = TypeId::of::<T>();

        self.enter_resolution::<T>(type_id)?;
        let result = self.resolve_first(type_id, &keys);
        self.exit_resolution(type_id);

        let any = result?.ok_or_else(unresolved::<T>)?;
        any.downcast::<T>()
            .map_err(|_| unresolved::<T>())
    }

    /// Resolves the full ordered list of instances registered for `T` (spec
    /// §4.1 resolve rule 1, "list of T").
    pub fn resolve_all<T: Any + Send + Sync>(&self) -> Result<Vec<Arc<T>>> {
        let type_id = TypeId::of::<T>();
        let descriptors = {
            let table = self.inner.descriptors.read();
            table.get(&type_id).cloned().unwrap_or_default()
        };

        self.enter_resolution::<T>(type_id)?;
        let mut out = Vec::with_capacity(descriptors.len());
        let mut first_err = None;
        for descriptor in &descriptors {
            match self.resolve_descriptor(descriptor, &[]) {
                Ok(any) => match any.downcast::<T>() {
                    Ok(t) => out.push(t),
                    Err(_) => {
                        first_err.get_or_insert_with(unresolved::<T>);
                    }
                },
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        self.exit_resolution(type_id);

        if let Some(e) = first_err {
            if out.is_empty() {
                return Err(e);
            }
        }
        Ok(out)
    }

    fn resolve_first(&self, type_id: TypeId, keys: &KeyTuple) -> Result<Option<AnyArc>> {
        let descriptor = {
            let table = self.inner.descriptors.read();
            table.get(&type_id).and_then(|list| list.first().cloned())
        };
        match descriptor {
            Some(descriptor) => self.resolve_descriptor(&descriptor, keys).map(Some),
            None => Ok(None),
        }
    }

    fn resolve_descriptor(&self, descriptor: &ServiceDescriptor, keys: &KeyTuple) -> Result<AnyArc> {
        match descriptor.lifetime {
            Lifetime::Singleton => descriptor.resolve_singleton(self, keys),
            Lifetime::Transient => descriptor.resolve_transient(self, keys),
            Lifetime::Scoped => {
                let cache_key = (descriptor.id, keys.clone());
                if let Some(hit) = self.scoped_cache.read().get(&cache_key) {
                    return Ok(hit.clone());
                }
                let instance = descriptor.resolve_transient(self, keys)?;
                let mut cache = self.scoped_cache.write();
                let entry = cache
                    .entry(cache_key)
                    .or_insert_with(|| instance.clone());
                Ok(entry.clone())
            }
        }
    }

    fn enter_resolution<T>(&self, type_id: TypeId) -> Result<()> {
        let mut stack = self.resolution_stack.lock();
        if stack.contains(&type_id) {
            return Err(Error::CircularDependency {
                type_name: std::any::type_name::<T>(),
            });
        }
        stack.push(type_id);
        Ok(())
    }

    fn exit_resolution(&self, type_id: TypeId) {
        let mut stack = self.resolution_stack.lock();
        if let Some(pos) = stack.iter().rposition(|t| *t == type_id) {
            stack.remove(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq, Eq)]
    struct Greeter(String);

    #[test]
    fn singleton_resolves_to_the_same_instance() {
        let mut services = ServiceCollection::new();
        services.add_singleton(Greeter("hi".into()));
        let root = services.build();

        let a = root.resolve::<Greeter>().unwrap();
        let b = root.resolve::<Greeter>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn scoped_instances_differ_across_scopes_but_match_within_one() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut services = ServiceCollection::new();
        {
            let counter = counter.clone();
            services.add_scoped_factory::<Greeter, _>(move |_scope| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Ok(Greeter(format!("scope-{n}")))
            });
        }
        let root = services.build();

        let scope_a = root.create_scope();
        let a1 = scope_a.resolve::<Greeter>().unwrap();
        let a2 = scope_a.resolve::<Greeter>().unwrap();
        assert!(Arc::ptr_eq(&a1, &a2));

        let scope_b = root.create_scope();
        let b1 = scope_b.resolve::<Greeter>().unwrap();
        assert_ne!(a1.0, b1.0);
    }

    #[test]
    fn transient_always_constructs_a_fresh_instance() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut services = ServiceCollection::new();
        {
            let counter = counter.clone();
            services.add_transient_factory::<Greeter, _>(move |_scope| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Ok(Greeter(format!("t-{n}")))
            });
        }
        let root = services.build();
        let a = root.resolve::<Greeter>().unwrap();
        let b = root.resolve::<Greeter>().unwrap();
        assert_ne!(a.0, b.0);
    }

    #[test]
    fn keyed_singletons_are_isolated_per_key() {
        let mut services = ServiceCollection::new();
        services.add_keyed_singleton::<Greeter, _>(|_scope, keys| {
            Ok(Greeter(keys.first().cloned().unwrap_or_default()))
        });
        let root = services.build();

        let primary = root.resolve_keyed::<Greeter>(&["primary"]).unwrap();
        let replica = root.resolve_keyed::<Greeter>(&["replica"]).unwrap();
        assert_ne!(primary.0, replica.0);

        let primary_again = root.resolve_keyed::<Greeter>(&["primary"]).unwrap();
        assert!(Arc::ptr_eq(&primary, &primary_again));
    }

    #[test]
    fn resolve_all_returns_every_registration_in_order() {
        let mut services = ServiceCollection::new();
        services.add_singleton(Greeter("first".into()));
        services.register(|c| {
            c.add_singleton(Greeter("second".into()));
        });
        let root = services.build();
        let all = root.resolve_all::<Greeter>().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0, "first");
        assert_eq!(all[1].0, "second");
    }

    #[test]
    fn unresolved_dependency_is_reported_by_type_name() {
        let services = ServiceCollection::new();
        let root = services.build();
        let err = root.resolve::<Greeter>().unwrap_err();
        assert!(matches!(err, Error::DependencyUnresolved { .. }));
    }

    #[test]
    fn shutdown_disposes_singleton_resources() {
        struct Resource(Arc<AtomicUsize>);
        impl Disposable for Resource {
            fn dispose(&self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let closed = Arc::new(AtomicUsize::new(0));
        let mut services = ServiceCollection::new();
        services.add_singleton_disposable(Resource(closed.clone()));
        let root = services.build();
        let _ = root.resolve::<Resource>().unwrap();
        root.shutdown();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }
}
