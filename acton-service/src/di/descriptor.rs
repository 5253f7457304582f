//! Service descriptors: the registration record the container resolves
//! against (spec §3 `ServiceDescriptor`).

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{Error, Result};

use super::lifetime::Lifetime;
use super::provider::Scope;

/// A type-erased, `Send + Sync` instance handed back from resolution.
pub type AnyArc = Arc<dyn Any + Send + Sync>;

/// Ordered key tuple identifying a generic-keyed instantiation (`Base[K]`).
/// Empty for non-keyed resolution.
pub type KeyTuple = Vec<String>;

/// A resource whose scope-disposal should run a cleanup step (spec §4.1
/// `dispose_scope`: "any resource with a recognizable close capability is
/// closed").
pub trait Disposable: Send + Sync {
    /// Releases any held resource. Called at most once, when the owning
    /// scope is disposed.
    fn dispose(&self);
}

type Factory = dyn Fn(&Scope, &[String]) -> Result<AnyArc> + Send + Sync;
type DisposeFn = dyn Fn(&AnyArc) + Send + Sync;

/// How a descriptor produces its instance.
pub(crate) enum Provider {
    /// A pre-built value, returned as-is regardless of lifetime or key.
    Instance(AnyArc),
    /// Constructs (or re-constructs, for Transient) an instance given the
    /// resolving scope and the key tuple supplied at resolution.
    Factory(Arc<Factory>),
}

static NEXT_DESCRIPTOR_ID: AtomicU64 = AtomicU64::new(1);

/// One registration: `(service_type, lifetime, provider)` (spec §3).
/// Multiple descriptors may share a `type_name` — resolution of `Vec<Arc<T>>`
/// returns one instance per descriptor, in registration order.
pub(crate) struct ServiceDescriptor {
    pub id: u64,
    pub type_name: &'static str,
    pub lifetime: Lifetime,
    provider: Provider,
    dispose: Option<Arc<DisposeFn>>,
    singleton_cache: RwLock<HashMap<KeyTuple, AnyArc>>,
}

impl ServiceDescriptor {
    pub fn instance(type_name: &'static str, lifetime: Lifetime, value: AnyArc) -> Self {
        Self {
            id: NEXT_DESCRIPTOR_ID.fetch_add(1, Ordering::Relaxed),
            type_name,
            lifetime,
            provider: Provider::Instance(value),
            dispose: None,
            singleton_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn factory(
        type_name: &'static str,
        lifetime: Lifetime,
        factory: Arc<Factory>,
        dispose: Option<Arc<DisposeFn>>,
    ) -> Self {
        Self {
            id: NEXT_DESCRIPTOR_ID.fetch_add(1, Ordering::Relaxed),
            type_name,
            lifetime,
            provider: Provider::Factory(factory),
            dispose,
            singleton_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Runs `_construct` (spec §4.1) for this descriptor: Instance providers
    /// return the stored value verbatim, Factory providers are invoked with
    /// the resolving scope and key tuple.
    fn construct(&self, scope: &Scope, keys: &[String]) -> Result<AnyArc> {
        match &self.provider {
            Provider::Instance(v) => Ok(v.clone()),
            Provider::Factory(f) => f(scope, keys),
        }
    }

    /// Resolves this descriptor under Singleton caching: the descriptor's
    /// own cache, keyed by the key tuple, is consulted and populated once.
    pub fn resolve_singleton(&self, scope: &Scope, keys: &[String]) -> Result<AnyArc> {
        if let Some(hit) = self.singleton_cache.read().get(keys) {
            return Ok(hit.clone());
        }
        let instance = self.construct(scope, keys)?;
        let mut cache = self.singleton_cache.write();
        // Another resolver may have raced us; keep whichever landed first.
        let entry = cache.entry(keys.to_vec()).or_insert_with(|| instance.clone());
        Ok(entry.clone())
    }

    pub fn resolve_transient(&self, scope: &Scope, keys: &[String]) -> Result<AnyArc> {
        self.construct(scope, keys)
    }

    pub fn run_dispose(&self, instance: &AnyArc) {
        if let Some(dispose) = &self.dispose {
            dispose(instance);
        }
    }

    /// Disposes and clears every cached singleton instance. Called once, at
    /// root container shutdown.
    pub fn dispose_all_singletons(&self) {
        let mut cache = self.singleton_cache.write();
        for instance in cache.values() {
            self.run_dispose(instance);
        }
        cache.clear();
    }
}

pub(crate) fn unresolved<T>() -> Error {
    Error::DependencyUnresolved {
        type_name: std::any::type_name::<T>(),
    }
}
