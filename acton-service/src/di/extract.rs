//! Compile-time constructor injection.
//!
//! Rust has no runtime reflection, so "inject by declared parameter type"
//! (spec §4.1 `_construct`) is realized the way axum realizes extractors:
//! a [`FromScope`] trait implemented for every injectable shape, and a
//! blanket `Handler` impl (see `crate::handler`) that calls it once per
//! declared parameter.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::Result;

use super::provider::Scope;

/// Anything a handler parameter can ask the DI container for.
pub trait FromScope: Sized {
    /// Resolves `Self` from the given scope.
    fn from_scope(scope: &Scope) -> Result<Self>;
}

impl<T: Any + Send + Sync> FromScope for Arc<T> {
    fn from_scope(scope: &Scope) -> Result<Self> {
        scope.resolve::<T>()
    }
}

/// The "list of T" injection rule (spec §4.1 resolve rule 1): every
/// descriptor registered for `T`, in registration order.
impl<T: Any + Send + Sync> FromScope for Vec<Arc<T>> {
    fn from_scope(scope: &Scope) -> Result<Self> {
        scope.resolve_all::<T>()
    }
}

impl FromScope for Scope {
    fn from_scope(scope: &Scope) -> Result<Self> {
        Ok(scope.clone())
    }
}

/// Names a single string key at the type level, so it can participate in
/// [`Keyed`]'s type-driven resolution. Implement on a unit struct per tag,
/// e.g. `struct Primary; impl KeyTag for Primary { const KEY: &'static str = "primary"; }`.
pub trait KeyTag: Send + Sync + 'static {
    /// The key this tag resolves, e.g. the `<tag>` in `database.<tag>`.
    const KEY: &'static str;
}

/// Generic-keyed resolution (spec §3 `Base[Key]`): resolves `T` under the
/// key named by `Tag`, e.g. `Keyed<MongoConnector, Primary>` for the
/// connector registered under `database.primary`.
pub struct Keyed<T, Tag: KeyTag>(pub Arc<T>, PhantomData<Tag>);

impl<T, Tag: KeyTag> std::ops::Deref for Keyed<T, Tag> {
    type Target = Arc<T>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: Any + Send + Sync, Tag: KeyTag> FromScope for Keyed<T, Tag> {
    fn from_scope(scope: &Scope) -> Result<Self> {
        scope
            .resolve_keyed::<T>(&[Tag::KEY])
            .map(|v| Keyed(v, PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::ServiceCollection;

    struct Tagged(String);

    struct Primary;
    impl KeyTag for Primary {
        const KEY: &'static str = "primary";
    }

    #[test]
    fn keyed_resolves_its_own_tag() {
        let mut services = ServiceCollection::new();
        services.add_keyed_singleton::<Tagged, _>(|_scope, keys| {
            Ok(Tagged(keys.first().cloned().unwrap_or_default()))
        });
        let root = services.build();

        let primary = Keyed::<Tagged, Primary>::from_scope(&root).unwrap();
        assert_eq!(primary.0, "primary");
    }
}
