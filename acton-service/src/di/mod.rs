//! The dependency injection container (spec §3, §4.1): registration,
//! lifetime-cached resolution, and constructor injection by declared type.

mod descriptor;
mod extract;
mod lifetime;
mod provider;

pub use descriptor::Disposable;
pub use extract::{FromScope, KeyTag, Keyed};
pub use lifetime::Lifetime;
pub use provider::{Scope, ServiceCollection, ServiceProvider};
