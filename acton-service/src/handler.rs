//! The `Handler` trait: a constructor/method-injection-style callable
//! (spec §3 `HandlerEntry`, §4.1 `invoke`).
//!
//! The first parameter is always the concrete Context, taken by value; every
//! parameter after it is resolved from the context's scoped
//! [`Scope`](crate::di::Scope) via [`FromScope`] — the same pattern axum
//! uses for extractors, generalized here to DI-resolved dependencies instead
//! of request parts. Context is owned rather than borrowed so the blanket
//! impl below can give a single, lifetime-independent `Future` type for any
//! async fn/closure (the same reason axum's `Handler` consumes `Request` by
//! value instead of threading a borrow through the returned future).

use std::future::Future;

use futures::future::BoxFuture;

use crate::context::AnyContext;
use crate::di::FromScope;
use crate::error::Result;

/// A callable handler for context type `C`, taking additional `Args`
/// extracted from the scope. `Args` is an uninhabited marker tuple used
/// only to select the right blanket impl — callers never name it.
pub trait Handler<C, Args>: Clone + Send + Sync + 'static
where
    C: AnyContext,
{
    type Output: Send + 'static;

    fn call(&self, ctx: C) -> BoxFuture<'static, Result<Self::Output>>;
}

macro_rules! impl_handler {
    ($($arg:ident),*) => {
        impl<C, F, Fut, Out, $($arg,)*> Handler<C, ($($arg,)*)> for F
        where
            C: AnyContext,
            F: Fn(C, $($arg,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Result<Out>> + Send + 'static,
            Out: Send + 'static,
            $($arg: FromScope + Send + 'static,)*
        {
            type Output = Out;

            #[allow(non_snake_case, unused_variables)]
            fn call(&self, ctx: C) -> BoxFuture<'static, Result<Out>> {
                let f = self.clone();
                Box::pin(async move {
                    $(
                        let $arg = <$arg as FromScope>::from_scope(ctx.services())?;
                    )*
                    f(ctx, $($arg,)*).await
                })
            }
        }
    };
}

impl_handler!();
impl_handler!(A1);
impl_handler!(A1, A2);
impl_handler!(A1, A2, A3);
impl_handler!(A1, A2, A3, A4);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::{Scope, ServiceCollection};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    struct Greeting(String);

    fn scope() -> Scope {
        let mut services = ServiceCollection::new();
        services.add_singleton(Greeting("hello".into()));
        services.build()
    }

    #[tokio::test]
    async fn zero_arg_handler_receives_only_the_context() {
        async fn handler(ctx: crate::context::RESTfulContext) -> Result<&'static str> {
            let _ = ctx.url();
            Ok("ok")
        }

        let ctx = crate::context::RESTfulContext::new(
            "s1".into(),
            "/".into(),
            crate::context::RequestView::default(),
            scope(),
            CancellationToken::new(),
        );
        let out = Handler::call(&handler, ctx).await.unwrap();
        assert_eq!(out, "ok");
    }

    #[tokio::test]
    async fn one_arg_handler_resolves_from_scope() {
        async fn handler(
            ctx: crate::context::RESTfulContext,
            greeting: Arc<Greeting>,
        ) -> Result<String> {
            let _ = ctx.url();
            Ok(greeting.0.clone())
        }

        let ctx = crate::context::RESTfulContext::new(
            "s1".into(),
            "/".into(),
            crate::context::RequestView::default(),
            scope(),
            CancellationToken::new(),
        );
        let out = Handler::call(&handler, ctx).await.unwrap();
        assert_eq!(out, "hello");
    }
}
