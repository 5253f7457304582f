//! The Router: per-context-type handler tables, plus an HTTP-only
//! classifier deciding whether a URL belongs to `RESTfulContext` or
//! `WebContext` when both are registered (spec §4.2). TCP, WebSocket and
//! AMQP contexts never need classification — their transport already
//! determines the concrete Context type.

mod pattern;
mod predicate;

pub use pattern::UrlPattern;
pub use predicate::Predicate;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use http::HeaderValue;
use parking_lot::RwLock;

use crate::context::{
    AmqpContext, AnyContext, RESTfulContext, ResponseView, SocketContext, WebContext,
    WebSocketContext,
};
use crate::error::{Error, Result};
use crate::handler::Handler;

/// Which HTTP context type a URL belongs to (spec §3 `ContextType`,
/// restricted to the two context types that share the HTTP URL space).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    Restful,
    Web,
}

/// Handle returned by a `register_*` call, used to `unregister_*` later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Responder<C> = Arc<dyn Fn(C) -> BoxFuture<'static, Result<ResponseView>> + Send + Sync>;

struct Entry<C> {
    seq: u64,
    predicates: Vec<Predicate>,
    responder: Responder<C>,
}

impl<C: AnyContext> Entry<C> {
    fn matches(&self, ctx: &C) -> bool {
        self.predicates.iter().all(|p| p.test(ctx))
    }

    /// Populates `ctx.url_segments` from the first `Url` predicate found
    /// among this entry's predicates (spec §4.2 "URL extraction contract").
    fn apply_captures(&self, ctx: &mut C) {
        let url = ctx.url().to_string();
        for predicate in &self.predicates {
            if let Some(captures) = predicate.url_captures(&url) {
                *ctx.url_segments_mut() = captures;
                return;
            }
        }
    }
}

/// The predicate-evaluating dispatch table, keyed by context type (spec
/// §3/§4.2). Handler tables are `RwLock`-guarded so registration can happen
/// concurrently with in-flight dispatch; the classifier rebuild uses its
/// own lock so routing reads aren't blocked by registration churn.
pub struct Router {
    restful: RwLock<Vec<Entry<RESTfulContext>>>,
    web: RwLock<Vec<Entry<WebContext>>>,
    socket: RwLock<Vec<Entry<SocketContext>>>,
    websocket: RwLock<Vec<Entry<WebSocketContext>>>,
    amqp: RwLock<Vec<Entry<AmqpContext>>>,

    seq: AtomicU64,
    dirty: AtomicBool,
    first_http_kind: RwLock<Option<ContextKind>>,
    /// `(kind, pattern)` pairs in registration order, rebuilt lazily from
    /// `restful`/`web` unless a manual configuration was supplied.
    classifier: RwLock<Vec<(ContextKind, Predicate)>>,
    manual: Option<Vec<(ContextKind, Predicate)>>,
}

impl Router {
    /// Builds a Router. `manual_config` mirrors `Config::router`: a map of
    /// context-type name (`"restful"` / `"web"`) to the URL patterns it
    /// claims. When present, auto-build is suppressed for the life of the
    /// Router (spec §4.2 "the manual classifier is retained verbatim
    /// across subsequent handler changes").
    pub fn new(manual_config: Option<&HashMap<String, Vec<String>>>) -> Result<Self> {
        let manual = manual_config.map(compile_manual_classifier).transpose()?;

        Ok(Self {
            restful: RwLock::new(Vec::new()),
            web: RwLock::new(Vec::new()),
            socket: RwLock::new(Vec::new()),
            websocket: RwLock::new(Vec::new()),
            amqp: RwLock::new(Vec::new()),
            seq: AtomicU64::new(0),
            dirty: AtomicBool::new(true),
            first_http_kind: RwLock::new(None),
            classifier: RwLock::new(Vec::new()),
            manual,
        })
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    fn note_first_http_kind(&self, kind: ContextKind) {
        let mut first = self.first_http_kind.write();
        if first.is_none() {
            *first = Some(kind);
        }
    }

    // -- registration ------------------------------------------------------

    pub fn register_restful<H, Args>(&self, predicates: Vec<Predicate>, handler: H) -> HandlerId
    where
        H: Handler<RESTfulContext, Args>,
        H::Output: serde::Serialize,
    {
        let seq = self.next_seq();
        let responder: Responder<RESTfulContext> = Arc::new(move |ctx| {
            let handler = handler.clone();
            Box::pin(async move {
                let out = handler.call(ctx).await?;
                let mut body = serde_json::to_vec(&out).map_err(|e| {
                    Error::Internal(format!("failed to encode JSON response: {e}"))
                })?;
                if body == b"null" {
                    body = b"{}".to_vec();
                }
                let mut response = ResponseView {
                    body: body.into(),
                    ..ResponseView::default()
                };
                response.headers.insert(
                    http::header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json; charset=utf-8"),
                );
                Ok(response)
            })
        });
        self.restful.write().push(Entry { seq, predicates, responder });
        self.note_first_http_kind(ContextKind::Restful);
        self.mark_dirty();
        HandlerId(seq)
    }

    pub fn register_web<H, Args>(&self, predicates: Vec<Predicate>, handler: H) -> HandlerId
    where
        H: Handler<WebContext, Args>,
        H::Output: Into<String>,
    {
        let seq = self.next_seq();
        let responder: Responder<WebContext> = Arc::new(move |ctx| {
            let handler = handler.clone();
            Box::pin(async move {
                let out = handler.call(ctx).await?;
                let mut response = ResponseView {
                    body: out.into().into_bytes().into(),
                    ..ResponseView::default()
                };
                response.headers.insert(
                    http::header::CONTENT_TYPE,
                    HeaderValue::from_static("text/html; charset=utf-8"),
                );
                Ok(response)
            })
        });
        self.web.write().push(Entry { seq, predicates, responder });
        self.note_first_http_kind(ContextKind::Web);
        self.mark_dirty();
        HandlerId(seq)
    }

    pub fn register_socket<H, Args>(&self, predicates: Vec<Predicate>, handler: H) -> HandlerId
    where
        H: Handler<SocketContext, Args>,
    {
        let seq = self.next_seq();
        let responder: Responder<SocketContext> = advisory_responder(handler);
        self.socket.write().push(Entry { seq, predicates, responder });
        self.mark_dirty();
        HandlerId(seq)
    }

    pub fn register_websocket<H, Args>(&self, predicates: Vec<Predicate>, handler: H) -> HandlerId
    where
        H: Handler<WebSocketContext, Args>,
    {
        let seq = self.next_seq();
        let responder: Responder<WebSocketContext> = advisory_responder(handler);
        self.websocket.write().push(Entry { seq, predicates, responder });
        self.mark_dirty();
        HandlerId(seq)
    }

    pub fn register_amqp<H, Args>(&self, predicates: Vec<Predicate>, handler: H) -> HandlerId
    where
        H: Handler<AmqpContext, Args>,
    {
        let seq = self.next_seq();
        let responder: Responder<AmqpContext> = advisory_responder(handler);
        self.amqp.write().push(Entry { seq, predicates, responder });
        self.mark_dirty();
        HandlerId(seq)
    }

    // -- unregistration ------------------------------------------------------

    pub fn unregister_restful(&self, id: HandlerId) {
        self.restful.write().retain(|e| e.seq != id.0);
        self.mark_dirty();
    }

    pub fn unregister_web(&self, id: HandlerId) {
        self.web.write().retain(|e| e.seq != id.0);
        self.mark_dirty();
    }

    pub fn unregister_socket(&self, id: HandlerId) {
        self.socket.write().retain(|e| e.seq != id.0);
        self.mark_dirty();
    }

    pub fn unregister_websocket(&self, id: HandlerId) {
        self.websocket.write().retain(|e| e.seq != id.0);
        self.mark_dirty();
    }

    pub fn unregister_amqp(&self, id: HandlerId) {
        self.amqp.write().retain(|e| e.seq != id.0);
        self.mark_dirty();
    }

    // -- classification ------------------------------------------------------

    /// Forces a classifier rebuild now, mostly useful for tests (spec
    /// §4.3 `ensure_router_ready`).
    pub fn ensure_ready(&self) {
        if self.dirty.swap(false, Ordering::AcqRel) {
            self.rebuild_classifier();
        }
    }

    fn rebuild_classifier(&self) {
        if let Some(manual) = &self.manual {
            *self.classifier.write() = manual.clone();
            return;
        }

        let restful = self.restful.read();
        let web = self.web.read();
        if restful.is_empty() || web.is_empty() {
            // Exactly one (or zero) context type has handlers: the
            // classifier is a constant function, handled directly in
            // `classify` without consulting this table.
            self.classifier.write().clear();
            return;
        }

        let mut sources: Vec<(u64, ContextKind, Predicate)> = Vec::new();
        for entry in restful.iter() {
            sources.push((entry.seq, ContextKind::Restful, Predicate::all(entry.predicates.clone())));
        }
        for entry in web.iter() {
            sources.push((entry.seq, ContextKind::Web, Predicate::all(entry.predicates.clone())));
        }
        sources.sort_by_key(|(seq, _, _)| *seq);

        *self.classifier.write() =
            sources.into_iter().map(|(_, kind, predicate)| (kind, predicate)).collect();
    }

    /// Classifies a URL into the HTTP context type it belongs to (spec
    /// §4.2 "Auto-building").
    pub fn classify(&self, url: &str) -> ContextKind {
        self.ensure_ready();

        let restful_empty = self.restful.read().is_empty();
        let web_empty = self.web.read().is_empty();

        if self.manual.is_none() {
            match (restful_empty, web_empty) {
                (false, true) => return ContextKind::Restful,
                (true, false) => return ContextKind::Web,
                (true, true) => return ContextKind::Restful,
                (false, false) => {}
            }
        }

        let classifier = self.classifier.read();
        for (kind, predicate) in classifier.iter() {
            if predicate.url_captures(url).is_some() {
                return *kind;
            }
        }
        self.first_http_kind.read().unwrap_or(ContextKind::Restful)
    }

    // -- dispatch ------------------------------------------------------

    pub fn route_restful(&self, ctx: &mut RESTfulContext) -> Result<Responder<RESTfulContext>> {
        route(&self.restful, ctx)
    }

    pub fn route_web(&self, ctx: &mut WebContext) -> Result<Responder<WebContext>> {
        route(&self.web, ctx)
    }

    pub fn route_socket(&self, ctx: &mut SocketContext) -> Result<Responder<SocketContext>> {
        route(&self.socket, ctx)
    }

    pub fn route_websocket(&self, ctx: &mut WebSocketContext) -> Result<Responder<WebSocketContext>> {
        route(&self.websocket, ctx)
    }

    pub fn route_amqp(&self, ctx: &mut AmqpContext) -> Result<Responder<AmqpContext>> {
        route(&self.amqp, ctx)
    }
}

/// Shared match algorithm (spec §4.2 "Match algorithm per dispatch"):
/// first entry, in registration order, whose predicates all evaluate true.
fn route<C: AnyContext>(table: &RwLock<Vec<Entry<C>>>, ctx: &mut C) -> Result<Responder<C>> {
    let table = table.read();
    for entry in table.iter() {
        if entry.matches(ctx) {
            entry.apply_captures(ctx);
            return Ok(entry.responder.clone());
        }
    }
    Err(Error::HandlerNotFound { url: ctx.url().to_string() })
}

/// A responder for context types whose return value is purely advisory:
/// the handler is expected to write explicitly (spec §4.3 step 5, "handler
/// is responsible for explicit writes; return value is advisory").
fn advisory_responder<C, H, Args>(handler: H) -> Responder<C>
where
    C: AnyContext,
    H: Handler<C, Args>,
{
    Arc::new(move |ctx| {
        let handler = handler.clone();
        Box::pin(async move {
            handler.call(ctx).await?;
            Ok(ResponseView::default())
        })
    })
}

fn compile_manual_classifier(
    config: &HashMap<String, Vec<String>>,
) -> Result<Vec<(ContextKind, Predicate)>> {
    let mut built = Vec::new();
    for (name, patterns) in config {
        let kind = match name.as_str() {
            "restful" => ContextKind::Restful,
            "web" => ContextKind::Web,
            other => {
                return Err(Error::Internal(format!(
                    "unknown context type '{other}' in manual router configuration"
                )))
            }
        };
        for pattern in patterns {
            built.push((kind, Predicate::url(pattern)?));
        }
    }
    Ok(built)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestView;
    use crate::di::ServiceCollection;
    use tokio_util::sync::CancellationToken;

    fn restful_ctx(url: &str) -> RESTfulContext {
        RESTfulContext::new(
            "s1".into(),
            url.into(),
            RequestView::default(),
            ServiceCollection::new().build(),
            CancellationToken::new(),
        )
    }

    fn web_ctx(url: &str) -> WebContext {
        WebContext::new(
            "s1".into(),
            url.into(),
            RequestView::default(),
            ServiceCollection::new().build(),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn single_context_type_uses_constant_classifier() {
        let router = Router::new(None).unwrap();
        router.register_restful(vec![Predicate::url("/users/:id").unwrap()], |ctx: RESTfulContext| async move {
            Ok(ctx.url().to_string())
        });
        assert_eq!(router.classify("/anything"), ContextKind::Restful);
    }

    #[tokio::test]
    async fn registration_order_determines_first_match() {
        let router = Router::new(None).unwrap();
        router.register_restful(vec![Predicate::url("/users/:id").unwrap()], |_: RESTfulContext| async move {
            Ok("first")
        });
        router.register_restful(vec![Predicate::url("/users/:id").unwrap()], |_: RESTfulContext| async move {
            Ok("second")
        });

        let mut ctx = restful_ctx("/users/1");
        let responder = router.route_restful(&mut ctx).unwrap();
        let response = responder(ctx).await.unwrap();
        assert_eq!(response.body.as_ref(), br#""first""#);
    }

    #[tokio::test]
    async fn url_segments_are_populated_before_dispatch() {
        let router = Router::new(None).unwrap();
        router.register_restful(
            vec![Predicate::url("/users/:id").unwrap()],
            |ctx: RESTfulContext| async move { Ok(ctx.url_segments().get("id").cloned()) },
        );
        let mut ctx = restful_ctx("/users/42");
        let responder = router.route_restful(&mut ctx).unwrap();
        let response = responder(ctx).await.unwrap();
        assert_eq!(response.body.as_ref(), br#""42""#);
    }

    #[tokio::test]
    async fn unmatched_url_is_handler_not_found() {
        let router = Router::new(None).unwrap();
        router.register_restful(vec![Predicate::url("/users/:id").unwrap()], |_: RESTfulContext| async move {
            Ok(())
        });
        let mut ctx = restful_ctx("/teams/1");
        assert!(matches!(router.route_restful(&mut ctx), Err(Error::HandlerNotFound { .. })));
    }

    #[tokio::test]
    async fn classifier_picks_the_first_matching_pattern_across_types() {
        let router = Router::new(None).unwrap();
        router.register_web(vec![Predicate::url("/pages/:slug").unwrap()], |_: WebContext| async move {
            Ok(String::from("<html></html>"))
        });
        router.register_restful(vec![Predicate::url("/api/:thing").unwrap()], |_: RESTfulContext| async move {
            Ok(())
        });

        assert_eq!(router.classify("/pages/about"), ContextKind::Web);
        assert_eq!(router.classify("/api/users"), ContextKind::Restful);
        // No pattern matches: falls back to whichever was registered first.
        assert_eq!(router.classify("/nope"), ContextKind::Web);
    }

    #[tokio::test]
    async fn manual_classifier_overrides_auto_build() {
        let mut manual = HashMap::new();
        manual.insert("web".to_string(), vec!["/:anything+".to_string()]);
        let router = Router::new(Some(&manual)).unwrap();
        router.register_restful(vec![Predicate::url("/api/:thing").unwrap()], |_: RESTfulContext| async move {
            Ok(())
        });
        router.register_web(vec![Predicate::url("/api/:thing").unwrap()], |_: WebContext| async move {
            Ok(String::new())
        });

        // Manual config claims everything for `web`, even though a restful
        // handler matches the same URL.
        assert_eq!(router.classify("/api/users"), ContextKind::Web);
    }

    #[test]
    fn unregister_removes_the_entry() {
        let router = Router::new(None).unwrap();
        let id = router.register_restful(vec![], |_: RESTfulContext| async move { Ok(()) });
        assert_eq!(router.restful.read().len(), 1);
        router.unregister_restful(id);
        assert_eq!(router.restful.read().len(), 0);
    }
}
