//! The Dispatcher: the single entry point every Listener hands a message to
//! (spec §4.3 "Dispatch pipeline"). Builds the right Context for a message's
//! transport, classifies and routes it, invokes the matched handler inside a
//! disposable scope, and translates the result into the transport's own
//! outcome shape.

use std::collections::HashMap;
use std::sync::Arc;

use acton_reactive::prelude::{ActonApp, AgentHandle, AgentRuntime};
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::agents::{BackgroundWorker, HealthMonitorAgent};
use crate::context::{
    AmqpContext, AmqpOutcome, RESTfulContext, RequestView, ResponseView, SocketContext, WebContext,
    WebSocketContext, WebSocketFrame,
};
use crate::di::{ServiceCollection, ServiceProvider};
use crate::error::{Error, Result};
use crate::router::{ContextKind, Router};
use crate::websocket::{GroupConfig, WebSocketSession, WebSocketSessionManager};

/// A message handed to the Dispatcher by a Listener, already stripped of
/// transport-specific framing (spec §4.3 "a uniform envelope per message").
pub enum Message {
    Http {
        session_id: String,
        url: String,
        request: RequestView,
        as_web: bool,
    },
    Socket {
        session_id: String,
        frame: Bytes,
        reply: UnboundedSender<Bytes>,
    },
    WebSocket {
        frame: WebSocketFrame,
        session: WebSocketSession,
    },
    Amqp {
        session_id: String,
        body: Bytes,
        routing_key: String,
        exchange: String,
        delivery_tag: u64,
        redelivered: bool,
    },
}

/// What the Listener should do once the Dispatcher returns (spec §4.3 step
/// 5). Socket/WebSocket carry no payload: those handlers write explicitly
/// through the context they were given, so there is nothing left to flush.
pub enum Outcome {
    Http(ResponseView),
    Socket,
    WebSocket,
    Amqp(AmqpOutcome),
}

/// Marker implemented by anything the Dispatcher can hand messages off to.
/// Listeners own their own accept loop; the Dispatcher only needs to be able
/// to start and stop one.
#[async_trait::async_trait]
pub trait Listener: Send + Sync {
    async fn initialize(&self, dispatcher: Arc<Dispatcher>, shutdown: CancellationToken) -> Result<()>;
    async fn shutdown(&self);
}

/// The framework core: DI root, Router, and the ambient agents every
/// transport's Context construction depends on (spec §2 "Dispatcher").
pub struct Dispatcher {
    root: ServiceProvider,
    router: Router,
    session_manager: Arc<AgentHandle>,
    background_worker: BackgroundWorker,
    agent_runtime: tokio::sync::Mutex<AgentRuntime>,
    listeners: RwLock<Vec<Arc<dyn Listener>>>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    /// Boots the ambient agents (WebSocket session manager, background
    /// worker) and builds an empty Router and DI root. `router_config`
    /// mirrors `Config::router`; pass `None` to auto-build the classifier
    /// from registration order instead.
    pub async fn new(
        router_config: Option<&HashMap<String, Vec<String>>>,
        ws_config: GroupConfig,
    ) -> Result<Self> {
        let mut runtime = ActonApp::launch();

        let session_manager = WebSocketSessionManager::spawn(&mut runtime, ws_config)
            .await
            .map_err(|e| Error::Internal(format!("failed to start websocket session manager: {e}")))?;

        let background_worker = BackgroundWorker::spawn(&mut runtime)
            .await
            .map_err(|e| Error::Internal(format!("failed to start background worker: {e}")))?;

        let health_monitor = HealthMonitorAgent::spawn(&mut runtime)
            .await
            .map_err(|e| Error::Internal(format!("failed to start health monitor: {e}")))?;

        let root = ServiceCollection::new().build();
        root.register(|services| {
            services.add_singleton::<AgentHandle>(health_monitor);
        });

        Ok(Self {
            root,
            router: Router::new(router_config)?,
            session_manager: Arc::new(session_manager),
            background_worker,
            agent_runtime: tokio::sync::Mutex::new(runtime),
            listeners: RwLock::new(Vec::new()),
            shutdown: CancellationToken::new(),
        })
    }

    /// Registers dependencies against the root container. Called before any
    /// traffic flows; scopes created afterward see every registration made
    /// here (spec §4.1).
    pub fn configure_services(&self, configure: impl FnOnce(&mut ServiceCollection)) {
        self.root.register(configure);
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Forces the HTTP classifier to rebuild now rather than on first
    /// request. Registration after this call still takes effect; it just
    /// triggers another rebuild (spec §4.2).
    pub fn ensure_router_ready(&self) {
        self.router.ensure_ready();
    }

    /// Hands the background worker a task to run outside the request path
    /// (spec §4.5 "fire-and-forget work tied to the service's own
    /// lifetime, not a single message's").
    pub async fn add_background_task<F, Fut>(&self, task_id: impl Into<String>, work: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.background_worker.submit(task_id, work).await;
    }

    pub fn background_worker(&self) -> &BackgroundWorker {
        &self.background_worker
    }

    pub fn session_manager(&self) -> &Arc<AgentHandle> {
        &self.session_manager
    }

    /// Grants access to the underlying agent runtime so connectors can spawn
    /// further pool agents (Mongo/AMQP) onto it after construction.
    pub fn agent_runtime(&self) -> &tokio::sync::Mutex<AgentRuntime> {
        &self.agent_runtime
    }

    /// Registers a Listener, idempotently: re-adding the same `Arc` is a
    /// no-op rather than a duplicate start.
    pub fn add_listener(&self, listener: Arc<dyn Listener>) {
        let mut listeners = self.listeners.write();
        if listeners.iter().any(|existing| Arc::ptr_eq(existing, &listener)) {
            return;
        }
        listeners.push(listener);
    }

    /// Starts every registered Listener and blocks until a shutdown signal
    /// arrives, then tells each Listener to stop (spec §4.3, mirroring the
    /// HTTP listener's own graceful-shutdown handling).
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let listeners: Vec<Arc<dyn Listener>> = self.listeners.read().clone();
        for listener in &listeners {
            listener.initialize(self.clone(), self.shutdown.clone()).await?;
        }

        shutdown_signal().await;
        tracing::info!("shutdown signal received, stopping listeners");
        self.shutdown.cancel();

        for listener in &listeners {
            listener.shutdown().await;
        }
        Ok(())
    }

    /// The central pipeline (spec §4.3): create scope, build Context,
    /// classify + route, invoke, dispose scope, translate the result.
    pub async fn on_message(&self, message: Message) -> Outcome {
        match message {
            Message::Http { session_id, url, request, as_web } => {
                Outcome::Http(self.on_http(session_id, url, request, as_web).await)
            }
            Message::Socket { session_id, frame, reply } => {
                self.on_socket(session_id, frame, reply).await;
                Outcome::Socket
            }
            Message::WebSocket { frame, session } => {
                self.on_websocket(frame, session).await;
                Outcome::WebSocket
            }
            Message::Amqp { session_id, body, routing_key, exchange, delivery_tag, redelivered } => {
                Outcome::Amqp(
                    self.on_amqp(session_id, body, routing_key, exchange, delivery_tag, redelivered)
                        .await,
                )
            }
        }
    }

    async fn on_http(&self, session_id: String, url: String, request: RequestView, as_web_hint: bool) -> ResponseView {
        let scope = self.root.create_scope();
        let kind = if as_web_hint { ContextKind::Web } else { self.router.classify(&url) };

        let result = match kind {
            ContextKind::Restful => {
                let mut ctx =
                    RESTfulContext::new(session_id, url, request, scope.clone(), self.shutdown.child_token());
                match self.router.route_restful(&mut ctx) {
                    Ok(responder) => responder(ctx).await,
                    Err(e) => Err(e),
                }
            }
            ContextKind::Web => {
                let mut ctx = WebContext::new(session_id, url, request, scope.clone(), self.shutdown.child_token());
                match self.router.route_web(&mut ctx) {
                    Ok(responder) => responder(ctx).await,
                    Err(e) => Err(e),
                }
            }
        };

        scope.dispose_scope();

        match result {
            Ok(response) => response,
            Err(Error::ShortCircuit) => ResponseView::default(),
            Err(e) => e.to_response_view(matches!(kind, ContextKind::Web)),
        }
    }

    async fn on_socket(&self, session_id: String, frame: Bytes, reply: UnboundedSender<Bytes>) {
        let scope = self.root.create_scope();
        let mut ctx = SocketContext::new(session_id, frame, reply, scope.clone(), self.shutdown.child_token());

        let result = match self.router.route_socket(&mut ctx) {
            Ok(responder) => responder(ctx).await,
            Err(e) => Err(e),
        };
        scope.dispose_scope();

        if let Err(e) = result {
            log_advisory_error(&e);
        }
    }

    async fn on_websocket(&self, frame: WebSocketFrame, session: WebSocketSession) {
        let scope = self.root.create_scope();
        let mut ctx = WebSocketContext::new(
            frame,
            session,
            self.session_manager.clone(),
            scope.clone(),
            self.shutdown.child_token(),
        );

        let result = match self.router.route_websocket(&mut ctx) {
            Ok(responder) => responder(ctx).await,
            Err(e) => Err(e),
        };
        scope.dispose_scope();

        if let Err(e) = result {
            log_advisory_error(&e);
        }
    }

    async fn on_amqp(
        &self,
        session_id: String,
        body: Bytes,
        routing_key: String,
        exchange: String,
        delivery_tag: u64,
        redelivered: bool,
    ) -> AmqpOutcome {
        let scope = self.root.create_scope();
        let ctx = AmqpContext::new(
            session_id,
            body,
            routing_key,
            exchange,
            delivery_tag,
            redelivered,
            scope.clone(),
            self.shutdown.child_token(),
        );
        // Taken before routing: `responder` consumes `ctx` by value, so this
        // is the only way to read an outcome the handler set explicitly
        // (spec §4.4.4).
        let outcome_handle = ctx.outcome_handle();

        let mut ctx = ctx;
        let result = match self.router.route_amqp(&mut ctx) {
            Ok(responder) => responder(ctx).await,
            Err(e) => Err(e),
        };
        scope.dispose_scope();

        let explicit = outcome_handle.lock().take();
        match (explicit, result) {
            (Some(outcome), _) => outcome,
            (None, Ok(_)) => AmqpOutcome::Ack,
            (None, Err(e)) => {
                log_advisory_error(&e);
                AmqpOutcome::Nack { requeue: false }
            }
        }
    }
}

fn log_advisory_error(err: &Error) {
    match err {
        Error::HandlerNotFound { url } => tracing::warn!(url, "no handler matched"),
        other => tracing::error!(error = %other, "handler failed"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Predicate;

    async fn dispatcher() -> Dispatcher {
        Dispatcher::new(None, GroupConfig::default()).await.unwrap()
    }

    #[tokio::test]
    async fn unmatched_http_url_returns_404() {
        let d = dispatcher().await;
        d.router
            .register_restful(vec![Predicate::url("/users/:id").unwrap()], |_: RESTfulContext| async move {
                Ok(())
            });

        let outcome = d
            .on_message(Message::Http {
                session_id: "s1".into(),
                url: "/nope".into(),
                request: RequestView::default(),
                as_web: false,
            })
            .await;

        match outcome {
            Outcome::Http(response) => assert_eq!(response.status, http::StatusCode::NOT_FOUND),
            _ => panic!("expected an Http outcome"),
        }
    }

    #[tokio::test]
    async fn matched_restful_handler_is_json_encoded() {
        let d = dispatcher().await;
        d.router.register_restful(vec![Predicate::url("/ping").unwrap()], |_: RESTfulContext| async move {
            Ok("pong")
        });

        let outcome = d
            .on_message(Message::Http {
                session_id: "s1".into(),
                url: "/ping".into(),
                request: RequestView::default(),
                as_web: false,
            })
            .await;

        match outcome {
            Outcome::Http(response) => {
                assert_eq!(response.status, http::StatusCode::OK);
                assert_eq!(response.body.as_ref(), br#""pong""#);
            }
            _ => panic!("expected an Http outcome"),
        }
    }

    #[tokio::test]
    async fn amqp_handler_error_defaults_to_nack_without_requeue() {
        let d = dispatcher().await;
        d.router.register_amqp(vec![], |_: AmqpContext| async move {
            Err::<(), _>(Error::Internal("boom".into()))
        });

        let outcome = d
            .on_message(Message::Amqp {
                session_id: "d1".into(),
                body: Bytes::from_static(b"{}"),
                routing_key: "rk".into(),
                exchange: "ex".into(),
                delivery_tag: 1,
                redelivered: false,
            })
            .await;

        match outcome {
            Outcome::Amqp(AmqpOutcome::Nack { requeue }) => assert!(!requeue),
            _ => panic!("expected a Nack outcome"),
        }
    }

    #[tokio::test]
    async fn amqp_handler_explicit_requeue_overrides_default_ack() {
        let d = dispatcher().await;
        d.router.register_amqp(vec![], |ctx: AmqpContext| async move {
            ctx.nack(true);
            Ok(())
        });

        let outcome = d
            .on_message(Message::Amqp {
                session_id: "d1".into(),
                body: Bytes::from_static(b"{}"),
                routing_key: "rk".into(),
                exchange: "ex".into(),
                delivery_tag: 1,
                redelivered: false,
            })
            .await;

        match outcome {
            Outcome::Amqp(AmqpOutcome::Nack { requeue }) => assert!(requeue),
            _ => panic!("expected a Nack outcome"),
        }
    }
}
