//! HTTP(S) Listener (spec §4.4.1): `axum::serve` wrapped in the same
//! `tower-http` layer stack the teacher's server assembled, generalized to
//! hand every request that isn't a WebSocket upgrade to
//! [`Dispatcher::on_message`]. A path claimed by a caller-supplied static
//! file service (spec §2 Non-goals: "static-file serving") bypasses the
//! Dispatcher entirely.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    response::{IntoResponse, Response},
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener as TokioTcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

use crate::config::{Config, ServerConfig};
use crate::context::{RequestView, ResponseView, WebSocketFrame};
use crate::dispatcher::{Dispatcher, Listener, Message, Outcome};
use crate::error::{Error, Result};
use crate::ids::{new_session_id, RequestId};
use crate::middleware::{request_id_layer, request_id_propagation_layer, sensitive_headers_layer};
use crate::tls::{load_server_config, TlsListener};
use crate::websocket::{
    RegisterSession, SessionDisconnected, WebSocket, WebSocketSession, WebSocketUpgrade,
};

const MAX_BODY_BYTES: usize = 1024 * 1024 * 1024;

/// HTTP/HTTPS Listener, axum-backed. Construct with [`HttpListener::new`]
/// and optionally register a static-file bypass with
/// [`HttpListener::with_static_bypass`] before handing it to
/// `Dispatcher::add_listener`.
pub struct HttpListener {
    config: ServerConfig,
    service_name: String,
    body_limit_mb: usize,
    cors_mode: String,
    static_bypass: Option<Router>,
    shutdown: CancellationToken,
}

impl HttpListener {
    #[must_use]
    pub fn new(config: &Config) -> Option<Self> {
        let server = config.server.clone()?;
        Some(Self {
            config: server,
            service_name: config.service.name.clone(),
            body_limit_mb: config.middleware.body_limit_mb,
            cors_mode: config.middleware.cors_mode.clone(),
            static_bypass: None,
            shutdown: CancellationToken::new(),
        })
    }

    /// Registers a `tower-http`-style router (e.g. `ServeDir`) that claims
    /// requests ahead of the Dispatcher fallback. The embedder owns this
    /// router's routes entirely; the core never inspects them.
    #[must_use]
    pub fn with_static_bypass(mut self, router: Router) -> Self {
        self.static_bypass = Some(router);
        self
    }

    fn build_cors_layer(&self) -> CorsLayer {
        match self.cors_mode.as_str() {
            "permissive" => CorsLayer::permissive(),
            "restrictive" | "disabled" => CorsLayer::new(),
            other => {
                tracing::warn!(mode = other, "unknown cors_mode, defaulting to permissive");
                CorsLayer::permissive()
            }
        }
    }

    fn build_router(&self, dispatcher: Arc<Dispatcher>) -> Router {
        let body_limit = self.body_limit_mb * 1024 * 1024;

        let app = Router::new()
            .fallback(fallback)
            .layer(self.build_cors_layer())
            .layer(CompressionLayer::new())
            .layer(TimeoutLayer::with_status_code(
                http::StatusCode::REQUEST_TIMEOUT,
                self.config.timeout(),
            ))
            .layer(RequestBodyLimitLayer::new(body_limit))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().include_headers(true))
                    .on_response(DefaultOnResponse::new().include_headers(true)),
            )
            .layer(sensitive_headers_layer())
            .layer(request_id_propagation_layer())
            .layer(request_id_layer())
            .layer(CatchPanicLayer::new())
            .with_state(dispatcher);

        match self.static_bypass.clone() {
            Some(static_router) => static_router.merge(app),
            None => app,
        }
    }
}

#[async_trait::async_trait]
impl Listener for HttpListener {
    async fn initialize(&self, dispatcher: Arc<Dispatcher>, shutdown: CancellationToken) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.url, self.config.port)
            .parse()
            .map_err(|e| Error::Internal(format!("invalid server.url/server.port: {e}")))?;

        let app = self.build_router(dispatcher);
        let own_shutdown = self.shutdown.clone();
        let service_name = self.service_name.clone();

        if self.config.tls_requested() {
            let cert_path = self.config.ssl_cert.clone().ok_or_else(|| {
                Error::Internal("server.ssl_key set without server.ssl_cert".to_string())
            })?;
            let key_path = self.config.ssl_key.clone().ok_or_else(|| {
                Error::Internal("server.ssl_cert set without server.ssl_key".to_string())
            })?;
            let tls_config = load_server_config(&cert_path, &key_path)?;
            let tcp = TokioTcpListener::bind(addr).await?;
            let listener = TlsListener::new(tcp, tls_config);

            tracing::info!(%addr, service = %service_name, "https listener starting");
            tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(wait_for_either(shutdown, own_shutdown))
                    .await
                    .map_err(|e| tracing::error!(error = %e, "https listener exited"))
                    .ok();
            });
        } else {
            let tcp = TokioTcpListener::bind(addr).await?;
            tracing::info!(%addr, service = %service_name, "http listener starting");
            tokio::spawn(async move {
                axum::serve(tcp, app)
                    .with_graceful_shutdown(wait_for_either(shutdown, own_shutdown))
                    .await
                    .map_err(|e| tracing::error!(error = %e, "http listener exited"))
                    .ok();
            });
        }

        Ok(())
    }

    async fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

async fn wait_for_either(a: CancellationToken, b: CancellationToken) {
    tokio::select! {
        () = a.cancelled() => {}
        () = b.cancelled() => {}
    }
}

fn is_websocket_upgrade(req: &Request<Body>) -> bool {
    req.headers()
        .get(http::header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

async fn fallback(State(dispatcher): State<Arc<Dispatcher>>, req: Request<Body>) -> Response {
    if is_websocket_upgrade(&req) {
        return match WebSocketUpgrade::from_request(req, &()).await {
            Ok(upgrade) => upgrade.on_upgrade(move |socket| handle_socket(socket, dispatcher)),
            Err(rejection) => rejection.into_response(),
        };
    }

    let request_id = req
        .extensions()
        .get::<tower_http::request_id::RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .map(ToString::to_string)
        .unwrap_or_else(|| RequestId::new().to_string());

    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();
    let query = parts
        .uri
        .query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect::<std::collections::HashMap<_, _>>()
        })
        .unwrap_or_default();

    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return Error::BadRequest(format!("failed to read request body: {e}")).into_response()
        }
    };

    let request = RequestView {
        method: Some(parts.method),
        path: path.clone(),
        query,
        headers: parts.headers,
        body: bytes,
    };

    match dispatcher
        .on_message(Message::Http { session_id: request_id, url: path, request, as_web: false })
        .await
    {
        Outcome::Http(response) => response_view_into_response(response),
        _ => unreachable!("HttpListener only ever sends Message::Http"),
    }
}

fn response_view_into_response(view: ResponseView) -> Response {
    let mut builder = http::Response::builder().status(view.status);
    if let Some(headers) = builder.headers_mut() {
        *headers = view.headers;
    }
    builder
        .body(Body::from(view.body))
        .unwrap_or_else(|_| http::StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Handles one upgraded WebSocket connection end-to-end: registers the
/// session, fans inbound frames to the Dispatcher in arrival order, and
/// forwards outbound frames written through `session.sender` back to the
/// socket (spec §4.4.2).
async fn handle_socket(socket: WebSocket, dispatcher: Arc<Dispatcher>) {
    let (mut sink, mut stream) = socket.split();
    let session_id = new_session_id();
    let (tx, mut rx) = tokio::sync::mpsc::channel(64);
    let session = WebSocketSession::new(session_id.clone(), tx);

    dispatcher
        .session_manager()
        .send(RegisterSession { session: session.clone() })
        .await;

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        use crate::websocket::Message as WsMessage;
        match message {
            WsMessage::Text(text) => {
                dispatcher
                    .on_message(Message::WebSocket {
                        frame: WebSocketFrame::Text(text.to_string()),
                        session: session.clone(),
                    })
                    .await;
            }
            WsMessage::Binary(data) => {
                dispatcher
                    .on_message(Message::WebSocket {
                        frame: WebSocketFrame::Binary(data),
                        session: session.clone(),
                    })
                    .await;
            }
            WsMessage::Close(_) => break,
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
        }
    }

    dispatcher
        .session_manager()
        .send(SessionDisconnected { session_id })
        .await;
    writer.abort();
}
