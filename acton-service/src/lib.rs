//! # acton-service
//!
//! A multi-protocol application server core: a [`Dispatcher`] accepts
//! messages from heterogeneous Listeners (HTTP/HTTPS, WebSocket, raw TCP,
//! AMQP), classifies each into a typed [`Context`](context), routes it
//! through a predicate-based [`Router`](router) to a user [`Handler`], and
//! supplies dependencies via a three-lifetime DI container.
//!
//! ## Example
//!
//! ```rust,no_run
//! use acton_service::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let dispatcher = Dispatcher::new(config.router.as_ref(), GroupConfig::default()).await?;
//!     dispatcher.router().register_restful(vec![Predicate::url("/health").unwrap()], |_: RESTfulContext| async move {
//!         Ok(serde_json::json!({"status": "ok"}))
//!     });
//!
//!     let dispatcher = std::sync::Arc::new(dispatcher);
//!     dispatcher.run().await
//! }
//! ```

pub mod config;
pub mod connectors;
pub mod context;
pub mod di;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod health;
pub mod ids;
pub mod listeners;
pub mod middleware;
pub mod observability;
pub mod router;
mod tls;
pub mod websocket;

/// Internal agent-based components (connection pools, background tasks,
/// health aggregation). Most applications reach these only through
/// [`Dispatcher`](dispatcher::Dispatcher) and the `connectors` module.
pub mod agents;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::connectors::{AmqpConnector, MongoConnector, RestClient};
    pub use crate::context::{
        AmqpContext, AmqpOutcome, AnyContext, RESTfulContext, RequestView, ResponseView,
        SocketContext, WebContext, WebSocketContext, WebSocketFrame,
    };
    pub use crate::di::{FromScope, Keyed, Lifetime, Scope, ServiceCollection, ServiceProvider};
    pub use crate::dispatcher::{Dispatcher, Listener, Message, Outcome};
    pub use crate::error::{Error, Result};
    pub use crate::handler::Handler;
    pub use crate::health::{health, readiness};
    pub use crate::ids::{MakeTypedRequestId, RequestId, RequestIdError};
    pub use crate::listeners::{AmqpListener, HttpListener, TcpListener};
    pub use crate::middleware::{
        request_id_layer, request_id_propagation_layer, sensitive_headers_layer,
        PROPAGATE_HEADERS, SENSITIVE_HEADERS,
    };
    pub use crate::observability::{init_tracing, shutdown_tracing};
    pub use crate::router::{ContextKind, HandlerId, Predicate, Router, UrlPattern};
    pub use crate::websocket::{GroupConfig, GroupId, WebSocketConfig};

    pub use crate::agents::{AggregatedHealthResponse, BackgroundWorker, HealthStatus, TaskStatus};

    pub use serde::{Deserialize, Serialize};
    pub use serde_json;

    pub use tracing::{debug, error, info, instrument, trace, warn, Level, Span};

    pub use tokio;

    pub use async_trait::async_trait;

    pub use thiserror::Error;
    pub use anyhow::{self, Context as AnyhowContext};

    pub use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
    pub use uuid::Uuid;

    pub use futures::{future, stream, Future, Stream, StreamExt, TryFutureExt, TryStreamExt};

    pub use http::{Method, StatusCode, Uri};

    pub use acton_reactive::prelude::*;
}
