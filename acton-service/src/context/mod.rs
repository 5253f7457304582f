//! Context types: the per-message envelope carrying request/response views,
//! URL captures, a scoped DI container, and a cancellation token (spec §3
//! `Context`).

mod amqp;
mod restful;
mod socket;
mod web;
mod websocket;

pub use amqp::{AmqpContext, AmqpOutcome};
pub use restful::RESTfulContext;
pub use socket::SocketContext;
pub use web::WebContext;
pub use websocket::{WebSocketContext, WebSocketFrame};

use std::any::Any;
use std::collections::HashMap;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::di::Scope;

/// A lazily-read request body plus the parts every transport can supply.
#[derive(Debug, Clone, Default)]
pub struct RequestView {
    pub method: Option<Method>,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RequestView {
    /// Parses the body as JSON, regardless of `Content-Type`.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> crate::error::Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| crate::error::Error::BadRequest(format!("invalid JSON body: {e}")))
    }

    /// The body decoded as a UTF-8 string.
    pub fn text(&self) -> crate::error::Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| crate::error::Error::BadRequest(format!("invalid UTF-8 body: {e}")))
    }
}

/// The response a handler accumulates before the Dispatcher translates it
/// into a transport-specific write (spec §4.3 step 5).
#[derive(Debug, Clone)]
pub struct ResponseView {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Default for ResponseView {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

/// Fields shared by every concrete Context (spec §3 "Base record shared by
/// all concrete types").
pub trait AnyContext: Any + Send + Sync {
    fn session_id(&self) -> &str;
    fn url(&self) -> &str;
    fn url_segments(&self) -> &HashMap<String, String>;
    fn url_segments_mut(&mut self) -> &mut HashMap<String, String>;
    fn services(&self) -> &Scope;
    fn cancellation_token(&self) -> &CancellationToken;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Shared bookkeeping every concrete context embeds (session id, URL
/// captures, scoped container, cancellation token).
pub(crate) struct ContextCore {
    pub session_id: String,
    pub url: String,
    pub url_segments: HashMap<String, String>,
    pub services: Scope,
    pub cancellation_token: CancellationToken,
}

impl ContextCore {
    pub fn new(session_id: String, url: String, services: Scope, cancellation_token: CancellationToken) -> Self {
        Self {
            session_id,
            url,
            url_segments: HashMap::new(),
            services,
            cancellation_token,
        }
    }
}

/// Implements the [`AnyContext`] boilerplate for a struct embedding a
/// `core: ContextCore` field.
macro_rules! impl_any_context {
    ($ty:ty) => {
        impl $crate::context::AnyContext for $ty {
            fn session_id(&self) -> &str {
                &self.core.session_id
            }
            fn url(&self) -> &str {
                &self.core.url
            }
            fn url_segments(&self) -> &std::collections::HashMap<String, String> {
                &self.core.url_segments
            }
            fn url_segments_mut(&mut self) -> &mut std::collections::HashMap<String, String> {
                &mut self.core.url_segments
            }
            fn services(&self) -> &$crate::di::Scope {
                &self.core.services
            }
            fn cancellation_token(&self) -> &tokio_util::sync::CancellationToken {
                &self.core.cancellation_token
            }
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
                self
            }
        }
    };
}
pub(crate) use impl_any_context;
