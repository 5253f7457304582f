//! Error types shared by every layer of the dispatcher: DI resolution, routing,
//! handler invocation, and the connectors.

use axum::{http::StatusCode, response::Html, response::IntoResponse, response::Response, Json};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// The unified error taxonomy (spec §4.6 / §7).
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration failed to load or validate.
    #[error("configuration error: {0}")]
    Config(Box<figment::Error>),

    /// No registered handler's predicates matched the context.
    #[error("no handler matched {url}")]
    HandlerNotFound {
        /// The URL (or logical address) that failed to match.
        url: String,
    },

    /// A handler deliberately aborted the pipeline; the response already
    /// written to the context should be flushed as-is.
    #[error("short-circuited by handler")]
    ShortCircuit,

    /// The DI container could not satisfy a required dependency.
    #[error("unresolved dependency: {type_name}")]
    DependencyUnresolved {
        /// The Rust type name that could not be resolved.
        type_name: &'static str,
    },

    /// Resolution revisited a type already on the in-flight resolution stack.
    #[error("circular dependency detected while resolving {type_name}")]
    CircularDependency {
        /// The type whose resolution re-entered itself.
        type_name: &'static str,
    },

    /// A handler's `check_schema` call failed.
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    /// MongoDB connector error.
    #[error("mongo error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    /// AMQP connector/listener error.
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),

    /// Outbound REST-client error.
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Malformed or missing connector configuration (spec §3, §6).
    #[error("connector configuration error: {0}")]
    ConnectorConfig(String),

    /// I/O error (TCP listener, TLS material).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad request (malformed input from a client).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Catch-all for handler-raised or internal failures.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for connector failures a caller might reasonably retry.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::Mongo(_) | Error::Amqp(_) | Error::HttpClient(_) | Error::Io(_))
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

/// JSON error body for RESTful transports: `{error, detail?}` (spec §7).
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable error kind, e.g. `"HANDLER_NOT_FOUND"`.
    pub error: String,
    /// Optional human-readable detail. Never a stack trace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

/// Maps an [`Error`] onto `(status, kind, detail)` for a RESTful or Web
/// response. Transports that aren't HTTP-shaped (WebSocket/Socket/AMQP) use
/// the transport's own close/reject path instead (see `dispatcher`).
fn classify(err: &Error) -> (StatusCode, &'static str, Option<String>) {
    match err {
        Error::Config(e) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR", Some(e.to_string())),
        Error::HandlerNotFound { url } => {
            (StatusCode::NOT_FOUND, "HANDLER_NOT_FOUND", Some(format!("no route for {url}")))
        }
        Error::ShortCircuit => (StatusCode::OK, "SHORT_CIRCUIT", None),
        Error::DependencyUnresolved { type_name } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "DEPENDENCY_UNRESOLVED",
            Some(format!("could not resolve {type_name}")),
        ),
        Error::CircularDependency { type_name } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "CIRCULAR_DEPENDENCY",
            Some(format!("cycle while resolving {type_name}")),
        ),
        Error::SchemaValidation(msg) => (StatusCode::BAD_REQUEST, "SCHEMA_VALIDATION", Some(msg.clone())),
        Error::Mongo(_) => (StatusCode::INTERNAL_SERVER_ERROR, "MONGO_ERROR", None),
        Error::Amqp(_) => (StatusCode::INTERNAL_SERVER_ERROR, "AMQP_ERROR", None),
        Error::HttpClient(_) => (StatusCode::BAD_GATEWAY, "HTTP_CLIENT_ERROR", None),
        Error::ConnectorConfig(msg) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "CONNECTOR_CONFIG_ERROR", Some(msg.clone()))
        }
        Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR", None),
        Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", Some(msg.clone())),
        Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", Some(msg.clone())),
        Error::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", Some(msg.clone())),
    }
}

impl IntoResponse for Error {
    /// Default RESTful rendering: `{error, detail?}` JSON per spec §7.
    fn into_response(self) -> Response {
        if matches!(self, Error::ShortCircuit) {
            // The context's already-written response is what gets flushed;
            // this variant should normally be intercepted before reaching here.
            return StatusCode::OK.into_response();
        }
        tracing::error!(error = %self, "request failed");
        let (status, kind, detail) = classify(&self);
        (status, Json(ErrorResponse { error: kind.to_string(), detail })).into_response()
    }
}

impl Error {
    /// Renders this error as the minimal HTML body a Web context expects.
    pub fn into_web_response(self) -> Response {
        if matches!(self, Error::ShortCircuit) {
            return StatusCode::OK.into_response();
        }
        tracing::error!(error = %self, "request failed");
        let (status, kind, detail) = classify(&self);
        let body = format!(
            "<html><body><h1>{status}</h1><p>{kind}</p>{}</body></html>",
            detail.map(|d| format!("<pre>{d}</pre>")).unwrap_or_default()
        );
        (status, Html(body)).into_response()
    }

    /// Renders this error into a [`crate::context::ResponseView`] for the
    /// Dispatcher's HTTP pipeline (spec §4.3 "Any other exception ...
    /// RESTful 500 ... Web 500"), mirroring [`IntoResponse`]/
    /// [`Error::into_web_response`] but without requiring an axum
    /// `Response`.
    pub fn to_response_view(&self, as_html: bool) -> crate::context::ResponseView {
        use crate::context::ResponseView;

        if matches!(self, Error::ShortCircuit) {
            return ResponseView::default();
        }
        tracing::error!(error = %self, "request failed");
        let (status, kind, detail) = classify(self);
        let mut response = ResponseView { status, ..ResponseView::default() };

        if as_html {
            let body = format!(
                "<html><body><h1>{status}</h1><p>{kind}</p>{}</body></html>",
                detail.map(|d| format!("<pre>{d}</pre>")).unwrap_or_default()
            );
            response.headers.insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("text/html; charset=utf-8"),
            );
            response.body = body.into_bytes().into();
        } else {
            let payload = ErrorResponse { error: kind.to_string(), detail };
            response.headers.insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("application/json; charset=utf-8"),
            );
            response.body = serde_json::to_vec(&payload).unwrap_or_default().into();
        }
        response
    }
}
