//! Ambient HTTP middleware: request-id generation/propagation and sensitive
//! header masking, applied by the HTTP listener ahead of dispatch.
//!
//! Authentication/authorization are left to the application's own handlers
//! (via DI-resolved dependencies), not provided as framework middleware.

pub mod request_tracking;

pub use request_tracking::{
    request_id_layer, request_id_propagation_layer, sensitive_headers_layer,
    RequestTrackingConfig, PROPAGATE_HEADERS, SENSITIVE_HEADERS,
};
