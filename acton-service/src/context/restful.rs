use tokio_util::sync::CancellationToken;

use crate::di::Scope;

use super::{impl_any_context, ContextCore, RequestView, ResponseView};

/// A JSON RESTful request (spec §3): handler return values are JSON-encoded
/// into the response body.
pub struct RESTfulContext {
    pub(crate) core: ContextCore,
    pub request: RequestView,
    pub response: ResponseView,
}

impl_any_context!(RESTfulContext);

impl RESTfulContext {
    pub fn new(
        session_id: String,
        url: String,
        request: RequestView,
        services: Scope,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            core: ContextCore::new(session_id, url, services, cancellation_token),
            request,
            response: ResponseView::default(),
        }
    }

    /// Validates `self.request.body` against a caller-supplied check,
    /// surfacing failure as `SchemaValidationError` (spec §4.6).
    pub fn check_schema<F>(&self, check: F) -> crate::error::Result<()>
    where
        F: FnOnce(&RequestView) -> Result<(), String>,
    {
        check(&self.request).map_err(crate::error::Error::SchemaValidation)
    }
}
