use tokio_util::sync::CancellationToken;

use crate::di::Scope;

use super::{impl_any_context, ContextCore, RequestView, ResponseView};

/// An HTML-rendering request (spec §3): handler return values are treated
/// as a string and written with `Content-Type: text/html; charset=utf-8`.
pub struct WebContext {
    pub(crate) core: ContextCore,
    pub request: RequestView,
    pub response: ResponseView,
}

impl_any_context!(WebContext);

impl WebContext {
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
}
