use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::di::Scope;

use super::{impl_any_context, ContextCore};

/// One logical frame from a raw TCP session (spec §4.4.3). Frames for a
/// given session are delivered to handlers strictly in receive order.
pub struct SocketContext {
    pub(crate) core: ContextCore,
    /// The frame payload.
    pub frame: Bytes,
    reply: UnboundedSender<Bytes>,
}

impl_any_context!(SocketContext);

impl SocketContext {
    pub fn new(
        session_id: String,
        frame: Bytes,
        reply: UnboundedSender<Bytes>,
        services: Scope,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            core: ContextCore::new(session_id.clone(), format!("tcp://{session_id}"), services, cancellation_token),
            frame,
            reply,
        }
    }

    /// Writes a frame back to this session. Frames are serialized through
    /// the session's channel, never written directly to the socket.
    pub fn send(&self, payload: impl Into<Bytes>) -> crate::error::Result<()> {
        self.reply
            .send(payload.into())
            .map_err(|_| crate::error::Error::Internal("socket session closed".into()))
    }
}
