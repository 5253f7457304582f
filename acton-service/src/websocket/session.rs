//! A single upgraded WebSocket connection (spec §3: `WebSocketSession`)

use std::fmt;

use axum::extract::ws::Message;
use tokio::sync::mpsc;

/// Identifies one upgraded WebSocket connection. Shares representation with
/// `ContextCore::session_id` so a session can be looked up by the same key
/// a `WebSocketContext` carries.
pub type SessionId = String;

/// A registered WebSocket session (spec §3: `(session_id, send_channel, groups)`).
///
/// The send channel serializes outbound frames so that concurrent producers
/// (the handler, a background broadcast, the ping task) never write to the
/// socket directly.
#[derive(Debug, Clone)]
pub struct WebSocketSession {
    pub id: SessionId,
    pub sender: mpsc::Sender<Message>,
}

impl WebSocketSession {
    #[must_use]
    pub fn new(id: SessionId, sender: mpsc::Sender<Message>) -> Self {
        Self { id, sender }
    }

    /// Sends a message to this session. Returns an error if the socket task
    /// has already torn down the connection.
    pub async fn send(&self, message: Message) -> Result<(), mpsc::error::SendError<Message>> {
        self.sender.send(message).await
    }

    pub async fn send_text(
        &self,
        text: impl Into<String>,
    ) -> Result<(), mpsc::error::SendError<Message>> {
        self.send(Message::Text(text.into().into())).await
    }

    pub async fn send_binary(
        &self,
        data: Vec<u8>,
    ) -> Result<(), mpsc::error::SendError<Message>> {
        self.send(Message::Binary(data.into())).await
    }
}

impl fmt::Display for WebSocketSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_text_delivers_a_text_frame() {
        let (tx, mut rx) = mpsc::channel(8);
        let session = WebSocketSession::new("sess-1".into(), tx);
        session.send_text("hello").await.unwrap();
        assert!(matches!(rx.recv().await, Some(Message::Text(_))));
    }

    #[tokio::test]
    async fn send_after_receiver_drop_reports_closed() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let session = WebSocketSession::new("sess-1".into(), tx);
        assert!(session.send_text("hello").await.is_err());
    }
}
