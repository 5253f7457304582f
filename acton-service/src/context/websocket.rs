use std::sync::Arc;

use acton_reactive::prelude::AgentHandle;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::di::Scope;
use crate::error::{Error, Result};
use crate::websocket::{
    AddToGroup, BroadcastToGroup, GroupId, RemoveFromGroup, SendToSession, SessionId,
    WebSocketSession,
};

use super::{impl_any_context, ContextCore};

/// One received WebSocket frame, already classified (spec §4.4.2: "text
/// frames are decoded as UTF-8 strings").
#[derive(Debug, Clone)]
pub enum WebSocketFrame {
    Text(String),
    Binary(Bytes),
}

impl WebSocketFrame {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Binary(_) => None,
        }
    }

    #[must_use]
    pub fn as_binary(&self) -> Option<&Bytes> {
        match self {
            Self::Binary(b) => Some(b),
            Self::Text(_) => None,
        }
    }
}

/// A WebSocket frame dispatched through a live session (spec §3
/// `WebSocketContext`): `session: WebSocketSession`, and access to the
/// `WebSocketSessionManager` for group operations.
pub struct WebSocketContext {
    pub(crate) core: ContextCore,
    pub frame: WebSocketFrame,
    pub session: WebSocketSession,
    session_manager: Arc<AgentHandle>,
}

impl_any_context!(WebSocketContext);

impl WebSocketContext {
    pub fn new(
        frame: WebSocketFrame,
        session: WebSocketSession,
        session_manager: Arc<AgentHandle>,
        services: Scope,
        cancellation_token: CancellationToken,
    ) -> Self {
        let session_id = session.id.clone();
        Self {
            core: ContextCore::new(
                session_id.clone(),
                format!("ws://{session_id}"),
                services,
                cancellation_token,
            ),
            frame,
            session,
            session_manager,
        }
    }

    /// Parses the current frame as JSON. Fails with `SchemaValidationError`
    /// if the frame is binary or isn't valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let text = self
            .frame
            .as_text()
            .ok_or_else(|| Error::SchemaValidation("expected a text frame".into()))?;
        serde_json::from_str(text).map_err(|e| Error::SchemaValidation(e.to_string()))
    }

    /// Sends a message back to this frame's own session.
    pub async fn send(&self, message: impl Into<String>) -> Result<()> {
        self.session
            .send_text(message)
            .await
            .map_err(|_| Error::Internal("websocket session closed".into()))
    }

    /// Adds this session to a group (spec: `add_to_group`).
    pub async fn add_to_group(&self, group_id: impl Into<GroupId>) {
        self.session_manager
            .send(AddToGroup {
                group_id: group_id.into(),
                session_id: self.session.id.clone(),
            })
            .await;
    }

    /// Removes this session from a group (spec: `remove_from_group`).
    pub async fn remove_from_group(&self, group_id: impl Into<GroupId>) {
        self.session_manager
            .send(RemoveFromGroup {
                group_id: group_id.into(),
                session_id: self.session.id.clone(),
            })
            .await;
    }

    /// Sends a message to every member of a group (spec:
    /// `session_manager.send_to_group(group, message)`).
    pub async fn send_to_group(&self, group_id: impl Into<GroupId>, message: impl Into<String>) {
        self.session_manager
            .send(BroadcastToGroup::new(
                group_id.into(),
                axum::extract::ws::Message::Text(message.into().into()),
            ))
            .await;
    }

    /// Sends a message to another session by id, bypassing groups.
    pub async fn send_to_session(&self, session_id: impl Into<SessionId>, message: impl Into<String>) {
        self.session_manager
            .send(SendToSession {
                session_id: session_id.into(),
                message: axum::extract::ws::Message::Text(message.into().into()),
            })
            .await;
    }
}
