//! WebSocket subsystem (spec §3 `WebSocketSession`/`WebSocketSessionManager`,
//! §4.4.2).
//!
//! A session is created on successful HTTP upgrade and registered with the
//! `WebSocketSessionManager`. The session's send channel serializes outbound
//! frames; group membership and broadcast fan-out are owned by the manager
//! agent so concurrent producers never race on the socket itself.

mod config;
mod manager;
mod messages;
mod session;

pub use config::{GroupConfig, WebSocketConfig};
pub use manager::{Group, GroupId, SharedSessionManager, WebSocketSessionManager};
pub use messages::{
    AddToGroup, BroadcastAll, BroadcastToGroup, GetGroupInfo, GroupInfoResponse, RegisterSession,
    RemoveFromGroup, SendToSession, SessionDisconnected,
};
pub use session::{SessionId, WebSocketSession};

// Re-export axum WebSocket types for convenience
pub use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
