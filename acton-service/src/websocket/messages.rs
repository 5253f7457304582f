//! Actor messages exchanged with the `WebSocketSessionManager` agent

use axum::extract::ws::Message;

use super::manager::GroupId;
use super::session::{SessionId, WebSocketSession};

/// Registers a newly upgraded session with the manager.
#[derive(Debug, Clone)]
pub struct RegisterSession {
    pub session: WebSocketSession,
}

/// Notification that a session's socket has closed. The manager removes it
/// from every group, purging any group left empty.
#[derive(Debug, Clone)]
pub struct SessionDisconnected {
    pub session_id: SessionId,
}

/// Adds a session to a group, creating the group if it doesn't exist yet.
#[derive(Debug, Clone)]
pub struct AddToGroup {
    pub group_id: GroupId,
    pub session_id: SessionId,
}

/// Removes a session from a group. Purges the group if it becomes empty.
#[derive(Debug, Clone)]
pub struct RemoveFromGroup {
    pub group_id: GroupId,
    pub session_id: SessionId,
}

/// Sends a message to every member of a group.
#[derive(Debug, Clone)]
pub struct BroadcastToGroup {
    pub group_id: GroupId,
    pub message: Message,
    pub exclude: Option<SessionId>,
}

impl BroadcastToGroup {
    #[must_use]
    pub fn new(group_id: impl Into<GroupId>, message: Message) -> Self {
        Self {
            group_id: group_id.into(),
            message,
            exclude: None,
        }
    }
}

/// Sends a message to every registered session.
#[derive(Debug, Clone)]
pub struct BroadcastAll {
    pub message: Message,
    pub exclude: Vec<SessionId>,
}

/// Sends a message to exactly one session by id.
#[derive(Debug, Clone)]
pub struct SendToSession {
    pub session_id: SessionId,
    pub message: Message,
}

/// Requests a snapshot of a group's membership.
#[derive(Debug, Clone)]
pub struct GetGroupInfo {
    pub group_id: GroupId,
}

#[derive(Debug, Clone)]
pub struct GroupInfoResponse {
    pub group_id: GroupId,
    pub member_count: usize,
    pub exists: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_to_group_defaults_to_no_exclusion() {
        let msg = BroadcastToGroup::new("room-1", Message::Text("hi".into()));
        assert!(msg.exclude.is_none());
        assert_eq!(msg.group_id, "room-1");
    }
}
