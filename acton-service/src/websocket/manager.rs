//! `WebSocketSessionManager` — the singleton owning every upgraded session
//! and its group memberships (spec §3, §4.4.2).
//!
//! Implemented as an `acton-reactive` agent rather than a
//! `RwLock<HashMap<..>>`: the agent mailbox serializes every mutation, which
//! gives the copy-on-iterate broadcast snapshot the spec requires for free
//! (each `BroadcastToGroup`/`BroadcastAll` handler collects its senders from
//! `agent.model` before awaiting any send).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use acton_reactive::prelude::*;
use chrono::{DateTime, Utc};

use super::messages::{
    AddToGroup, BroadcastAll, BroadcastToGroup, GetGroupInfo, GroupInfoResponse, RegisterSession,
    RemoveFromGroup, SendToSession, SessionDisconnected,
};
use super::session::{SessionId, WebSocketSession};
use super::GroupConfig;

pub type GroupId = String;

/// A set of sessions addressable together (spec: `groups: map<group, set<id>>`).
#[derive(Debug, Default)]
pub struct Group {
    pub members: HashSet<SessionId>,
    pub created_at: DateTime<Utc>,
}

impl Group {
    fn new() -> Self {
        Self {
            members: HashSet::new(),
            created_at: Utc::now(),
        }
    }
}

/// Handle shared into `AppState`/the DI container so handlers can resolve it.
pub type SharedSessionManager = Arc<AgentHandle>;

#[derive(Debug, Default)]
pub struct WebSocketSessionManagerState {
    sessions: HashMap<SessionId, WebSocketSession>,
    groups: HashMap<GroupId, Group>,
    session_groups: HashMap<SessionId, HashSet<GroupId>>,
    max_members_per_group: usize,
    max_groups_per_session: usize,
}

pub struct WebSocketSessionManager;

impl WebSocketSessionManager {
    pub async fn spawn(runtime: &mut AgentRuntime, config: GroupConfig) -> anyhow::Result<AgentHandle> {
        let mut agent = runtime.new_agent::<WebSocketSessionManagerState>();
        agent.model.max_members_per_group = config.max_members;
        agent.model.max_groups_per_session = config.max_groups_per_session;

        agent.mutate_on::<RegisterSession>(|agent, envelope| {
            let session = envelope.message().session.clone();
            tracing::debug!(session_id = %session.id, "websocket session registered");
            agent.model.sessions.insert(session.id.clone(), session);
            AgentReply::immediate()
        });

        agent.mutate_on::<SessionDisconnected>(|agent, envelope| {
            let session_id = envelope.message().session_id.clone();
            agent.model.sessions.remove(&session_id);

            if let Some(group_ids) = agent.model.session_groups.remove(&session_id) {
                for group_id in group_ids {
                    if let Some(group) = agent.model.groups.get_mut(&group_id) {
                        group.members.remove(&session_id);
                        if group.members.is_empty() {
                            agent.model.groups.remove(&group_id);
                            tracing::debug!(group_id = %group_id, "empty group purged");
                        }
                    }
                }
            }

            tracing::debug!(session_id = %session_id, "websocket session disconnected");
            AgentReply::immediate()
        });

        agent.mutate_on::<AddToGroup>(|agent, envelope| {
            let request = envelope.message();
            let group_id = request.group_id.clone();
            let session_id = request.session_id.clone();

            if !agent.model.sessions.contains_key(&session_id) {
                return AgentReply::immediate();
            }

            let session_groups = agent.model.session_groups.entry(session_id.clone()).or_default();
            if session_groups.len() >= agent.model.max_groups_per_session {
                tracing::warn!(
                    session_id = %session_id,
                    limit = agent.model.max_groups_per_session,
                    "session at max group membership limit"
                );
                return AgentReply::immediate();
            }

            let group = agent.model.groups.entry(group_id.clone()).or_insert_with(Group::new);
            if group.members.len() >= agent.model.max_members_per_group {
                tracing::warn!(group_id = %group_id, limit = agent.model.max_members_per_group, "group at capacity");
                return AgentReply::immediate();
            }

            group.members.insert(session_id.clone());
            session_groups.insert(group_id.clone());

            tracing::info!(group_id = %group_id, session_id = %session_id, "session joined group");
            AgentReply::immediate()
        });

        agent.mutate_on::<RemoveFromGroup>(|agent, envelope| {
            let request = envelope.message();
            let group_id = &request.group_id;
            let session_id = &request.session_id;

            if let Some(group) = agent.model.groups.get_mut(group_id) {
                group.members.remove(session_id);
                if group.members.is_empty() {
                    agent.model.groups.remove(group_id);
                    tracing::debug!(group_id = %group_id, "empty group purged");
                }
            }
            if let Some(groups) = agent.model.session_groups.get_mut(session_id) {
                groups.remove(group_id);
            }

            AgentReply::immediate()
        });

        agent.act_on::<BroadcastToGroup>(|agent, envelope| {
            let request = envelope.message();
            let message = request.message.clone();
            let exclude = request.exclude.clone();
            let group_id = request.group_id.clone();

            let senders: Vec<WebSocketSession> = agent
                .model
                .groups
                .get(&group_id)
                .map(|group| {
                    group
                        .members
                        .iter()
                        .filter(|id| exclude.as_deref() != Some(id.as_str()))
                        .filter_map(|id| agent.model.sessions.get(id).cloned())
                        .collect()
                })
                .unwrap_or_default();

            AgentReply::from_async(async move {
                let mut sent = 0;
                for session in &senders {
                    if session.send(message.clone()).await.is_ok() {
                        sent += 1;
                    }
                }
                tracing::debug!(group_id = %group_id, sent, total = senders.len(), "group broadcast completed");
            })
        });

        agent.act_on::<BroadcastAll>(|agent, envelope| {
            let request = envelope.message();
            let message = request.message.clone();
            let exclude = request.exclude.clone();

            let senders: Vec<WebSocketSession> = agent
                .model
                .sessions
                .values()
                .filter(|s| !exclude.contains(&s.id))
                .cloned()
                .collect();

            AgentReply::from_async(async move {
                let mut sent = 0;
                for session in &senders {
                    if session.send(message.clone()).await.is_ok() {
                        sent += 1;
                    }
                }
                tracing::debug!(sent, total = senders.len(), "broadcast to all completed");
            })
        });

        agent.act_on::<SendToSession>(|agent, envelope| {
            let request = envelope.message();
            let message = request.message.clone();
            let session = agent.model.sessions.get(&request.session_id).cloned();

            AgentReply::from_async(async move {
                if let Some(session) = session {
                    if session.send(message).await.is_err() {
                        tracing::debug!(session_id = %session.id, "send to closed session dropped");
                    }
                }
            })
        });

        agent.act_on::<GetGroupInfo>(|agent, envelope| {
            let group_id = envelope.message().group_id.clone();
            let reply_envelope = envelope.reply_envelope();

            let response = match agent.model.groups.get(&group_id) {
                Some(group) => GroupInfoResponse {
                    group_id,
                    member_count: group.members.len(),
                    exists: true,
                },
                None => GroupInfoResponse {
                    group_id,
                    member_count: 0,
                    exists: false,
                },
            };

            AgentReply::from_async(async move {
                reply_envelope.send(response).await;
            })
        });

        agent.after_start(|_agent| {
            tracing::info!("websocket session manager started");
            AgentReply::immediate()
        });

        agent.before_stop(|agent| {
            let sessions = agent.model.sessions.len();
            let groups = agent.model.groups.len();
            tracing::info!(sessions, groups, "websocket session manager shutting down");
            AgentReply::immediate()
        });

        let handle = agent.start().await;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_starts_empty() {
        let group = Group::new();
        assert!(group.members.is_empty());
    }
}
