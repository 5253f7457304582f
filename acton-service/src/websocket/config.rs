//! WebSocket subsystem configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// WebSocket server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    /// Enable WebSocket support
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Maximum message size in bytes (default: 64KB)
    #[serde(default = "default_max_message_size")]
    pub max_message_size_bytes: usize,

    /// Maximum number of concurrent WebSocket connections per client IP
    #[serde(default = "default_max_connections_per_client")]
    pub max_connections_per_client: usize,

    /// Ping interval in seconds (for keepalive)
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// Pong timeout in seconds (disconnect if no pong received)
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_secs: u64,

    /// Group membership configuration (spec §3: `WebSocketSessionManager` groups)
    #[serde(default)]
    pub groups: GroupConfig,
}

impl WebSocketConfig {
    #[must_use]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    #[must_use]
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_message_size_bytes: default_max_message_size(),
            max_connections_per_client: default_max_connections_per_client(),
            ping_interval_secs: default_ping_interval(),
            pong_timeout_secs: default_pong_timeout(),
            groups: GroupConfig::default(),
        }
    }
}

/// Group membership limits. Groups themselves are created implicitly by
/// the first `add_to_group` call and purged when their last member leaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Maximum members per group
    #[serde(default = "default_max_group_members")]
    pub max_members: usize,

    /// Maximum groups a single session can join
    #[serde(default = "default_max_groups_per_session")]
    pub max_groups_per_session: usize,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            max_members: default_max_group_members(),
            max_groups_per_session: default_max_groups_per_session(),
        }
    }
}

const fn default_enabled() -> bool {
    true
}

const fn default_max_message_size() -> usize {
    65536 // 64KB
}

const fn default_max_connections_per_client() -> usize {
    5
}

const fn default_ping_interval() -> u64 {
    30
}

const fn default_pong_timeout() -> u64 {
    10
}

const fn default_max_group_members() -> usize {
    1000
}

const fn default_max_groups_per_session() -> usize {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_websocket_config_matches_documented_defaults() {
        let config = WebSocketConfig::default();
        assert!(config.enabled);
        assert_eq!(config.max_message_size_bytes, 65536);
        assert_eq!(config.ping_interval_secs, 30);
        assert_eq!(config.groups.max_members, 1000);
    }

    #[test]
    fn duration_helpers_convert_from_seconds() {
        let config = WebSocketConfig::default();
        assert_eq!(config.ping_interval(), Duration::from_secs(30));
        assert_eq!(config.pong_timeout(), Duration::from_secs(10));
    }
}
