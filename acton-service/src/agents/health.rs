//! Health monitoring agent aggregating connector health.
//!
//! Subscribes to [`PoolHealthUpdate`] broadcasts from connector agents and
//! keeps a cached view so health-check handlers never perform I/O.

use std::collections::HashMap;

use acton_reactive::prelude::*;

use super::messages::{
    AggregatedHealthResponse, ComponentHealth, GetAggregatedHealth, HealthStatus, PoolHealthUpdate,
};

/// State for the health monitor agent.
#[derive(Debug, Default)]
pub struct HealthMonitorState {
    /// Health by component name, e.g. `"mongo:primary"`.
    components: HashMap<String, ComponentHealth>,
}

impl HealthMonitorState {
    fn is_overall_healthy(&self) -> bool {
        if self.components.is_empty() {
            return true;
        }
        self.components
            .values()
            .all(|c| c.status == HealthStatus::Healthy)
    }

    fn get_aggregated_health(&self) -> AggregatedHealthResponse {
        AggregatedHealthResponse {
            overall_healthy: self.is_overall_healthy(),
            components: self.components.values().cloned().collect(),
        }
    }
}

/// Agent that aggregates connector health for the readiness endpoint.
pub struct HealthMonitorAgent;

impl HealthMonitorAgent {
    /// Spawn the monitor. Connector agents should be spawned afterwards so
    /// their health updates are captured from the start.
    pub async fn spawn(runtime: &mut AgentRuntime) -> anyhow::Result<AgentHandle> {
        let mut agent = runtime.new_agent::<HealthMonitorState>();

        agent.mutate_on::<PoolHealthUpdate>(|agent, envelope| {
            let update = envelope.message();
            let component_health = ComponentHealth {
                name: update.pool_type.clone(),
                status: update.status.clone(),
                message: update.message.clone(),
            };
            agent
                .model
                .components
                .insert(update.pool_type.clone(), component_health);

            tracing::debug!(
                pool_type = %update.pool_type,
                status = ?update.status,
                "health monitor received connector update"
            );

            AgentReply::immediate()
        });

        agent.act_on::<GetAggregatedHealth>(|agent, envelope| {
            let health = agent.model.get_aggregated_health();
            let reply_envelope = envelope.reply_envelope();

            AgentReply::from_async(async move {
                reply_envelope.send(health).await;
            })
        });

        agent.after_start(|_agent| {
            tracing::info!("health monitor agent started");
            AgentReply::immediate()
        });

        agent.before_stop(|agent| {
            let component_count = agent.model.components.len();
            tracing::info!(component_count, "health monitor agent stopping");
            AgentReply::immediate()
        });

        agent.handle().subscribe::<PoolHealthUpdate>().await;
        agent.handle().subscribe::<GetAggregatedHealth>().await;

        let handle = agent.start().await;
        Ok(handle)
    }
}
