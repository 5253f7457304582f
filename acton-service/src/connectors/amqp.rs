//! AMQP producer connector: publishes through a [`AmqpPoolAgent`]-owned
//! channel (spec §3 `AmqpConnector`, keyed `rabbitmq.<tag>`).

use std::sync::Arc;
use std::time::Duration;

use acton_reactive::prelude::{AgentHandle, AgentRuntime};
use lapin::options::BasicPublishOptions;
use lapin::BasicProperties;
use tokio::sync::RwLock;

use crate::agents::{AmqpPoolAgent, SharedAmqpChannel};
use crate::config::AmqpConnectorConfig;
use crate::error::{Error, Result};

/// Resolves `rabbitmq.<tag>` in the DI container.
pub struct AmqpConnector {
    tag: String,
    config: AmqpConnectorConfig,
    channel: SharedAmqpChannel,
    _agent: AgentHandle,
}

impl AmqpConnector {
    pub async fn connect(runtime: &mut AgentRuntime, tag: String, config: AmqpConnectorConfig) -> Result<Self> {
        config.validate()?;
        let shared: SharedAmqpChannel = Arc::new(RwLock::new(None));

        let agent = AmqpPoolAgent::spawn(runtime, tag.clone(), config.clone(), Some(shared.clone()))
            .await
            .map_err(|e| Error::ConnectorConfig(format!("amqp connector '{tag}' failed to start: {e}")))?;

        Ok(Self { tag, config, channel: shared, _agent: agent })
    }

    /// Publishes a message. `routing_key` overrides the connector's
    /// configured routing key/queue name when set. Retries once after a
    /// brief delay on a transient publish failure (spec §4.6 "connectors
    /// retry a single transient failure before surfacing an error").
    pub async fn publish(&self, payload: &[u8], routing_key: Option<&str>) -> Result<()> {
        match self.try_publish(payload, routing_key).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_retriable() => {
                tracing::warn!(tag = %self.tag, error = %e, "amqp publish failed, retrying once");
                tokio::time::sleep(Duration::from_millis(200)).await;
                self.try_publish(payload, routing_key).await
            }
            Err(e) => Err(e),
        }
    }

    async fn try_publish(&self, payload: &[u8], routing_key: Option<&str>) -> Result<()> {
        let guard = self.channel.read().await;
        let channel = guard.as_ref().ok_or_else(|| {
            Error::ConnectorConfig(format!("amqp connector '{}' is not yet connected", self.tag))
        })?;

        let (exchange, key) = match (&self.config.exchange, &self.config.queue) {
            (Some(exchange), _) => (
                exchange.name.as_str(),
                routing_key.unwrap_or(exchange.routing_key.as_str()),
            ),
            (None, Some(queue)) => {
                if routing_key.is_some() {
                    return Err(Error::ConnectorConfig(format!(
                        "amqp connector '{}' is in queue mode; routing_key must be omitted",
                        self.tag
                    )));
                }
                ("", queue.as_str())
            }
            (None, None) => unreachable!("AmqpConnectorConfig::validate rejects this combination"),
        };

        channel
            .basic_publish(
                exchange,
                key,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_content_encoding("utf-8".into()),
            )
            .await?
            .await?;
        Ok(())
    }
}
