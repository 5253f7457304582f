//! Resilient connector agents.
//!
//! Mongo and AMQP connections are established by actors instead of behind a
//! shared `Arc<RwLock<Option<T>>>`: the agent mailbox is the only writer, so
//! `AppState` readers never contend with a reconnect attempt. This mirrors
//! the spawn-then-message-self pattern used for every connector in this
//! module, because `acton-reactive` handlers must be `Send + Sync` while the
//! underlying driver futures are only `Send`.

use std::sync::Arc;
use std::time::Duration;

use acton_reactive::prelude::*;
use tokio::sync::RwLock;

use crate::config::{AmqpConnectorConfig, MongoConfig};

use super::messages::{
    AmqpConnected, AmqpConnectionFailed, AmqpConnectionLost, MongoConnected,
    MongoConnectionFailed, PoolHealthUpdate,
};
use super::HealthStatus;

// ============================================================================
// MongoDB connector agent
// ============================================================================

/// Shared storage read directly by `AppState::mongo(tag)`.
pub type SharedMongoClient = Arc<RwLock<Option<mongodb::Client>>>;

/// State for the MongoDB connector agent.
#[derive(Debug, Default)]
pub struct MongoPoolState {
    pub client: Option<mongodb::Client>,
    pub config: Option<MongoConfig>,
    pub tag: String,
    pub connecting: bool,
    pub shared_client: Option<SharedMongoClient>,
}

/// Actor-managed MongoDB client, keyed by connector tag (`database.<tag>`).
pub struct MongoPoolAgent;

impl MongoPoolAgent {
    /// Spawn a connector agent for one `database.<tag>` entry. The agent
    /// begins connecting immediately; `shared_client` is populated once the
    /// first connection succeeds and refreshed on every reconnect.
    pub async fn spawn(
        runtime: &mut AgentRuntime,
        tag: String,
        config: MongoConfig,
        shared_client: Option<SharedMongoClient>,
    ) -> anyhow::Result<AgentHandle> {
        let mut agent = runtime.new_agent::<MongoPoolState>();

        agent.model.tag = tag.clone();
        agent.model.config = Some(config);
        agent.model.connecting = true;
        agent.model.shared_client = shared_client;

        agent.mutate_on::<MongoConnected>(|agent, envelope| {
            let client = envelope.message().client.clone();
            agent.model.client = Some(client.clone());
            agent.model.connecting = false;
            let shared = agent.model.shared_client.clone();
            let tag = agent.model.tag.clone();
            let broker = agent.handle().clone();

            AgentReply::from_async(async move {
                if let Some(shared) = shared {
                    *shared.write().await = Some(client);
                }
                tracing::info!(tag = %tag, "mongo connector connected");
                broker
                    .broadcast(PoolHealthUpdate {
                        pool_type: format!("mongo:{tag}"),
                        status: HealthStatus::Healthy,
                        message: "connected".to_string(),
                    })
                    .await;
            })
        });

        agent.mutate_on::<MongoConnectionFailed>(|agent, envelope| {
            let error = envelope.message().error.clone();
            agent.model.connecting = false;
            let tag = agent.model.tag.clone();
            let optional = agent
                .model
                .config
                .as_ref()
                .map(|c| c.optional)
                .unwrap_or(false);
            let broker = agent.handle().clone();
            tracing::error!(tag = %tag, error = %error, "mongo connector failed to connect");

            AgentReply::from_async(async move {
                broker
                    .broadcast(PoolHealthUpdate {
                        pool_type: format!("mongo:{tag}"),
                        status: if optional {
                            HealthStatus::Degraded
                        } else {
                            HealthStatus::Unhealthy
                        },
                        message: error,
                    })
                    .await;
            })
        });

        agent.after_start(|agent| {
            let config = agent.model.config.clone();
            let self_handle = agent.handle().clone();

            AgentReply::from_async(async move {
                let Some(config) = config else { return };
                tracing::info!("mongo connector starting, connecting...");
                let result = tokio::spawn(async move { connect_mongo(&config).await }).await;
                match result {
                    Ok(Ok(client)) => {
                        self_handle.send(MongoConnected { client }).await;
                    }
                    Ok(Err(e)) => {
                        self_handle
                            .send(MongoConnectionFailed { error: e.to_string() })
                            .await;
                    }
                    Err(e) => {
                        self_handle
                            .send(MongoConnectionFailed {
                                error: format!("connect task panicked: {e}"),
                            })
                            .await;
                    }
                }
            })
        });

        agent.before_stop(|agent| {
            let tag = agent.model.tag.clone();
            AgentReply::from_async(async move {
                tracing::info!(tag = %tag, "mongo connector stopping");
            })
        });

        let handle = agent.start().await;
        Ok(handle)
    }
}

async fn connect_mongo(config: &MongoConfig) -> crate::error::Result<mongodb::Client> {
    use mongodb::options::ClientOptions;

    let mut options = ClientOptions::parse(&config.url).await?;
    options.min_pool_size = Some(config.pool_min);
    options.max_pool_size = Some(config.pool_max);
    options.connect_timeout = Some(Duration::from_secs(config.connect_timeout_secs));
    options.app_name = Some(config.database.clone());

    let client = mongodb::Client::with_options(options)?;
    // Round-trip a ping so connection failures surface at startup rather
    // than on the first real query.
    client
        .database(&config.database)
        .run_command(mongodb::bson::doc! { "ping": 1 })
        .await?;
    Ok(client)
}

// ============================================================================
// AMQP connector agent (producer side)
// ============================================================================

/// Shared storage read directly by `AppState::amqp(tag)`.
pub type SharedAmqpChannel = Arc<RwLock<Option<lapin::Channel>>>;

/// State for the AMQP connector agent.
#[derive(Debug, Default)]
pub struct AmqpPoolState {
    pub connection: Option<Arc<lapin::Connection>>,
    pub channel: Option<lapin::Channel>,
    pub config: Option<AmqpConnectorConfig>,
    pub tag: String,
    pub connecting: bool,
    pub shared_channel: Option<SharedAmqpChannel>,
}

/// Actor-managed AMQP connection/channel pair, keyed by connector tag
/// (`rabbitmq.<tag>`). Reconnects on its own schedule when the connection
/// drops (spec §4.6 resilience requirement for connectors).
pub struct AmqpPoolAgent;

impl AmqpPoolAgent {
    pub async fn spawn(
        runtime: &mut AgentRuntime,
        tag: String,
        config: AmqpConnectorConfig,
        shared_channel: Option<SharedAmqpChannel>,
    ) -> anyhow::Result<AgentHandle> {
        config.validate()?;

        let mut agent = runtime.new_agent::<AmqpPoolState>();
        agent.model.tag = tag.clone();
        agent.model.config = Some(config);
        agent.model.connecting = true;
        agent.model.shared_channel = shared_channel;

        agent.mutate_on::<AmqpConnected>(|agent, envelope| {
            let connection = envelope.message().connection.clone();
            let channel = envelope.message().channel.clone();
            agent.model.connection = Some(connection);
            agent.model.channel = Some(channel.clone());
            agent.model.connecting = false;
            let shared = agent.model.shared_channel.clone();
            let tag = agent.model.tag.clone();
            let broker = agent.handle().clone();

            AgentReply::from_async(async move {
                if let Some(shared) = shared {
                    *shared.write().await = Some(channel);
                }
                tracing::info!(tag = %tag, "amqp connector connected");
                broker
                    .broadcast(PoolHealthUpdate {
                        pool_type: format!("amqp:{tag}"),
                        status: HealthStatus::Healthy,
                        message: "connected".to_string(),
                    })
                    .await;
            })
        });

        agent.mutate_on::<AmqpConnectionFailed>(|agent, envelope| {
            let error = envelope.message().error.clone();
            agent.model.connecting = false;
            let tag = agent.model.tag.clone();
            let retry_delay = agent
                .model
                .config
                .as_ref()
                .map(|c| c.retry_delay())
                .unwrap_or_else(|| Duration::from_secs(2));
            let self_handle = agent.handle().clone();
            let config = agent.model.config.clone();
            tracing::error!(tag = %tag, error = %error, "amqp connector failed to connect, retrying");

            AgentReply::from_async(async move {
                self_handle
                    .broadcast(PoolHealthUpdate {
                        pool_type: format!("amqp:{tag}"),
                        status: HealthStatus::Unhealthy,
                        message: error,
                    })
                    .await;
                tokio::time::sleep(retry_delay).await;
                if let Some(config) = config {
                    reconnect(&self_handle, config).await;
                }
            })
        });

        agent.mutate_on::<AmqpConnectionLost>(|agent, envelope| {
            let reason = envelope.message().reason.clone();
            let tag = agent.model.tag.clone();
            agent.model.channel = None;
            agent.model.connection = None;
            agent.model.connecting = true;
            let shared = agent.model.shared_channel.clone();
            let retry_delay = agent
                .model
                .config
                .as_ref()
                .map(|c| c.retry_delay())
                .unwrap_or_else(|| Duration::from_secs(2));
            let self_handle = agent.handle().clone();
            let config = agent.model.config.clone();
            tracing::warn!(tag = %tag, reason = %reason, "amqp connection lost, reconnecting");

            AgentReply::from_async(async move {
                if let Some(shared) = shared {
                    *shared.write().await = None;
                }
                self_handle
                    .broadcast(PoolHealthUpdate {
                        pool_type: format!("amqp:{tag}"),
                        status: HealthStatus::Connecting,
                        message: reason,
                    })
                    .await;
                tokio::time::sleep(retry_delay).await;
                if let Some(config) = config {
                    reconnect(&self_handle, config).await;
                }
            })
        });

        agent.after_start(|agent| {
            let config = agent.model.config.clone();
            let self_handle = agent.handle().clone();
            AgentReply::from_async(async move {
                if let Some(config) = config {
                    reconnect(&self_handle, config).await;
                }
            })
        });

        agent.before_stop(|agent| {
            let connection = agent.model.connection.clone();
            let tag = agent.model.tag.clone();
            AgentReply::from_async(async move {
                if let Some(conn) = connection {
                    tracing::info!(tag = %tag, "amqp connector stopping");
                    let _ = conn.close(200, "shutting down").await;
                }
            })
        });

        let handle = agent.start().await;
        Ok(handle)
    }
}

/// Connects (or reconnects) and reports the result back to the agent via
/// message, keeping the non-`Sync` lapin futures off the agent's handler.
async fn reconnect(self_handle: &AgentHandle, config: AmqpConnectorConfig) {
    let result = tokio::spawn(async move { connect_amqp(&config).await }).await;
    match result {
        Ok(Ok((connection, channel))) => {
            self_handle
                .send(AmqpConnected {
                    connection: Arc::new(connection),
                    channel,
                })
                .await;
        }
        Ok(Err(e)) => {
            self_handle
                .send(AmqpConnectionFailed { error: e.to_string() })
                .await;
        }
        Err(e) => {
            self_handle
                .send(AmqpConnectionFailed {
                    error: format!("connect task panicked: {e}"),
                })
                .await;
        }
    }
}

async fn connect_amqp(
    config: &AmqpConnectorConfig,
) -> crate::error::Result<(lapin::Connection, lapin::Channel)> {
    use lapin::options::{ExchangeDeclareOptions, QueueDeclareOptions};
    use lapin::types::FieldTable;
    use lapin::{Connection, ConnectionProperties, ExchangeKind};

    let connection =
        Connection::connect(&config.url, ConnectionProperties::default()).await?;
    let channel = connection.create_channel().await?;

    if let Some(queue) = &config.queue {
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: config.durable,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
    } else if let Some(exchange) = &config.exchange {
        let kind = match exchange.kind.as_str() {
            "fanout" => ExchangeKind::Fanout,
            "topic" => ExchangeKind::Topic,
            "headers" => ExchangeKind::Headers,
            _ => ExchangeKind::Direct,
        };
        channel
            .exchange_declare(
                &exchange.name,
                kind,
                ExchangeDeclareOptions {
                    durable: config.durable,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
    }

    Ok((connection, channel))
}
