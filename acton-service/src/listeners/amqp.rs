//! AMQP Listener (spec §4.4.4): consumes from a declared queue or a
//! queue bound to a declared exchange, handing each delivery to the
//! Dispatcher and acking/nacking per the resulting [`AmqpOutcome`]. A lost
//! connection is retried on `retry_delay_ms` until `shutdown` fires.

use std::sync::Arc;

use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Connection, ConnectionProperties, ExchangeKind};
use tokio_util::sync::CancellationToken;

use crate::config::AmqpListenerConfig;
use crate::context::AmqpOutcome;
use crate::dispatcher::{Dispatcher, Listener, Message, Outcome};
use crate::error::Result;
use crate::ids::new_session_id;

/// One AMQP Listener per `rabbit[]` entry (spec §6).
pub struct AmqpListener {
    config: AmqpListenerConfig,
    shutdown: CancellationToken,
}

impl AmqpListener {
    pub fn new(config: AmqpListenerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, shutdown: CancellationToken::new() })
    }
}

#[async_trait::async_trait]
impl Listener for AmqpListener {
    async fn initialize(&self, dispatcher: Arc<Dispatcher>, shutdown: CancellationToken) -> Result<()> {
        let config = self.config.clone();
        let own_shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                if own_shutdown.is_cancelled() || shutdown.is_cancelled() {
                    break;
                }

                match run_once(&config, &dispatcher, &own_shutdown, &shutdown).await {
                    Ok(()) => break,
                    Err(e) => {
                        tracing::error!(url = %config.url, error = %e, "amqp listener connection lost, retrying");
                        tokio::time::sleep(config.retry_delay()).await;
                    }
                }
            }
        });

        Ok(())
    }

    async fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Connects, declares the queue/exchange, and consumes until the connection
/// drops or a shutdown signal arrives. Returns `Ok(())` only on a clean
/// shutdown; any connection error returns `Err` so the caller retries.
async fn run_once(
    config: &AmqpListenerConfig,
    dispatcher: &Arc<Dispatcher>,
    own_shutdown: &CancellationToken,
    outer_shutdown: &CancellationToken,
) -> Result<()> {
    let connection = Connection::connect(&config.url, ConnectionProperties::default()).await?;
    let channel = connection.create_channel().await?;

    channel
        .basic_qos(config.prefetch, BasicQosOptions::default())
        .await?;

    let queue_name = match (&config.queue, &config.exchange) {
        (Some(queue), None) => {
            channel
                .queue_declare(
                    queue,
                    QueueDeclareOptions {
                        durable: config.durable,
                        exclusive: config.exclusive,
                        auto_delete: config.auto_delete,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await?;
            queue.clone()
        }
        (None, Some(exchange)) => {
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
                    ExchangeDeclareOptions { durable: config.durable, ..Default::default() },
                    FieldTable::default(),
                )
                .await?;

            let queue = channel
                .queue_declare(
                    "",
                    QueueDeclareOptions {
                        durable: config.durable,
                        exclusive: config.exclusive,
                        auto_delete: config.auto_delete,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await?;
            let queue_name = queue.name().to_string();

            channel
                .queue_bind(
                    &queue_name,
                    &exchange.name,
                    &exchange.routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
            queue_name
        }
        _ => unreachable!("AmqpListenerConfig::validate enforces exactly one of queue/exchange"),
    };

    let mut consumer = channel
        .basic_consume(
            &queue_name,
            "acton-service",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    tracing::info!(queue = %queue_name, "amqp listener consuming");

    loop {
        tokio::select! {
            () = own_shutdown.cancelled() => return Ok(()),
            () = outer_shutdown.cancelled() => return Ok(()),
            delivery = consumer.next() => {
                let Some(delivery) = delivery else { return Err(crate::error::Error::Internal(
                    "amqp consumer stream ended".to_string(),
                )) };
                let delivery = delivery?;

                let outcome = dispatcher
                    .on_message(Message::Amqp {
                        session_id: new_session_id(),
                        body: delivery.data.clone().into(),
                        routing_key: delivery.routing_key.to_string(),
                        exchange: delivery.exchange.to_string(),
                        delivery_tag: delivery.delivery_tag,
                        redelivered: delivery.redelivered,
                    })
                    .await;

                let Outcome::Amqp(outcome) = outcome else {
                    unreachable!("AmqpListener only ever sends Message::Amqp")
                };

                match outcome {
                    AmqpOutcome::Ack => {
                        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                            tracing::warn!(error = %e, "failed to ack amqp delivery");
                        }
                    }
                    AmqpOutcome::Nack { requeue } => {
                        if let Err(e) =
                            delivery.nack(BasicNackOptions { requeue, ..Default::default() }).await
                        {
                            tracing::warn!(error = %e, "failed to nack amqp delivery");
                        }
                    }
                }
            }
        }
    }
}
