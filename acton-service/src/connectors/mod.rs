//! Resilient connectors for the three outbound protocols the core speaks
//! for itself: MongoDB, AMQP (producer side), and a plain REST client
//! (spec §3 "Connector"). Each wraps an `agents::*PoolAgent` (or, for the
//! REST client, a bare pooled `reqwest::Client`) behind a handle meant to be
//! registered in the DI container under its configured tag.

mod amqp;
mod mongo;
mod rest_client;

pub use amqp::AmqpConnector;
pub use mongo::MongoConnector;
pub use rest_client::{RestClient, RestResponse};
