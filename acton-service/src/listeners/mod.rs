//! Transport front-ends. Each Listener owns one accept loop (or one axum
//! server) and translates its own wire framing into a [`crate::dispatcher::Message`],
//! handing it to the [`crate::dispatcher::Dispatcher`] and nothing else (spec §4.4).

mod amqp;
mod http;
mod tcp;

pub use amqp::AmqpListener;
pub use http::HttpListener;
pub use tcp::TcpListener;
