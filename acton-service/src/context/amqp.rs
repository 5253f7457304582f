use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::di::Scope;
use crate::error::{Error, Result};

use super::{impl_any_context, ContextCore};

/// The ack/nack signal a handler may set explicitly (spec §4.3 step 5,
/// §4.4.4: "acks on normal handler completion and nacks-without-requeue on
/// exception"). Left `None`, the Dispatcher applies that default; a handler
/// that calls `ctx.nack(true)` overrides it, e.g. to ask for redelivery
/// after a transient downstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmqpOutcome {
    Ack,
    Nack { requeue: bool },
}

/// One AMQP delivery (spec §3 `AmqpContext`): `request.body: bytes` with a
/// JSON decode helper, plus `delivery_tag` and the routing metadata the
/// Dispatcher needs to ack/nack on the channel the listener owns.
pub struct AmqpContext {
    pub(crate) core: ContextCore,
    pub body: Bytes,
    pub routing_key: String,
    pub exchange: String,
    pub delivery_tag: u64,
    pub redelivered: bool,
    outcome: Arc<Mutex<Option<AmqpOutcome>>>,
}

impl_any_context!(AmqpContext);

impl AmqpContext {
    pub fn new(
        session_id: String,
        body: Bytes,
        routing_key: String,
        exchange: String,
        delivery_tag: u64,
        redelivered: bool,
        services: Scope,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            core: ContextCore::new(
                session_id.clone(),
                format!("amqp://{exchange}/{routing_key}"),
                services,
                cancellation_token,
            ),
            body,
            routing_key,
            exchange,
            delivery_tag,
            redelivered,
            outcome: Arc::new(Mutex::new(None)),
        }
    }

    /// Decodes the delivery body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| Error::SchemaValidation(e.to_string()))
    }

    /// Explicitly acknowledges the delivery, overriding the Dispatcher's
    /// default ack-on-success behavior.
    pub fn ack(&self) {
        *self.outcome.lock() = Some(AmqpOutcome::Ack);
    }

    /// Explicitly rejects the delivery. `requeue` controls whether the
    /// broker redelivers it.
    pub fn nack(&self, requeue: bool) {
        *self.outcome.lock() = Some(AmqpOutcome::Nack { requeue });
    }

    /// The outcome a handler set explicitly, if any. `None` means the
    /// Dispatcher should apply its default (ack on success, nack without
    /// requeue on handler error).
    pub fn explicit_outcome(&self) -> Option<AmqpOutcome> {
        *self.outcome.lock()
    }

    /// A cheaply-cloned handle onto the outcome cell. The Dispatcher takes
    /// one of these before handing the context (by value) to the handler,
    /// so it can still read the final outcome after the handler returns.
    pub fn outcome_handle(&self) -> Arc<Mutex<Option<AmqpOutcome>>> {
        self.outcome.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::ServiceCollection;

    fn scope() -> Scope {
        ServiceCollection::new().build()
    }

    #[test]
    fn default_outcome_is_none_until_set() {
        let ctx = AmqpContext::new(
            "delivery-1".into(),
            Bytes::from_static(b"{}"),
            "rk".into(),
            "ex".into(),
            1,
            false,
            scope(),
            CancellationToken::new(),
        );
        assert_eq!(ctx.explicit_outcome(), None);
        ctx.nack(true);
        assert_eq!(ctx.explicit_outcome(), Some(AmqpOutcome::Nack { requeue: true }));
    }

    #[test]
    fn json_decodes_the_body() {
        #[derive(serde::Deserialize)]
        struct Payload {
            n: u32,
        }
        let ctx = AmqpContext::new(
            "delivery-1".into(),
            Bytes::from_static(b"{\"n\":7}"),
            "rk".into(),
            "ex".into(),
            1,
            false,
            scope(),
            CancellationToken::new(),
        );
        assert_eq!(ctx.json::<Payload>().unwrap().n, 7);
    }
}
