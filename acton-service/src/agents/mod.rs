//! Actor-based connector and background-task agents.
//!
//! Built on [`acton_reactive`], these agents replace the classic
//! `Arc<RwLock<Option<T>>>` pool pattern with a single-writer mailbox: each
//! connector owns its connection state and is the only thing that ever
//! mutates it, eliminating reader/reconnect races.
//!
//! - [`MongoPoolAgent`]/[`AmqpPoolAgent`] — resilient connector agents with
//!   automatic reconnection, keyed by DI tag (§3, §6).
//! - [`HealthMonitorAgent`] — aggregates connector health for the readiness
//!   endpoint without performing I/O on every request.
//! - [`BackgroundWorker`] — a managed alternative to ad-hoc `tokio::spawn`,
//!   with cancellation and status tracking.

mod background_worker;
mod health;
mod messages;
mod pool;

pub mod prelude {
    //! Convenient re-exports for agent-based components.
    pub use acton_reactive::prelude::*;

    pub use super::messages::{
        AggregatedHealthResponse, ComponentHealth, GetAggregatedHealth, HealthStatus,
        PoolHealthUpdate,
    };

    pub use super::health::{HealthMonitorAgent, HealthMonitorState};
    pub use super::pool::{
        AmqpPoolAgent, AmqpPoolState, MongoPoolAgent, MongoPoolState, SharedAmqpChannel,
        SharedMongoClient,
    };
    pub use super::background_worker::{BackgroundWorker, TaskStatus};
}

pub use background_worker::{BackgroundWorker, TaskStatus};
pub use health::{HealthMonitorAgent, HealthMonitorState};
pub use messages::{
    AggregatedHealthResponse, CancelTask, ComponentHealth, GetAggregatedHealth, GetAllTaskStatuses,
    GetTaskStatus, HealthStatus, PoolHealthUpdate, TaskStatusResponse,
};
pub use pool::{
    AmqpPoolAgent, AmqpPoolState, MongoPoolAgent, MongoPoolState, SharedAmqpChannel,
    SharedMongoClient,
};
