//! Agent message types for resilient connectors and background work.
//!
//! All messages derive `Clone` and `Debug` to satisfy the `ActonMessage`
//! trait requirements via blanket implementation.

/// Health status of a connector.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Connector is connected and operational.
    Healthy,
    /// Connector is operational but degraded (e.g. reconnecting with a
    /// still-usable stale connection).
    Degraded,
    /// Connector is disconnected.
    #[default]
    Unhealthy,
    /// Connector is in the process of (re)connecting.
    Connecting,
}

/// Aggregated health across every registered connector (spec §6 health
/// endpoint).
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct AggregatedHealthResponse {
    /// Overall health (unhealthy if any component is unhealthy).
    pub overall_healthy: bool,
    /// Individual connector health statuses.
    pub components: Vec<ComponentHealth>,
}

/// Health of a single connector, keyed by its DI tag.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct ComponentHealth {
    /// Component name, e.g. `"mongo:primary"` or `"amqp:orders"`.
    pub name: String,
    /// Current health status.
    pub status: HealthStatus,
    /// Human-readable status detail.
    pub message: String,
}

/// Broadcast from a pool agent announcing its current health.
#[derive(Clone, Debug, Default)]
pub struct PoolHealthUpdate {
    /// The connector kind and tag, e.g. `"mongo:primary"`.
    pub pool_type: String,
    /// Current health status.
    pub status: HealthStatus,
    /// Human-readable status detail.
    pub message: String,
}

/// Query message requesting the aggregated health snapshot.
#[derive(Clone, Debug, Default)]
pub struct GetAggregatedHealth;

// =============================================================================
// Internal messages: spawned connection tasks report back to their agent
// =============================================================================

/// Sent when a MongoDB connector finishes (re)connecting successfully.
#[derive(Clone, Debug)]
pub(crate) struct MongoConnected {
    pub client: mongodb::Client,
}

/// Sent when a MongoDB connection attempt fails.
#[derive(Clone, Debug, Default)]
pub(crate) struct MongoConnectionFailed {
    pub error: String,
}

/// Sent when an AMQP connector finishes (re)connecting successfully.
#[derive(Clone, Debug)]
pub(crate) struct AmqpConnected {
    pub connection: std::sync::Arc<lapin::Connection>,
    pub channel: lapin::Channel,
}

/// Sent when an AMQP connection attempt fails.
#[derive(Clone, Debug, Default)]
pub(crate) struct AmqpConnectionFailed {
    pub error: String,
}

/// Sent when the underlying AMQP connection drops after having connected.
#[derive(Clone, Debug, Default)]
pub(crate) struct AmqpConnectionLost {
    pub reason: String,
}

// =============================================================================
// Background worker agent messages
// =============================================================================

/// Cancel a running background task by ID.
#[derive(Clone, Debug, Default)]
pub struct CancelTask {
    /// The task ID to cancel.
    pub task_id: String,
}

/// Query the status of a specific task.
#[derive(Clone, Debug, Default)]
pub struct GetTaskStatus {
    /// The task ID to query.
    pub task_id: String,
}

/// Query the status of every tracked task.
#[derive(Clone, Debug, Default)]
pub struct GetAllTaskStatuses;

/// Status of a single background task, returned from a status query.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct TaskStatusResponse {
    /// The task ID.
    pub task_id: String,
    /// Current status of the task.
    pub status: super::background_worker::TaskStatus,
}
