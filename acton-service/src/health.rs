//! Liveness/readiness handlers, wired as ordinary RESTful handlers against
//! [`crate::agents::HealthMonitorAgent`] (spec §4.5 "health aggregation").
//!
//! These are plain functions, not axum extractors: register them with
//! [`crate::dispatcher::Dispatcher::register_restful`] like any other
//! handler. The `HealthMonitorAgent`'s handle is resolved from the scope via
//! DI, so it must be registered as a singleton during `configure_services`.

use std::sync::Arc;

use acton_reactive::prelude::AgentHandle;
use serde::{Deserialize, Serialize};

use crate::agents::{AggregatedHealthResponse, GetAggregatedHealth};
use crate::context::RESTfulContext;
use crate::error::Result;

/// Liveness probe response: always healthy if the process is running.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Liveness probe (spec: "always 200 while the process is up").
pub async fn health(_ctx: RESTfulContext) -> Result<HealthResponse> {
    Ok(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness probe: aggregates every connector's last-reported status via
/// the `HealthMonitorAgent` (spec: "no I/O on the request path").
pub async fn readiness(
    _ctx: RESTfulContext,
    monitor: Arc<AgentHandle>,
) -> Result<AggregatedHealthResponse> {
    let response = monitor
        .send_and_wait::<GetAggregatedHealth, AggregatedHealthResponse>()
        .await
        .map_err(|e| crate::error::Error::Internal(format!("health monitor query failed: {e}")))?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_reports_the_crate_version() {
        let ctx = crate::context::RESTfulContext::new(
            "s1".into(),
            "/health".into(),
            crate::context::RequestView::default(),
            crate::di::ServiceCollection::new().build(),
            tokio_util::sync::CancellationToken::new(),
        );
        let response = health(ctx).await.unwrap();
        assert_eq!(response.status, "healthy");
    }
}
