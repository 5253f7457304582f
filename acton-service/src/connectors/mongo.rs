//! MongoDB connector: a DI-resolvable handle onto a [`MongoPoolAgent`]-owned
//! client (spec §3 `MongoConnector`, keyed `database.<tag>`).

use acton_reactive::prelude::{AgentHandle, AgentRuntime};
use mongodb::bson::Document;
use mongodb::Collection;
use tokio::sync::RwLock;

use std::sync::Arc;

use crate::agents::{MongoPoolAgent, SharedMongoClient};
use crate::config::MongoConfig;
use crate::error::{Error, Result};

/// Resolves `database.<tag>` in the DI container. Reads go through the
/// shared client cell the pool agent refreshes on every reconnect, so a
/// handler never blocks on the connector agent's mailbox for a query.
pub struct MongoConnector {
    tag: String,
    database: String,
    client: SharedMongoClient,
    /// Kept alive so the connector agent isn't dropped while this handle
    /// still exists; unused otherwise.
    _agent: AgentHandle,
}

impl MongoConnector {
    /// Spawns the pool agent for `tag` and returns a connector handle.
    /// Connection happens in the background; `optional` (from `config`)
    /// controls whether a failed initial connection blocks startup.
    pub async fn connect(runtime: &mut AgentRuntime, tag: String, config: MongoConfig) -> Result<Self> {
        let database = config.database.clone();
        let shared: SharedMongoClient = Arc::new(RwLock::new(None));

        let agent = MongoPoolAgent::spawn(runtime, tag.clone(), config, Some(shared.clone()))
            .await
            .map_err(|e| Error::ConnectorConfig(format!("mongo connector '{tag}' failed to start: {e}")))?;

        Ok(Self { tag, database, client: shared, _agent: agent })
    }

    /// Typed handle to a collection. Fails if the client hasn't connected
    /// yet (spec: callers should retry or treat this as a transient error).
    pub async fn collection<T>(&self, name: &str) -> Result<Collection<T>>
    where
        T: Send + Sync,
    {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or_else(|| {
            Error::ConnectorConfig(format!("mongo connector '{}' is not yet connected", self.tag))
        })?;
        Ok(client.database(&self.database).collection(name))
    }

    /// True if a collection with this name already exists.
    pub async fn collection_exists(&self, name: &str) -> Result<bool> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or_else(|| {
            Error::ConnectorConfig(format!("mongo connector '{}' is not yet connected", self.tag))
        })?;
        let names = client.database(&self.database).list_collection_names().await?;
        Ok(names.iter().any(|n| n == name))
    }

    /// Creates a collection explicitly (e.g. ahead of setting validators).
    pub async fn create_collection(&self, name: &str) -> Result<()> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or_else(|| {
            Error::ConnectorConfig(format!("mongo connector '{}' is not yet connected", self.tag))
        })?;
        client.database(&self.database).create_collection(name).await?;
        Ok(())
    }

    pub async fn drop_collection(&self, name: &str) -> Result<()> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or_else(|| {
            Error::ConnectorConfig(format!("mongo connector '{}' is not yet connected", self.tag))
        })?;
        let collection: Collection<Document> = client.database(&self.database).collection(name);
        collection.drop().await?;
        Ok(())
    }
}
