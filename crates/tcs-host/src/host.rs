//! The host interface consumed by the engine

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tcs_core::{Context, EntityState, StateChangedData};

use crate::{ServiceResult, StorageFile, StorageResult};

/// Stream of state changes for a fixed set of entities
///
/// Dropping the stream unsubscribes.
pub type StateChangeStream = BoxStream<'static, StateChangedData>;

/// Everything the engine needs from the platform it runs on
#[async_trait]
pub trait Host: Send + Sync {
    /// Current state of an entity, `None` when the host does not know it
    fn read_state(&self, entity_id: &str) -> Option<EntityState>;

    /// Call a service such as `climate.set_hvac_mode`
    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: serde_json::Value,
        context: Context,
    ) -> ServiceResult;

    /// Subscribe to state changes of the given entities
    fn subscribe_state_changes(&self, entity_ids: &[String]) -> StateChangeStream;

    /// Persist a versioned blob under `file.key`
    async fn persist(&self, file: StorageFile<serde_json::Value>) -> StorageResult<()>;

    /// Load a previously persisted blob
    async fn load(&self, key: &str) -> StorageResult<Option<StorageFile<serde_json::Value>>>;
}

/// Thread-safe handle to a host
pub type SharedHost = Arc<dyn Host>;
