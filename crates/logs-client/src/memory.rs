use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::TryStreamExt;
use logs_store::MsgStore;
use uuid::Uuid;

use crate::{
    EntriesMode, PatchStream, PatchStreamClient, StreamEndpoint, StreamError, entries_stream_with,
};

/// In-process client over registered [`MsgStore`]s. A process whose store is
/// not registered yet behaves like an endpoint that cannot be attached to.
#[derive(Clone, Default)]
pub struct MsgStoreClient {
    stores: Arc<DashMap<Uuid, Arc<MsgStore>>>,
}

impl MsgStoreClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, process_id: Uuid, store: Arc<MsgStore>) {
        self.stores.insert(process_id, store);
    }

    pub fn remove(&self, process_id: &Uuid) -> Option<Arc<MsgStore>> {
        self.stores.remove(process_id).map(|(_, store)| store)
    }

    pub fn get(&self, process_id: &Uuid) -> Option<Arc<MsgStore>> {
        self.stores.get(process_id).map(|entry| entry.value().clone())
    }
}

impl MsgStoreClient {
    fn open_with(
        &self,
        endpoint: &StreamEndpoint,
        mode: EntriesMode,
    ) -> Result<PatchStream, StreamError> {
        let store = self
            .get(&endpoint.process_id)
            .ok_or(StreamError::NotFound(endpoint.process_id))?;
        tracing::debug!(
            process_id = %endpoint.process_id,
            channel = %endpoint.channel,
            ?mode,
            "opening in-memory log stream"
        );
        let messages = store.patch_stream(endpoint.channel).map_err(StreamError::from);
        Ok(entries_stream_with(messages, mode))
    }
}

#[async_trait]
impl PatchStreamClient for MsgStoreClient {
    async fn open(&self, endpoint: &StreamEndpoint) -> Result<PatchStream, StreamError> {
        self.open_with(endpoint, EntriesMode::Snapshots)
    }

    async fn open_history(&self, endpoint: &StreamEndpoint) -> Result<PatchStream, StreamError> {
        self.open_with(endpoint, EntriesMode::FinalOnly)
    }
}
