use std::sync::Arc;

use executors_protocol::ExecutionProcess;
use futures::{StreamExt, future::join_all};
use logs_client::{PatchStreamClient, PatchStreamEvent, StreamEndpoint, StreamError};
use logs_protocol::PatchType;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::HistoricalEntryCache;

/// Reads the complete entry list of finished processes, through the cache.
#[derive(Clone)]
pub struct HistoricalEntryLoader {
    client: Arc<dyn PatchStreamClient>,
    cache: Arc<HistoricalEntryCache>,
}

impl HistoricalEntryLoader {
    pub fn new(client: Arc<dyn PatchStreamClient>, cache: Arc<HistoricalEntryCache>) -> Self {
        Self { client, cache }
    }

    pub fn cache(&self) -> &Arc<HistoricalEntryCache> {
        &self.cache
    }

    /// Never fails: a transport error yields an empty list, which is not
    /// cached so the next visit tries again.
    pub async fn load(&self, attempt_id: Uuid, process: &ExecutionProcess) -> Vec<PatchType> {
        if let Some(entries) = self.cache.get(attempt_id, process.id) {
            debug!(process_id = %process.id, "historical entries served from cache");
            return entries;
        }

        match self.fetch(process).await {
            Ok(entries) => {
                if process.is_running() {
                    debug!(process_id = %process.id, "not caching entries of a running process");
                } else {
                    self.cache.insert(attempt_id, process.id, entries.clone());
                }
                entries
            }
            Err(err) => {
                warn!(
                    process_id = %process.id,
                    error = %err,
                    "failed to load historical entries"
                );
                Vec::new()
            }
        }
    }

    /// Loads every process concurrently; results keep the input order.
    pub async fn load_all(
        &self,
        attempt_id: Uuid,
        processes: Vec<ExecutionProcess>,
    ) -> Vec<(ExecutionProcess, Vec<PatchType>)> {
        join_all(processes.into_iter().map(|process| async move {
            let entries = self.load(attempt_id, &process).await;
            (process, entries)
        }))
        .await
    }

    async fn fetch(&self, process: &ExecutionProcess) -> Result<Vec<PatchType>, StreamError> {
        let mut stream = self
            .client
            .open_history(&StreamEndpoint::for_process(process))
            .await?;
        while let Some(event) = stream.next().await {
            if let PatchStreamEvent::Finished(entries) = event? {
                return Ok(entries);
            }
        }
        Err(StreamError::ClosedBeforeFinished)
    }
}
