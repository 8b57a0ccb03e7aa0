use std::sync::Arc;

use executors_protocol::ExecutionProcess;
use futures::StreamExt;
use logs_client::{PatchStreamClient, PatchStreamEvent, StreamEndpoint, StreamError};
use logs_protocol::PatchType;

/// Where a live stream delivers its batches.
pub trait LiveStreamTarget: Send + Sync {
    /// Replaces the process's entries. `finished` marks the final batch.
    /// Returns false when the stream should stop because its attempt is no
    /// longer current.
    fn apply_entries(
        &self,
        process: &ExecutionProcess,
        entries: Vec<PatchType>,
        finished: bool,
    ) -> bool;
}

/// Follows one running process's log stream. Failures go back to the caller;
/// retrying is the caller's business.
#[derive(Clone)]
pub struct LiveEntryStreamer {
    client: Arc<dyn PatchStreamClient>,
}

impl LiveEntryStreamer {
    pub fn new(client: Arc<dyn PatchStreamClient>) -> Self {
        Self { client }
    }

    /// Returns `Ok` once the process finished or the target lost interest.
    pub async fn stream<T>(&self, process: &ExecutionProcess, target: &T) -> Result<(), StreamError>
    where
        T: LiveStreamTarget + ?Sized,
    {
        let mut stream = self
            .client
            .open(&StreamEndpoint::for_process(process))
            .await?;
        tracing::debug!(process_id = %process.id, "live log stream attached");

        while let Some(event) = stream.next().await {
            match event? {
                PatchStreamEvent::Entries(entries) => {
                    if !target.apply_entries(process, entries, false) {
                        return Ok(());
                    }
                }
                PatchStreamEvent::Finished(entries) => {
                    target.apply_entries(process, entries, true);
                    return Ok(());
                }
            }
        }
        Err(StreamError::ClosedBeforeFinished)
    }
}
