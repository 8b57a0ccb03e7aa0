//! Client side of the per-process log channels.
//!
//! A [`PatchStreamClient`] opens one stream per execution process and yields
//! [`PatchStreamEvent`]s: the full entry list after every applied patch batch,
//! and a final `Finished` carrying the complete list. Closing a stream is
//! dropping it. [`PatchStreamClient::open_history`] yields only the final
//! list.

use async_trait::async_trait;
use executors_protocol::ExecutionProcess;
use futures::stream::BoxStream;
use logs_protocol::{LogEntryChannel, PatchType};
use uuid::Uuid;

mod entries;
mod error;
pub mod memory;
pub mod ws;

pub use entries::{EntriesMode, entries_stream, entries_stream_with};
pub use error::StreamError;
pub use memory::MsgStoreClient;
pub use ws::WsPatchStreamClient;

#[derive(Debug, Clone, PartialEq)]
pub enum PatchStreamEvent {
    /// Entries after the latest patch batch, in document order.
    Entries(Vec<PatchType>),
    /// The process finished; this is the complete entry list.
    Finished(Vec<PatchType>),
}

pub type PatchStream = BoxStream<'static, Result<PatchStreamEvent, StreamError>>;

/// Addresses one process's log channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamEndpoint {
    pub process_id: Uuid,
    pub channel: LogEntryChannel,
}

impl StreamEndpoint {
    /// Script processes stream raw stdout/stderr; everything else streams
    /// normalized conversation entries.
    pub fn for_process(process: &ExecutionProcess) -> Self {
        let channel = if process.executor_action.is_script() {
            LogEntryChannel::Raw
        } else {
            LogEntryChannel::Normalized
        };
        Self {
            process_id: process.id,
            channel,
        }
    }

    /// Route relative to the API base, e.g.
    /// `/execution-processes/{id}/normalized-logs/ws`.
    pub fn path(&self) -> String {
        format!(
            "/execution-processes/{}/{}",
            self.process_id,
            self.channel.ws_segment()
        )
    }
}

#[async_trait]
pub trait PatchStreamClient: Send + Sync {
    async fn open(&self, endpoint: &StreamEndpoint) -> Result<PatchStream, StreamError>;

    /// Same channel as [`open`](Self::open), without intermediate snapshots.
    async fn open_history(&self, endpoint: &StreamEndpoint) -> Result<PatchStream, StreamError> {
        self.open(endpoint).await
    }
}
