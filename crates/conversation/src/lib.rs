pub mod backoff;
pub mod cache;
pub mod config;
pub mod directory;
pub mod display;
pub mod error;
pub mod export;
pub mod guard;
pub mod history;
pub mod loader;
pub mod sink;
pub mod store;
pub mod streamer;
pub mod timeline;

#[cfg(test)]
mod test_support;

pub use cache::HistoricalEntryCache;
pub use config::{HistoryConfig, StreamRetryConfig};
pub use directory::ExecutionProcessDirectory;
pub use display::{DisplayEntry, EntryKey};
pub use error::{ConfigError, HistoryError};
pub use export::{ExportResult, export_to_markdown};
pub use guard::{AttemptGuard, AttemptTicket};
pub use history::ConversationHistory;
pub use loader::HistoricalEntryLoader;
pub use sink::{AddType, ChannelSink, EntriesSink, EntriesUpdate};
pub use store::{ProcessState, ProcessStateStore};
pub use streamer::{LiveEntryStreamer, LiveStreamTarget};
pub use timeline::flatten;
