pub mod document;
pub mod log_entries;
pub mod log_msg;
pub mod patch;

pub use document::EntriesDocument;
pub use log_entries::LogEntryChannel;
pub use log_msg::LogMsg;
pub use patch::{ConversationPatch, PatchType, escape_json_pointer_segment, execution_process_patch};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Patch(#[from] json_patch::PatchError),
    #[error("entry index out of range at {path} (entries: {len})")]
    OutOfRange { path: String, len: usize },
    #[error("patch removed the entry list")]
    MissingEntries,
}
