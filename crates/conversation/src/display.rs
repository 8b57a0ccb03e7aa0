use std::fmt;

use logs_protocol::PatchType;
use serde::{Serialize, Serializer};
use uuid::Uuid;

pub const NEXT_ACTION_KEY: &str = "next_action";

/// Stable identity of one row in the flattened timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntryKey {
    /// `{process_id}:{index}`, position in the process's own entry stream.
    Indexed { process_id: Uuid, index: usize },
    /// `{process_id}:user`, the prompt that started a coding agent run.
    User(Uuid),
    /// `{process_id}:loading`
    Loading(Uuid),
    /// `next_action`
    NextAction,
}

impl EntryKey {
    pub fn process_id(&self) -> Option<Uuid> {
        match self {
            EntryKey::Indexed { process_id, .. } => Some(*process_id),
            EntryKey::User(id) | EntryKey::Loading(id) => Some(*id),
            EntryKey::NextAction => None,
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKey::Indexed { process_id, index } => write!(f, "{process_id}:{index}"),
            EntryKey::User(id) => write!(f, "{id}:user"),
            EntryKey::Loading(id) => write!(f, "{id}:loading"),
            EntryKey::NextAction => f.write_str(NEXT_ACTION_KEY),
        }
    }
}

impl Serialize for EntryKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayEntry {
    pub key: EntryKey,
    /// `None` only for the trailing next-action entry.
    pub process_id: Option<Uuid>,
    pub entry: PatchType,
}

impl DisplayEntry {
    pub fn new(key: EntryKey, entry: PatchType) -> Self {
        Self {
            process_id: key.process_id(),
            key,
            entry,
        }
    }

    /// Keys a process's raw entry stream by position.
    pub fn indexed(process_id: Uuid, entries: Vec<PatchType>) -> Vec<Self> {
        entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| Self::new(EntryKey::Indexed { process_id, index }, entry))
            .collect()
    }
}
