use dashmap::DashMap;
use logs_protocol::PatchType;
use uuid::Uuid;

/// Entries of terminal processes keyed by (attempt id, process id).
///
/// Written once per process and never evicted, so reopening an attempt
/// replays its finished processes without touching the network. Share one
/// instance across `ConversationHistory` values through an `Arc`.
#[derive(Debug, Default)]
pub struct HistoricalEntryCache {
    entries: DashMap<(Uuid, Uuid), Vec<PatchType>>,
}

impl HistoricalEntryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, attempt_id: Uuid, process_id: Uuid) -> Option<Vec<PatchType>> {
        self.entries
            .get(&(attempt_id, process_id))
            .map(|entry| entry.value().clone())
    }

    /// Stores `entries` unless the key is already populated.
    pub fn insert(&self, attempt_id: Uuid, process_id: Uuid, entries: Vec<PatchType>) {
        self.entries
            .entry((attempt_id, process_id))
            .or_insert(entries);
    }

    pub fn contains(&self, attempt_id: Uuid, process_id: Uuid) -> bool {
        self.entries.contains_key(&(attempt_id, process_id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
