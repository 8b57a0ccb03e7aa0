use serde::Serialize;
use tokio::sync::mpsc;

use crate::display::DisplayEntry;

/// Why the consumer is receiving a new timeline. Consumers pick a scroll
/// policy from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddType {
    /// First complete population for the current attempt.
    Initial,
    /// Update while live data arrives or the directory changes.
    Running,
    /// Reserved; never emitted.
    Historic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntriesUpdate {
    pub entries: Vec<DisplayEntry>,
    pub add_type: AddType,
    pub loading: bool,
}

/// Receives every flattened timeline. Called while the engine holds its state
/// lock, so implementations must not call back into the engine.
pub trait EntriesSink: Send + Sync {
    fn on_entries_updated(&self, entries: Vec<DisplayEntry>, add_type: AddType, loading: bool);
}

impl<F> EntriesSink for F
where
    F: Fn(Vec<DisplayEntry>, AddType, bool) + Send + Sync,
{
    fn on_entries_updated(&self, entries: Vec<DisplayEntry>, add_type: AddType, loading: bool) {
        self(entries, add_type, loading)
    }
}

/// Forwards updates to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<EntriesUpdate>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EntriesUpdate>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EntriesSink for ChannelSink {
    fn on_entries_updated(&self, entries: Vec<DisplayEntry>, add_type: AddType, loading: bool) {
        // A dropped receiver means nobody is watching any more.
        let _ = self.sender.send(EntriesUpdate {
            entries,
            add_type,
            loading,
        });
    }
}
