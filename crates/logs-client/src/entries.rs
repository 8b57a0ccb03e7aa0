use futures::{Stream, StreamExt, stream::BoxStream};
use logs_protocol::{EntriesDocument, LogMsg};

use crate::{PatchStream, PatchStreamEvent, StreamError};

/// Upper bound on messages folded into one snapshot.
const MAX_BATCH: usize = 512;

/// Which events a folded stream yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntriesMode {
    /// A snapshot after every batch of ready messages, then `Finished`.
    Snapshots,
    /// Only the final `Finished` list.
    FinalOnly,
}

struct State {
    batches: BoxStream<'static, Vec<Result<LogMsg, StreamError>>>,
    document: EntriesDocument,
    mode: EntriesMode,
    done: bool,
}

impl State {
    /// Folds one batch. Returns the event to yield, if any.
    fn fold(
        &mut self,
        batch: Vec<Result<LogMsg, StreamError>>,
    ) -> Option<Result<PatchStreamEvent, StreamError>> {
        let mut changed = false;
        for message in batch {
            match message {
                Ok(LogMsg::JsonPatch(patch)) => {
                    if let Err(err) = self.document.apply(&patch) {
                        self.done = true;
                        return Some(Err(err.into()));
                    }
                    changed = true;
                }
                Ok(LogMsg::Finished) => {
                    self.done = true;
                    let entries = std::mem::take(&mut self.document).into_entries();
                    return Some(Ok(PatchStreamEvent::Finished(entries)));
                }
                Ok(_) => {}
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
        (changed && self.mode == EntriesMode::Snapshots)
            .then(|| Ok(PatchStreamEvent::Entries(self.document.entries().to_vec())))
    }
}

/// Folds a log channel's messages into entry snapshots.
///
/// Messages that are already available are applied together and produce a
/// single snapshot, so replaying a long history costs one copy of the list
/// rather than one per entry. The stream ends after `Finished` or the first
/// error; running dry before `Finished` is reported as
/// [`StreamError::ClosedBeforeFinished`].
pub fn entries_stream<S>(messages: S) -> PatchStream
where
    S: Stream<Item = Result<LogMsg, StreamError>> + Send + 'static,
{
    entries_stream_with(messages, EntriesMode::Snapshots)
}

pub fn entries_stream_with<S>(messages: S, mode: EntriesMode) -> PatchStream
where
    S: Stream<Item = Result<LogMsg, StreamError>> + Send + 'static,
{
    let state = State {
        batches: messages.ready_chunks(MAX_BATCH).boxed(),
        document: EntriesDocument::new(),
        mode,
        done: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        while !state.done {
            let Some(batch) = state.batches.next().await else {
                state.done = true;
                return Some((Err(StreamError::ClosedBeforeFinished), state));
            };
            if let Some(item) = state.fold(batch) {
                return Some((item, state));
            }
        }
        None
    })
    .boxed()
}
