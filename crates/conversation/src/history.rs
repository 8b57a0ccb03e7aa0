//! Keeps one consumer's conversation timeline in sync with an attempt's
//! execution processes.
//!
//! Finished processes are read once through the [`HistoricalEntryLoader`];
//! the earliest running process is followed live through the
//! [`LiveEntryStreamer`], retried with a fixed delay while its log endpoint is
//! not attachable yet. Every change is flattened and handed to the
//! [`EntriesSink`].
//!
//! All background work captures an [`AttemptTicket`] and re-checks it under the
//! state lock before touching the store or emitting, so nothing from a
//! previous attempt reaches the sink after [`ConversationHistory::set_attempt`]
//! returns.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use executors_protocol::ExecutionProcess;
use logs_client::PatchStreamClient;
use logs_protocol::PatchType;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    backoff::{RetryOutcome, retry_with_fixed_delay},
    cache::HistoricalEntryCache,
    config::HistoryConfig,
    directory::ExecutionProcessDirectory,
    display::DisplayEntry,
    error::HistoryError,
    guard::{AttemptGuard, AttemptTicket},
    loader::HistoricalEntryLoader,
    sink::{AddType, EntriesSink},
    store::ProcessStateStore,
    streamer::{LiveEntryStreamer, LiveStreamTarget},
    timeline,
};

pub struct ConversationHistory {
    shared: Arc<Shared>,
}

struct Shared {
    loader: HistoricalEntryLoader,
    streamer: LiveEntryStreamer,
    sink: Arc<dyn EntriesSink>,
    config: HistoryConfig,
    state: Mutex<EngineState>,
}

#[derive(Default)]
struct EngineState {
    guard: AttemptGuard,
    store: ProcessStateStore,
    /// Latest snapshot of every visible process.
    directory: HashMap<Uuid, ExecutionProcess>,
    /// Processes whose entries are final.
    settled: HashSet<Uuid>,
    /// Processes with a historical load in flight.
    loading: HashSet<Uuid>,
    initial_requested: bool,
    initial_loaded: bool,
    last_active_process: Option<Uuid>,
    live: Option<LiveStream>,
}

struct LiveStream {
    process_id: Uuid,
    task: JoinHandle<()>,
}

impl EngineState {
    fn close_live(&mut self) {
        if let Some(live) = self.live.take() {
            debug!(process_id = %live.process_id, "closing live log stream");
            live.task.abort();
        }
    }

    fn is_live(&self, process_id: Uuid) -> bool {
        self.live
            .as_ref()
            .is_some_and(|live| live.process_id == process_id)
    }

    /// Whether a finished process still needs its entries fetched.
    fn needs_historical_load(&self, process: &ExecutionProcess) -> bool {
        !process.is_running()
            && !self.settled.contains(&process.id)
            && !self.loading.contains(&process.id)
            && !self.is_live(process.id)
    }

    /// Drops everything scoped to the current attempt. The guard is left as
    /// is.
    fn reset(&mut self) {
        self.close_live();
        self.store.clear();
        self.directory.clear();
        self.settled.clear();
        self.loading.clear();
        self.initial_requested = false;
        self.initial_loaded = false;
        self.last_active_process = None;
    }
}

impl ConversationHistory {
    /// `cache` may be shared between instances; it is keyed by attempt.
    pub fn new(
        client: Arc<dyn PatchStreamClient>,
        cache: Arc<HistoricalEntryCache>,
        sink: Arc<dyn EntriesSink>,
        config: HistoryConfig,
    ) -> Result<Self, HistoryError> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                loader: HistoricalEntryLoader::new(client.clone(), cache),
                streamer: LiveEntryStreamer::new(client),
                sink,
                config,
                state: Mutex::new(EngineState::default()),
            }),
        })
    }

    /// Switches to `attempt_id`. Selecting the current attempt again is a
    /// no-op.
    pub fn set_attempt(&self, attempt_id: Uuid) {
        let mut state = self.shared.lock();
        if state.guard.current_attempt() == Some(attempt_id) {
            return;
        }
        let previous = state.guard.current_attempt();
        state.guard.begin(attempt_id);
        state.reset();
        debug!(
            attempt_id = %attempt_id,
            previous_attempt_id = ?previous,
            "conversation attempt changed"
        );
    }

    pub fn current_attempt(&self) -> Option<Uuid> {
        self.shared.lock().guard.current_attempt()
    }

    /// Feeds the current attempt's process list, as listed by the directory.
    /// Must be called from within a Tokio runtime.
    pub fn sync_processes(&self, processes: &[ExecutionProcess]) -> Result<(), HistoryError> {
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        let ticket = state.guard.current().ok_or(HistoryError::NoActiveAttempt)?;

        if let Some(foreign) = processes
            .iter()
            .find(|process| process.task_attempt_id != ticket.attempt_id())
        {
            return Err(HistoryError::ForeignProcess {
                process_id: foreign.id,
                process_attempt_id: foreign.task_attempt_id,
                attempt_id: ticket.attempt_id(),
            });
        }

        let mut visible: Vec<ExecutionProcess> = processes
            .iter()
            .filter(|process| process.is_visible_in_timeline())
            .cloned()
            .collect();
        visible.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        let visible_ids: HashSet<Uuid> = visible.iter().map(|process| process.id).collect();
        state.directory = visible
            .iter()
            .map(|process| (process.id, process.clone()))
            .collect();

        let mut changed = false;
        for process_id in state.store.retain_processes(&visible_ids) {
            debug!(process_id = %process_id, "execution process left the timeline");
            state.settled.remove(&process_id);
            if state.is_live(process_id) {
                state.close_live();
            }
            changed = true;
        }
        if let Some(active) = state.last_active_process
            && !visible_ids.contains(&active)
        {
            if state.is_live(active) {
                state.close_live();
            }
            state.last_active_process = None;
        }

        for process in &visible {
            changed |= state.store.refresh_snapshot(process);
            if process.is_running() {
                changed |= state.store.ensure_present(process);
            }
        }

        // Before picking loads: a stream closed here may leave a finished
        // process that still needs its entries.
        if let Some(active) = visible.iter().find(|process| process.is_running())
            && state.last_active_process != Some(active.id)
        {
            state.last_active_process = Some(active.id);
            self.shared.start_live(state, ticket, active.clone());
        }

        let to_load: Vec<ExecutionProcess> = visible
            .iter()
            .filter(|process| state.needs_historical_load(process))
            .cloned()
            .collect();
        state
            .loading
            .extend(to_load.iter().map(|process| process.id));

        if !state.initial_requested {
            state.initial_requested = true;
            self.shared.spawn_historical_load(ticket, to_load, true);
        } else if !to_load.is_empty() {
            self.shared.spawn_historical_load(ticket, to_load, false);
        }

        if changed && state.initial_loaded {
            self.shared.emit(state, AddType::Running);
        }
        Ok(())
    }

    pub fn sync_directory(
        &self,
        directory: &ExecutionProcessDirectory,
    ) -> Result<(), HistoryError> {
        self.sync_processes(&directory.processes())
    }

    /// The timeline as it stands, without emitting.
    pub fn entries(&self) -> Vec<DisplayEntry> {
        timeline::flatten(&self.shared.lock().store)
    }

    pub fn is_initial_loaded(&self) -> bool {
        self.shared.lock().initial_loaded
    }

    /// Detaches from the current attempt: closes the live stream and
    /// discards all pending work.
    pub fn close(&self) {
        let mut state = self.shared.lock();
        state.guard.reset();
        state.reset();
    }
}

impl Drop for ConversationHistory {
    fn drop(&mut self) {
        self.close();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn is_current(&self, ticket: &AttemptTicket) -> bool {
        self.lock().guard.is_current(ticket)
    }

    fn emit(&self, state: &EngineState, add_type: AddType) {
        let entries = timeline::flatten(&state.store);
        let loading = !state.initial_loaded;
        tracing::trace!(count = entries.len(), ?add_type, loading, "emitting entries");
        self.sink.on_entries_updated(entries, add_type, loading);
    }

    fn spawn_historical_load(
        self: &Arc<Self>,
        ticket: AttemptTicket,
        processes: Vec<ExecutionProcess>,
        initial: bool,
    ) {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let loaded = shared
                .loader
                .load_all(ticket.attempt_id(), processes)
                .await;
            shared.finish_historical_load(ticket, loaded, initial);
        });
    }

    fn finish_historical_load(
        &self,
        ticket: AttemptTicket,
        loaded: Vec<(ExecutionProcess, Vec<PatchType>)>,
        initial: bool,
    ) {
        let mut guard = self.lock();
        let state = &mut *guard;
        if !state.guard.is_current(&ticket) {
            debug!(
                attempt_id = %ticket.attempt_id(),
                "discarding historical entries of a superseded attempt"
            );
            return;
        }

        for (process, entries) in loaded {
            state.loading.remove(&process.id);
            let Some(snapshot) = state.directory.get(&process.id).cloned() else {
                continue;
            };
            state.settled.insert(snapshot.id);
            state.store.set_process_state(snapshot, entries);
        }

        if initial {
            state.initial_loaded = true;
            self.emit(state, AddType::Initial);
        } else if state.initial_loaded {
            self.emit(state, AddType::Running);
        }
    }

    /// Replaces the open live stream, if any, with one following `process`.
    fn start_live(
        self: &Arc<Self>,
        state: &mut EngineState,
        ticket: AttemptTicket,
        process: ExecutionProcess,
    ) {
        state.close_live();
        let process_id = process.id;
        let shared = Arc::clone(self);
        let task = tokio::spawn(async move { shared.run_live(ticket, process).await });
        state.live = Some(LiveStream { process_id, task });
    }

    async fn run_live(self: Arc<Self>, ticket: AttemptTicket, process: ExecutionProcess) {
        let session = LiveSession {
            shared: &*self,
            ticket,
        };
        let (streamer, target, live_process) = (&self.streamer, &session, &process);
        let outcome = retry_with_fixed_delay(
            &self.config.stream_retry,
            || self.is_current(&ticket),
            move |_| streamer.stream(live_process, target),
        )
        .await;

        match outcome {
            RetryOutcome::Completed { attempt } => {
                debug!(process_id = %process.id, attempt, "live log stream ended")
            }
            RetryOutcome::Superseded => {
                debug!(process_id = %process.id, "live log stream superseded")
            }
            RetryOutcome::Exhausted { attempts } => warn!(
                process_id = %process.id,
                attempts,
                "giving up on live log stream"
            ),
        }

        self.release_live(ticket, process.id);
    }

    fn release_live(self: &Arc<Self>, ticket: AttemptTicket, process_id: Uuid) {
        let mut guard = self.lock();
        let state = &mut *guard;
        if !state.guard.is_current(&ticket) {
            return;
        }
        if state.is_live(process_id) {
            state.live = None;
        }

        // An abandoned stream leaves a finished process without entries.
        if let Some(process) = state.directory.get(&process_id).cloned()
            && state.needs_historical_load(&process)
        {
            state.loading.insert(process_id);
            self.spawn_historical_load(ticket, vec![process], false);
        }
    }
}

struct LiveSession<'a> {
    shared: &'a Shared,
    ticket: AttemptTicket,
}

impl LiveStreamTarget for LiveSession<'_> {
    fn apply_entries(
        &self,
        process: &ExecutionProcess,
        entries: Vec<PatchType>,
        finished: bool,
    ) -> bool {
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        if !state.guard.is_current(&self.ticket) {
            debug!(process_id = %process.id, "discarding live entries of a superseded attempt");
            return false;
        }
        let Some(snapshot) = state.directory.get(&process.id).cloned() else {
            debug!(process_id = %process.id, "discarding live entries of a removed process");
            return false;
        };

        state.store.set_process_state(snapshot, entries);
        if finished {
            state.settled.insert(process.id);
        }
        self.shared.emit(state, AddType::Running);
        true
    }
}
