#![allow(dead_code)]

use std::{io, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use conversation::{
    AddType, ChannelSink, ConversationHistory, EntriesUpdate, HistoricalEntryCache,
    HistoryConfig,
};
use dashmap::DashMap;
use executors_protocol::{
    CodingAgentFollowUpRequest, CodingAgentInitialRequest, ExecutionProcess,
    ExecutionProcessRunReason, ExecutionProcessStatus, ExecutorAction, ExecutorActionType,
    ExecutorProfileId, NormalizedEntry, NormalizedEntryError, NormalizedEntryType,
    ScriptContext, ScriptRequest, ScriptRequestLanguage,
};
use logs_client::{MsgStoreClient, PatchStream, PatchStreamClient, StreamEndpoint, StreamError};
use logs_protocol::{ConversationPatch, PatchType};
use logs_store::MsgStore;
use tokio::sync::mpsc::{UnboundedReceiver, error::TryRecvError};
use uuid::Uuid;

/// `MsgStoreClient` with scripted connect failures and delays, counting every
/// open.
#[derive(Default)]
pub struct FakeClient {
    stores: MsgStoreClient,
    failures: DashMap<Uuid, u32>,
    delays: DashMap<Uuid, Duration>,
    opens: DashMap<Uuid, u32>,
    successes: DashMap<Uuid, u32>,
}

impl FakeClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, process_id: Uuid, store: Arc<MsgStore>) {
        self.stores.register(process_id, store);
    }

    /// The next `count` opens for the process fail before connecting.
    pub fn fail_next(&self, process_id: Uuid, count: u32) {
        self.failures.insert(process_id, count);
    }

    pub fn delay_opens(&self, process_id: Uuid, delay: Duration) {
        self.delays.insert(process_id, delay);
    }

    pub fn opens(&self, process_id: Uuid) -> u32 {
        self.opens.get(&process_id).map_or(0, |count| *count)
    }

    pub fn successful_opens(&self, process_id: Uuid) -> u32 {
        self.successes.get(&process_id).map_or(0, |count| *count)
    }

    fn take_failure(&self, process_id: Uuid) -> bool {
        match self.failures.get_mut(&process_id) {
            Some(mut remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

impl FakeClient {
    /// Counts the open, applies the scripted delay, then the scripted failure.
    async fn admit(&self, process_id: Uuid) -> Result<(), StreamError> {
        *self.opens.entry(process_id).or_insert(0) += 1;

        let delay = self.delays.get(&process_id).map(|delay| *delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.take_failure(process_id) {
            return Err(StreamError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "log endpoint not attachable yet",
            )));
        }
        Ok(())
    }

    fn opened(&self, process_id: Uuid, stream: PatchStream) -> PatchStream {
        *self.successes.entry(process_id).or_insert(0) += 1;
        stream
    }
}

#[async_trait]
impl PatchStreamClient for FakeClient {
    async fn open(&self, endpoint: &StreamEndpoint) -> Result<PatchStream, StreamError> {
        self.admit(endpoint.process_id).await?;
        let stream = self.stores.open(endpoint).await?;
        Ok(self.opened(endpoint.process_id, stream))
    }

    async fn open_history(&self, endpoint: &StreamEndpoint) -> Result<PatchStream, StreamError> {
        self.admit(endpoint.process_id).await?;
        let stream = self.stores.open_history(endpoint).await?;
        Ok(self.opened(endpoint.process_id, stream))
    }
}

pub struct Harness {
    pub client: Arc<FakeClient>,
    pub cache: Arc<HistoricalEntryCache>,
    pub history: ConversationHistory,
    pub updates: UnboundedReceiver<EntriesUpdate>,
}

impl Harness {
    pub fn new() -> Self {
        let client = FakeClient::new();
        let cache = Arc::new(HistoricalEntryCache::new());
        let (sink, updates) = ChannelSink::new();
        let history = ConversationHistory::new(
            client.clone(),
            cache.clone(),
            Arc::new(sink),
            HistoryConfig::default(),
        )
        .expect("default config is valid");
        Self {
            client,
            cache,
            history,
            updates,
        }
    }

    /// Receives updates until one satisfies `done`, returning all of them.
    pub async fn wait_for<F>(&mut self, mut done: F) -> Vec<EntriesUpdate>
    where
        F: FnMut(&EntriesUpdate) -> bool,
    {
        let mut seen = Vec::new();
        loop {
            let update = tokio::time::timeout(Duration::from_secs(60), self.updates.recv())
                .await
                .expect("timed out waiting for entries")
                .expect("sink closed");
            let finished = done(&update);
            seen.push(update);
            if finished {
                return seen;
            }
        }
    }

    pub async fn wait_for_initial(&mut self) -> EntriesUpdate {
        let seen = self
            .wait_for(|update| update.add_type == AddType::Initial)
            .await;
        seen.into_iter().last().expect("at least one update")
    }

    pub async fn wait_for_keys(&mut self, expected: &[String]) -> Vec<EntriesUpdate> {
        self.wait_for(|update| keys(update) == expected).await
    }

    /// Updates already queued, without waiting.
    pub fn drain(&mut self) -> Vec<EntriesUpdate> {
        let mut drained = Vec::new();
        loop {
            match self.updates.try_recv() {
                Ok(update) => drained.push(update),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return drained,
            }
        }
    }
}

pub fn keys(update: &EntriesUpdate) -> Vec<String> {
    update.entries.iter().map(|e| e.key.to_string()).collect()
}

pub fn at(offset_secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + offset_secs, 0)
        .single()
        .expect("valid timestamp")
}

fn profile() -> ExecutorProfileId {
    ExecutorProfileId {
        executor: "CLAUDE_CODE".to_string(),
        variant: None,
    }
}

fn process(
    attempt_id: Uuid,
    offset_secs: i64,
    status: ExecutionProcessStatus,
    run_reason: ExecutionProcessRunReason,
    typ: ExecutorActionType,
) -> ExecutionProcess {
    let exit_code = match status {
        ExecutionProcessStatus::Running => None,
        ExecutionProcessStatus::Completed => Some(0),
        ExecutionProcessStatus::Failed | ExecutionProcessStatus::Killed => Some(1),
    };
    ExecutionProcess {
        id: Uuid::new_v4(),
        task_attempt_id: attempt_id,
        run_reason,
        executor_action: ExecutorAction::new(typ, None),
        status,
        exit_code,
        dropped: false,
        started_at: at(offset_secs),
        completed_at: (!status.is_running()).then(|| at(offset_secs + 1)),
        created_at: at(offset_secs),
        updated_at: at(offset_secs),
    }
}

pub fn agent(attempt_id: Uuid, offset_secs: i64, status: ExecutionProcessStatus) -> ExecutionProcess {
    process(
        attempt_id,
        offset_secs,
        status,
        ExecutionProcessRunReason::CodingAgent,
        ExecutorActionType::CodingAgentInitialRequest(CodingAgentInitialRequest {
            prompt: format!("task prompt {offset_secs}"),
            executor_profile_id: profile(),
        }),
    )
}

pub fn follow_up(
    attempt_id: Uuid,
    offset_secs: i64,
    status: ExecutionProcessStatus,
) -> ExecutionProcess {
    process(
        attempt_id,
        offset_secs,
        status,
        ExecutionProcessRunReason::CodingAgent,
        ExecutorActionType::CodingAgentFollowUpRequest(CodingAgentFollowUpRequest {
            prompt: format!("follow up {offset_secs}"),
            session_id: "session-1".to_string(),
            executor_profile_id: profile(),
        }),
    )
}

pub fn script(
    attempt_id: Uuid,
    offset_secs: i64,
    status: ExecutionProcessStatus,
    context: ScriptContext,
) -> ExecutionProcess {
    let run_reason = match context {
        ScriptContext::CleanupScript => ExecutionProcessRunReason::CleanupScript,
        ScriptContext::DevServer => ExecutionProcessRunReason::DevServer,
        _ => ExecutionProcessRunReason::SetupScript,
    };
    process(
        attempt_id,
        offset_secs,
        status,
        run_reason,
        ExecutorActionType::ScriptRequest(ScriptRequest {
            script: "npm ci".to_string(),
            language: ScriptRequestLanguage::Bash,
            context,
        }),
    )
}

pub fn assistant(text: &str) -> NormalizedEntry {
    NormalizedEntry::new(NormalizedEntryType::AssistantMessage, text)
}

pub fn setup_required(text: &str) -> NormalizedEntry {
    NormalizedEntry::new(
        NormalizedEntryType::ErrorMessage {
            error_type: NormalizedEntryError::SetupRequired,
        },
        text,
    )
}

/// A normalized log with the given entries, optionally finished.
pub fn agent_store(entries: Vec<NormalizedEntry>, finished: bool) -> Arc<MsgStore> {
    let store = Arc::new(MsgStore::new());
    for (index, entry) in entries.into_iter().enumerate() {
        store.push_patch(ConversationPatch::add_normalized_entry(index, entry));
    }
    if finished {
        store.push_finished();
    }
    store
}

pub fn script_store(lines: &[&str], finished: bool) -> Arc<MsgStore> {
    let store = Arc::new(MsgStore::new());
    for line in lines {
        store.push_stdout(*line);
    }
    if finished {
        store.push_finished();
    }
    store
}

pub fn normalized(entry: NormalizedEntry) -> PatchType {
    PatchType::NormalizedEntry(entry)
}
