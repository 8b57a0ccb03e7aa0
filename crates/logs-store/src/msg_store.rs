use std::{
    collections::VecDeque,
    sync::{
        Arc, OnceLock, RwLock,
        atomic::{AtomicUsize, Ordering},
    },
};

use futures::{StreamExt, future};
use json_patch::Patch;
use logs_protocol::{ConversationPatch, LogEntryChannel, LogMsg};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

const DEFAULT_HISTORY_MAX_BYTES: usize = 8 * 1024 * 1024;
const DEFAULT_HISTORY_MAX_ENTRIES: usize = 5000;
const CHANNEL_CAPACITY: usize = 10000;

const ENV_HISTORY_MAX_BYTES: &str = "VK_LOG_HISTORY_MAX_BYTES";
const ENV_HISTORY_MAX_ENTRIES: &str = "VK_LOG_HISTORY_MAX_ENTRIES";

/// Replay bounds of a [`MsgStore`]. The oldest messages are evicted first;
/// live subscribers are unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLimits {
    pub max_bytes: usize,
    pub max_entries: usize,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_HISTORY_MAX_BYTES,
            max_entries: DEFAULT_HISTORY_MAX_ENTRIES,
        }
    }
}

impl HistoryLimits {
    /// Read once per process and shared by every store.
    pub fn from_env() -> Self {
        static LIMITS: OnceLock<HistoryLimits> = OnceLock::new();
        *LIMITS.get_or_init(|| Self::from_env_with(|name| std::env::var(name).ok()))
    }

    fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let limit = |name: &str, default: usize| {
            let value = match get_env(name).map(|raw| (raw.parse::<usize>(), raw)) {
                Some((Ok(parsed), _)) => parsed,
                Some((Err(err), raw)) => {
                    tracing::warn!("Invalid {name}='{raw}': {err}. Using default {default}.");
                    default
                }
                None => default,
            };
            if value == 0 {
                tracing::warn!("{name} set to 0. Using minimum value 1 instead.");
                1
            } else {
                value
            }
        };

        Self {
            max_bytes: limit(ENV_HISTORY_MAX_BYTES, DEFAULT_HISTORY_MAX_BYTES),
            max_entries: limit(ENV_HISTORY_MAX_ENTRIES, DEFAULT_HISTORY_MAX_ENTRIES),
        }
    }
}

struct StoredMsg {
    msg: LogMsg,
    bytes: usize,
}

struct Inner {
    limits: HistoryLimits,
    history: VecDeque<StoredMsg>,
    total_bytes: usize,
    finished: bool,
}

/// Log messages of one execution process: bounded history plus a live
/// broadcast, replayed to every subscriber as history-then-live.
pub struct MsgStore {
    inner: RwLock<Inner>,
    sender: broadcast::Sender<LogMsg>,
}

impl Default for MsgStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MsgStore {
    pub fn new() -> Self {
        Self::with_limits(HistoryLimits::from_env())
    }

    pub fn with_limits(limits: HistoryLimits) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: RwLock::new(Inner {
                limits,
                history: VecDeque::new(),
                total_bytes: 0,
                finished: false,
            }),
            sender,
        }
    }

    pub fn push(&self, msg: LogMsg) {
        let bytes = msg.approx_bytes();
        // History and broadcast are updated under one write lock so a
        // subscriber taking history + receiver sees no gap or duplicate.
        let mut inner = self.inner.write().unwrap_or_else(|err| err.into_inner());
        if inner.finished {
            tracing::debug!(msg = msg.name(), "ignoring log message after finish");
            return;
        }
        if matches!(msg, LogMsg::Finished) {
            inner.finished = true;
        }
        inner.record(msg.clone(), bytes);
        let _ = self.sender.send(msg);
    }

    pub fn push_stdout<S: Into<String>>(&self, s: S) {
        self.push(LogMsg::Stdout(s.into()));
    }

    pub fn push_stderr<S: Into<String>>(&self, s: S) {
        self.push(LogMsg::Stderr(s.into()));
    }

    pub fn push_patch(&self, patch: Patch) {
        self.push(LogMsg::JsonPatch(patch));
    }

    pub fn push_session_id(&self, session_id: String) {
        self.push(LogMsg::SessionId(session_id));
    }

    pub fn push_finished(&self) {
        self.push(LogMsg::Finished);
    }

    pub fn is_finished(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .finished
    }

    pub fn get_history(&self) -> Vec<LogMsg> {
        self.inner
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .history
            .iter()
            .map(|s| s.msg.clone())
            .collect()
    }

    /// History then live, as `LogMsg`. Ends after `Finished`.
    pub fn history_plus_stream(
        &self,
    ) -> futures::stream::BoxStream<'static, Result<LogMsg, std::io::Error>> {
        let (history, rx, finished) = {
            let inner = self.inner.read().unwrap_or_else(|err| err.into_inner());
            let history: Vec<LogMsg> = inner.history.iter().map(|s| s.msg.clone()).collect();
            (history, self.sender.subscribe(), inner.finished)
        };

        let hist = futures::stream::iter(history.into_iter().map(Ok::<_, std::io::Error>));
        if finished {
            return Box::pin(hist);
        }

        let live = BroadcastStream::new(rx).filter_map(|res| async move {
            match res {
                Ok(msg) => Some(Ok::<_, std::io::Error>(msg)),
                Err(err) => {
                    tracing::warn!(error = %err, "log subscriber lagged");
                    None
                }
            }
        });
        Box::pin(until_finished(hist.chain(live).boxed()))
    }

    /// The stream a log endpoint serves for `channel`: raw lines become
    /// `/entries/{n}` add patches, normalized patches pass through as-is.
    /// Either way the stream ends with `Finished` once the process is done.
    pub fn patch_stream(
        &self,
        channel: LogEntryChannel,
    ) -> futures::stream::BoxStream<'static, Result<LogMsg, std::io::Error>> {
        let messages = self.history_plus_stream();
        match channel {
            LogEntryChannel::Raw => {
                let counter = Arc::new(AtomicUsize::new(0));
                messages
                    .filter_map(move |res| {
                        let counter = counter.clone();
                        async move {
                            match res {
                                Ok(LogMsg::Stdout(content)) => {
                                    let index = counter.fetch_add(1, Ordering::SeqCst);
                                    Some(Ok(LogMsg::JsonPatch(ConversationPatch::add_stdout(
                                        index, content,
                                    ))))
                                }
                                Ok(LogMsg::Stderr(content)) => {
                                    let index = counter.fetch_add(1, Ordering::SeqCst);
                                    Some(Ok(LogMsg::JsonPatch(ConversationPatch::add_stderr(
                                        index, content,
                                    ))))
                                }
                                Ok(LogMsg::Finished) => Some(Ok(LogMsg::Finished)),
                                Ok(_) => None,
                                Err(err) => Some(Err(err)),
                            }
                        }
                    })
                    .boxed()
            }
            LogEntryChannel::Normalized => messages
                .filter(|res| {
                    future::ready(matches!(
                        res,
                        Ok(LogMsg::JsonPatch(_)) | Ok(LogMsg::Finished) | Err(_)
                    ))
                })
                .boxed(),
        }
    }
}

/// Ends the stream right after `Finished` without waiting for another item.
fn until_finished<S>(stream: S) -> impl futures::Stream<Item = Result<LogMsg, std::io::Error>>
where
    S: futures::Stream<Item = Result<LogMsg, std::io::Error>> + Send + Unpin + 'static,
{
    futures::stream::unfold((stream, false), |(mut stream, done)| async move {
        if done {
            return None;
        }
        let item = stream.next().await?;
        let done = matches!(item, Ok(LogMsg::Finished));
        Some((item, (stream, done)))
    })
}

impl Inner {
    fn record(&mut self, msg: LogMsg, bytes: usize) {
        let HistoryLimits {
            max_bytes,
            max_entries,
        } = self.limits;
        while !self.history.is_empty()
            && (self.history.len() >= max_entries || self.total_bytes + bytes > max_bytes)
        {
            if let Some(evicted) = self.history.pop_front() {
                self.total_bytes -= evicted.bytes;
            }
        }
        self.total_bytes += bytes;
        self.history.push_back(StoredMsg { msg, bytes });
    }
}
