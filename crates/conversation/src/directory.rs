use executors_protocol::ExecutionProcess;
use json_patch::Patch;
use logs_protocol::{LogMsg, ProtocolError};
use serde_json::{Value, json};
use tracing::debug;

/// Client-side mirror of an attempt's execution process stream: a JSON
/// document `{"execution_processes": {<id>: <process>}}` kept current by the
/// patches the server sends.
#[derive(Debug, Clone)]
pub struct ExecutionProcessDirectory {
    document: Value,
}

impl Default for ExecutionProcessDirectory {
    fn default() -> Self {
        Self {
            document: json!({ "execution_processes": {} }),
        }
    }
}

impl ExecutionProcessDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a message from the directory stream. Returns whether the
    /// document changed; non-patch messages are ignored.
    pub fn apply(&mut self, msg: &LogMsg) -> Result<bool, ProtocolError> {
        match msg {
            LogMsg::JsonPatch(patch) => {
                self.apply_patch(patch)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// All-or-nothing: a failing operation leaves the document untouched.
    pub fn apply_patch(&mut self, patch: &Patch) -> Result<(), ProtocolError> {
        json_patch::patch(&mut self.document, patch)?;
        Ok(())
    }

    /// Every listed process, by creation time then id. Records that do not
    /// parse are skipped.
    pub fn processes(&self) -> Vec<ExecutionProcess> {
        let Some(map) = self.document["execution_processes"].as_object() else {
            return Vec::new();
        };
        let mut processes: Vec<ExecutionProcess> = map
            .iter()
            .filter_map(|(id, value)| {
                serde_json::from_value(value.clone())
                    .inspect_err(|err| {
                        debug!(process_id = %id, error = %err, "skipping unreadable process record")
                    })
                    .ok()
            })
            .collect();
        processes.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        processes
    }

    /// Processes that belong in the conversation timeline.
    pub fn visible_processes(&self) -> Vec<ExecutionProcess> {
        self.processes()
            .into_iter()
            .filter(ExecutionProcess::is_visible_in_timeline)
            .collect()
    }

    pub fn has_running(&self) -> bool {
        self.visible_processes().iter().any(ExecutionProcess::is_running)
    }

    pub fn len(&self) -> usize {
        self.document["execution_processes"]
            .as_object()
            .map_or(0, |map| map.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
