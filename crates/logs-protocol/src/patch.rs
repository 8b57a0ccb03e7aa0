use executors_protocol::NormalizedEntry;
use json_patch::Patch;
use serde::{Deserialize, Serialize};
use serde_json::{from_value, json};
use ts_rs::TS;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(rename_all = "lowercase")]
enum PatchOperation {
    Add,
    Replace,
    Remove,
}

/// One entry of a process log: a raw output line or a structured agent event.
#[allow(clippy::large_enum_variant)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "type", content = "content")]
pub enum PatchType {
    NormalizedEntry(NormalizedEntry),
    Stdout(String),
    Stderr(String),
}

impl PatchType {
    pub fn as_normalized(&self) -> Option<&NormalizedEntry> {
        match self {
            PatchType::NormalizedEntry(entry) => Some(entry),
            _ => None,
        }
    }

    /// Raw output line, for stdout and stderr entries.
    pub fn as_raw_line(&self) -> Option<&str> {
        match self {
            PatchType::Stdout(line) | PatchType::Stderr(line) => Some(line),
            PatchType::NormalizedEntry(_) => None,
        }
    }
}

#[derive(Serialize)]
struct PatchEntry {
    op: PatchOperation,
    path: String,
    value: PatchType,
}

pub fn escape_json_pointer_segment(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

fn entry_patch(op: PatchOperation, entry_index: usize, value: PatchType) -> Patch {
    let patch_entry = PatchEntry {
        op,
        path: format!("/entries/{entry_index}"),
        value,
    };

    from_value(json!([patch_entry])).expect("conversation patch is a valid JSON patch")
}

/// Helper functions to create JSON patches for conversation entries
pub struct ConversationPatch;

impl ConversationPatch {
    /// Create an ADD patch for a new conversation entry at the given index
    pub fn add_normalized_entry(entry_index: usize, entry: NormalizedEntry) -> Patch {
        entry_patch(
            PatchOperation::Add,
            entry_index,
            PatchType::NormalizedEntry(entry),
        )
    }

    /// Create an ADD patch for a new stdout line at the given index
    pub fn add_stdout(entry_index: usize, entry: String) -> Patch {
        entry_patch(PatchOperation::Add, entry_index, PatchType::Stdout(entry))
    }

    /// Create an ADD patch for a new stderr line at the given index
    pub fn add_stderr(entry_index: usize, entry: String) -> Patch {
        entry_patch(PatchOperation::Add, entry_index, PatchType::Stderr(entry))
    }

    /// Create a REPLACE patch for updating an existing conversation entry at the given index
    pub fn replace(entry_index: usize, entry: NormalizedEntry) -> Patch {
        entry_patch(
            PatchOperation::Replace,
            entry_index,
            PatchType::NormalizedEntry(entry),
        )
    }

    pub fn remove(entry_index: usize) -> Patch {
        from_value(json!([{
            "op": PatchOperation::Remove,
            "path": format!("/entries/{entry_index}"),
        }]))
        .expect("conversation patch is a valid JSON patch")
    }
}

/// Patches for the per-attempt execution process directory document
/// (`{"execution_processes": {<id>: <process>}}`).
pub mod execution_process_patch {
    use executors_protocol::ExecutionProcess;
    use json_patch::Patch;
    use serde_json::{Map, Value, from_value, json};
    use uuid::Uuid;

    use super::escape_json_pointer_segment;

    fn process_path(process_id: Uuid) -> String {
        format!(
            "/execution_processes/{}",
            escape_json_pointer_segment(&process_id.to_string())
        )
    }

    fn single_op(op: &str, path: String, value: Option<Value>) -> Patch {
        let mut operation = json!({ "op": op, "path": path });
        if let Some(value) = value {
            operation["value"] = value;
        }
        from_value(json!([operation])).expect("directory patch is a valid JSON patch")
    }

    fn to_value(process: &ExecutionProcess) -> Value {
        serde_json::to_value(process).unwrap_or(Value::Null)
    }

    /// Initial snapshot: replaces the whole map.
    pub fn snapshot(processes: &[ExecutionProcess]) -> Patch {
        let map: Map<String, Value> = processes
            .iter()
            .map(|process| (process.id.to_string(), to_value(process)))
            .collect();
        single_op(
            "replace",
            "/execution_processes".to_string(),
            Some(Value::Object(map)),
        )
    }

    pub fn add(process: &ExecutionProcess) -> Patch {
        single_op("add", process_path(process.id), Some(to_value(process)))
    }

    pub fn replace(process: &ExecutionProcess) -> Patch {
        single_op("replace", process_path(process.id), Some(to_value(process)))
    }

    pub fn remove(process_id: Uuid) -> Patch {
        single_op("remove", process_path(process_id), None)
    }
}
