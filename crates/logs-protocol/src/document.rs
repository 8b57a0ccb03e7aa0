use json_patch::{Patch, PatchOperation};
use serde_json::{Value, json};

use crate::{ProtocolError, patch::PatchType};

/// Where an operation lands inside the entries document.
enum EntryTarget {
    All,
    Index(usize),
    End,
}

fn entry_target(path: &str) -> Option<EntryTarget> {
    let rest = path.strip_prefix("/entries")?;
    if rest.is_empty() {
        return Some(EntryTarget::All);
    }
    match rest.strip_prefix('/')? {
        "-" => Some(EntryTarget::End),
        index => index.parse().ok().map(EntryTarget::Index),
    }
}

/// Client-side view of one process's log channel: the entry list that the
/// stream's `{"entries": [...]}` JSON patches are applied to.
///
/// Add, replace and remove under `/entries` are applied to the typed list
/// directly; anything else goes through a generic JSON patch of the whole
/// document.
#[derive(Debug, Clone, Default)]
pub struct EntriesDocument {
    entries: Vec<PatchType>,
}

impl EntriesDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a patch atomically; on error the document is left unchanged.
    pub fn apply(&mut self, patch: &Patch) -> Result<(), ProtocolError> {
        match patch.0.as_slice() {
            [] => Ok(()),
            [operation] => apply_operation(&mut self.entries, operation),
            operations => {
                let mut entries = self.entries.clone();
                for operation in operations {
                    apply_operation(&mut entries, operation)?;
                }
                self.entries = entries;
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current entries in document order.
    pub fn entries(&self) -> &[PatchType] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<PatchType> {
        self.entries
    }
}

fn out_of_range(path: String, len: usize) -> ProtocolError {
    ProtocolError::OutOfRange { path, len }
}

/// Validates before mutating, so a failed operation leaves `entries` as it was.
fn apply_operation(
    entries: &mut Vec<PatchType>,
    operation: &PatchOperation,
) -> Result<(), ProtocolError> {
    let path = operation.path().to_string();
    let Some(target) = entry_target(&path) else {
        return apply_generic(entries, operation);
    };

    match (operation, target) {
        (PatchOperation::Add(op), EntryTarget::End) => {
            entries.push(serde_json::from_value(op.value.clone())?);
        }
        (PatchOperation::Add(op), EntryTarget::Index(index)) => {
            if index > entries.len() {
                return Err(out_of_range(path, entries.len()));
            }
            entries.insert(index, serde_json::from_value(op.value.clone())?);
        }
        (PatchOperation::Replace(op), EntryTarget::Index(index)) => {
            if index >= entries.len() {
                return Err(out_of_range(path, entries.len()));
            }
            entries[index] = serde_json::from_value(op.value.clone())?;
        }
        (PatchOperation::Remove(_), EntryTarget::Index(index)) => {
            if index >= entries.len() {
                return Err(out_of_range(path, entries.len()));
            }
            entries.remove(index);
        }
        (PatchOperation::Add(op), EntryTarget::All) => {
            *entries = serde_json::from_value(op.value.clone())?;
        }
        (PatchOperation::Replace(op), EntryTarget::All) => {
            *entries = serde_json::from_value(op.value.clone())?;
        }
        _ => return apply_generic(entries, operation),
    }
    Ok(())
}

/// Fallback for operations the typed path does not cover (move, copy, test,
/// or paths outside the entry list).
fn apply_generic(
    entries: &mut Vec<PatchType>,
    operation: &PatchOperation,
) -> Result<(), ProtocolError> {
    let mut doc = json!({ "entries": serde_json::to_value(&*entries)? });
    json_patch::patch(&mut doc, std::slice::from_ref(operation))?;
    let Value::Object(mut map) = doc else {
        return Err(ProtocolError::MissingEntries);
    };
    let next = map.remove("entries").ok_or(ProtocolError::MissingEntries)?;
    *entries = serde_json::from_value(next)?;
    Ok(())
}
