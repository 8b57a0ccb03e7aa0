//! Attempt-scoped map of process id to the process snapshot and its keyed
//! entries.

use std::collections::{HashMap, HashSet};

use executors_protocol::ExecutionProcess;
use logs_protocol::PatchType;
use uuid::Uuid;

use crate::display::DisplayEntry;

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessState {
    pub process: ExecutionProcess,
    pub entries: Vec<DisplayEntry>,
}

#[derive(Debug, Default)]
pub struct ProcessStateStore {
    states: HashMap<Uuid, ProcessState>,
}

impl ProcessStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the full entry list for a process. Last write wins.
    pub fn set_process_state(&mut self, process: ExecutionProcess, entries: Vec<PatchType>) {
        let entries = DisplayEntry::indexed(process.id, entries);
        self.states
            .insert(process.id, ProcessState { process, entries });
    }

    /// Inserts the process with no entries unless it is already present.
    /// Returns whether anything was inserted.
    pub fn ensure_present(&mut self, process: &ExecutionProcess) -> bool {
        if self.states.contains_key(&process.id) {
            return false;
        }
        self.states.insert(
            process.id,
            ProcessState {
                process: process.clone(),
                entries: Vec::new(),
            },
        );
        true
    }

    /// Swaps in a newer snapshot of an already present process, keeping its
    /// entries. Returns whether the snapshot changed.
    pub fn refresh_snapshot(&mut self, process: &ExecutionProcess) -> bool {
        match self.states.get_mut(&process.id) {
            Some(state) if state.process != *process => {
                state.process = process.clone();
                true
            }
            _ => false,
        }
    }

    /// Drops every process not in `keep`, returning the removed ids.
    pub fn retain_processes(&mut self, keep: &HashSet<Uuid>) -> Vec<Uuid> {
        let removed: Vec<Uuid> = self
            .states
            .keys()
            .filter(|id| !keep.contains(id))
            .copied()
            .collect();
        for id in &removed {
            self.states.remove(id);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    pub fn get(&self, process_id: &Uuid) -> Option<&ProcessState> {
        self.states.get(process_id)
    }

    pub fn contains(&self, process_id: &Uuid) -> bool {
        self.states.contains_key(process_id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// States ordered by creation time, ties broken by id.
    pub fn ordered(&self) -> Vec<&ProcessState> {
        let mut states: Vec<&ProcessState> = self.states.values().collect();
        states.sort_by(|a, b| {
            a.process
                .created_at
                .cmp(&b.process.created_at)
                .then_with(|| a.process.id.cmp(&b.process.id))
        });
        states
    }
}
