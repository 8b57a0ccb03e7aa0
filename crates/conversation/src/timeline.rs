//! Folds the process state store into the single ordered list the consumer
//! renders.
//!
//! Processes appear in creation order. A coding agent run starts with its
//! prompt and ends with a loading row while it is still running. A script run
//! collapses into one command tool row. When nothing is running and nothing
//! waits for approval, a `next_action` row closes the list.

use executors_protocol::{
    ActionType, CommandExitStatus, CommandRunResult, NormalizedEntry, NormalizedEntryType,
    ScriptRequest, ToolStatus,
};
use logs_protocol::PatchType;

use crate::{
    display::{DisplayEntry, EntryKey},
    store::{ProcessState, ProcessStateStore},
};

pub fn flatten(store: &ProcessStateStore) -> Vec<DisplayEntry> {
    let states = store.ordered();
    let mut entries = Vec::new();
    let mut any_running = false;
    let mut any_pending_approval = false;

    for state in &states {
        any_running |= state.process.is_running();
        match state.process.executor_action.script() {
            Some(script) => push_script_entry(&mut entries, state, script),
            None => any_pending_approval |= push_agent_entries(&mut entries, state),
        }
    }

    if !any_running && !any_pending_approval {
        entries.push(next_action_entry(states.last().copied(), states.len()));
    }

    entries
}

/// Returns whether any of the process's entries awaits approval.
fn push_agent_entries(out: &mut Vec<DisplayEntry>, state: &ProcessState) -> bool {
    let process_id = state.process.id;

    if let Some(prompt) = state.process.executor_action.prompt() {
        out.push(DisplayEntry::new(
            EntryKey::User(process_id),
            PatchType::NormalizedEntry(NormalizedEntry::new(
                NormalizedEntryType::UserMessage,
                prompt,
            )),
        ));
    }

    let mut pending_approval = false;
    for entry in &state.entries {
        if let Some(normalized) = entry.entry.as_normalized() {
            // The prompt row above is authoritative; agents echo it back.
            if normalized.is_user_message() {
                continue;
            }
            pending_approval |= normalized.is_pending_approval();
        }
        out.push(entry.clone());
    }

    if state.process.is_running() && !pending_approval {
        out.push(DisplayEntry::new(
            EntryKey::Loading(process_id),
            PatchType::NormalizedEntry(NormalizedEntry::new(NormalizedEntryType::Loading, "")),
        ));
    }

    pending_approval
}

fn push_script_entry(out: &mut Vec<DisplayEntry>, state: &ProcessState, script: &ScriptRequest) {
    let Some(label) = script.context.tool_label() else {
        return;
    };
    let process = &state.process;

    let output = state
        .entries
        .iter()
        .filter_map(|entry| entry.entry.as_raw_line())
        .collect::<Vec<_>>()
        .join("\n");

    let status = if process.is_running() {
        ToolStatus::Created
    } else if process.exit_code == Some(0) {
        ToolStatus::Success
    } else {
        ToolStatus::Failed
    };

    let exit_status = process
        .exit_code
        .and_then(|code| i32::try_from(code).ok())
        .map(|code| CommandExitStatus::ExitCode { code });

    let entry = NormalizedEntry::new(
        NormalizedEntryType::ToolUse {
            tool_name: label.to_string(),
            action_type: ActionType::CommandRun {
                command: script.script.clone(),
                result: Some(CommandRunResult {
                    exit_status,
                    output: Some(output),
                }),
            },
            status,
        },
        label,
    );

    out.push(DisplayEntry::new(
        EntryKey::Indexed {
            process_id: process.id,
            index: 0,
        },
        PatchType::NormalizedEntry(entry),
    ));
}

fn next_action_entry(last: Option<&ProcessState>, process_count: usize) -> DisplayEntry {
    let failed = last.is_some_and(|state| state.process.status.is_failed_or_killed());
    let setup_error = last.filter(|_| failed).and_then(|state| {
        state
            .entries
            .iter()
            .filter_map(|entry| entry.entry.as_normalized())
            .find(|entry| entry.is_setup_required_error())
    });

    DisplayEntry::new(
        EntryKey::NextAction,
        PatchType::NormalizedEntry(NormalizedEntry::new(
            NormalizedEntryType::NextAction {
                failed,
                execution_processes: process_count,
                needs_setup: setup_error.is_some(),
                setup_help_text: setup_error.map(|entry| entry.content.clone()),
            },
            "",
        )),
    )
}
