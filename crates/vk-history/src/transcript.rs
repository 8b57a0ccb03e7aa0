use std::collections::{HashMap, HashSet};

use conversation::{DisplayEntry, EntryKey};
use executors_protocol::{ActionType, NormalizedEntry, NormalizedEntryType, ToolStatus};
use logs_protocol::PatchType;

/// Turns successive timelines into lines, printing each keyed entry once.
///
/// Entries still in motion are held back until they settle: loading rows,
/// tools that have not resolved yet, and the newest entry of a process that is
/// still running, which the agent may keep rewriting in place. The
/// next-action summary is printed every time it reappears.
#[derive(Debug, Default)]
pub struct Transcript {
    printed: HashSet<EntryKey>,
    json: bool,
}

impl Transcript {
    pub fn new(json: bool) -> Self {
        Self {
            printed: HashSet::new(),
            json,
        }
    }

    /// Lines to print for this timeline, in order.
    pub fn update(&mut self, entries: &[DisplayEntry]) -> Vec<String> {
        if !entries.iter().any(|entry| entry.key == EntryKey::NextAction) {
            self.printed.remove(&EntryKey::NextAction);
        }

        let open = open_entries(entries);
        let mut lines = Vec::new();
        for entry in entries {
            if self.printed.contains(&entry.key)
                || open.contains(&entry.key)
                || !is_settled(&entry.entry)
            {
                continue;
            }
            let line = if self.json {
                serde_json::to_string(entry).ok()
            } else {
                render(&entry.entry)
            };
            self.printed.insert(entry.key);
            lines.extend(line);
        }
        lines
    }
}

/// The last indexed entry of every process that still shows a loading row.
fn open_entries(entries: &[DisplayEntry]) -> HashSet<EntryKey> {
    let mut last = HashMap::new();
    let mut running = Vec::new();
    for entry in entries {
        match entry.key {
            EntryKey::Indexed { process_id, .. } => {
                last.insert(process_id, entry.key);
            }
            EntryKey::Loading(process_id) => running.push(process_id),
            EntryKey::User(_) | EntryKey::NextAction => {}
        }
    }
    running
        .iter()
        .filter_map(|process_id| last.get(process_id).copied())
        .collect()
}

fn is_settled(entry: &PatchType) -> bool {
    match entry.as_normalized().map(|entry| &entry.entry_type) {
        Some(NormalizedEntryType::Loading) => false,
        Some(NormalizedEntryType::ToolUse { status, .. }) => {
            !matches!(status, ToolStatus::Created | ToolStatus::PendingApproval { .. })
        }
        _ => true,
    }
}

pub fn render(entry: &PatchType) -> Option<String> {
    match entry {
        PatchType::Stdout(line) => Some(line.clone()),
        PatchType::Stderr(line) => Some(format!("stderr: {line}")),
        PatchType::NormalizedEntry(entry) => render_normalized(entry),
    }
}

fn render_normalized(entry: &NormalizedEntry) -> Option<String> {
    let content = entry.content.trim_end();
    match &entry.entry_type {
        NormalizedEntryType::UserMessage => Some(format!("> {content}")),
        NormalizedEntryType::UserFeedback { denied_tool } => {
            Some(format!("feedback on {denied_tool}: {content}"))
        }
        NormalizedEntryType::AssistantMessage => Some(content.to_string()),
        NormalizedEntryType::Thinking => Some(format!("(thinking) {content}")),
        NormalizedEntryType::SystemMessage => Some(format!("system: {content}")),
        NormalizedEntryType::ErrorMessage { .. } => Some(format!("error: {content}")),
        NormalizedEntryType::ToolUse {
            tool_name,
            action_type,
            status,
        } => Some(render_tool(tool_name, action_type, status, content)),
        NormalizedEntryType::Loading => None,
        NormalizedEntryType::NextAction {
            failed,
            execution_processes,
            needs_setup,
            setup_help_text,
        } => {
            let outcome = if *failed { "failed" } else { "finished" };
            let mut line =
                format!("-- last run {outcome} ({execution_processes} processes) --");
            if *needs_setup {
                line.push_str("\nsetup required");
                if let Some(help) = setup_help_text {
                    line.push_str(": ");
                    line.push_str(help);
                }
            }
            Some(line)
        }
    }
}

fn render_tool(tool_name: &str, action_type: &ActionType, status: &ToolStatus, content: &str) -> String {
    let status = match status {
        ToolStatus::Created => "running",
        ToolStatus::Success => "ok",
        ToolStatus::Failed => "failed",
        ToolStatus::Denied { .. } => "denied",
        ToolStatus::PendingApproval { .. } => "awaiting approval",
        ToolStatus::TimedOut => "timed out",
    };
    match action_type {
        ActionType::CommandRun {
            command,
            result: Some(result),
        } => {
            let mut line = format!("[{tool_name}] {status}: $ {command}");
            if let Some(output) = result.output.as_deref().filter(|o| !o.is_empty()) {
                line.push('\n');
                line.push_str(output);
            }
            line
        }
        _ => format!("[{tool_name}] {status}: {content}"),
    }
}
