//! Markdown rendering of a timeline, bounded in size, for handing a
//! conversation to another agent as context.

use executors_protocol::{
    ActionType, CommandExitStatus, NormalizedEntry, NormalizedEntryType, ToolStatus,
};
use serde::Serialize;
use ts_rs::TS;

use crate::display::DisplayEntry;

/// Upper bound on the exported markdown, in bytes. Older entries go first.
pub const MAX_EXPORT_LENGTH: usize = 50_000;
/// Upper bound on the command output kept per tool row, in bytes.
pub const MAX_OUTPUT_LENGTH: usize = 500;
const MAX_SUMMARY_LENGTH: usize = 100;

const TRUNCATED_HEADER: &str =
    "## Previous Conversation (truncated)\n\n[...earlier conversation omitted...]\n\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
pub struct ExportResult {
    pub markdown: String,
    /// Entries that made it into the markdown before any truncation.
    pub message_count: usize,
    pub truncated: bool,
}

/// Renders `entries` as markdown. Loading rows, the next-action summary and
/// thinking are left out; `source` names the executor in the header.
pub fn export_to_markdown(entries: &[DisplayEntry], source: &str) -> ExportResult {
    export_with_limit(entries, source, MAX_EXPORT_LENGTH)
}

fn export_with_limit(entries: &[DisplayEntry], source: &str, limit: usize) -> ExportResult {
    let messages: Vec<String> = entries
        .iter()
        .filter_map(|entry| entry.entry.as_normalized())
        .filter_map(format_entry)
        .collect();

    let mut parts = Vec::with_capacity(messages.len() + 3);
    parts.push(format!("## Previous Conversation (from {source})\n"));
    parts.extend(messages.iter().cloned());
    parts.push("\n---\n".to_string());
    parts.push("Continue from where the previous agent left off.".to_string());
    let markdown = parts.join("\n");

    let truncated = markdown.len() > limit;
    let markdown = if truncated {
        keep_tail(&markdown, limit)
    } else {
        markdown
    };
    ExportResult {
        markdown,
        message_count: messages.len(),
        truncated,
    }
}

fn format_entry(entry: &NormalizedEntry) -> Option<String> {
    let content = &entry.content;
    match &entry.entry_type {
        NormalizedEntryType::UserMessage => Some(format!("**User:** {content}\n")),
        NormalizedEntryType::UserFeedback { denied_tool } => {
            Some(format!("**User:** [Denied tool: {denied_tool}] {content}\n"))
        }
        NormalizedEntryType::AssistantMessage => Some(format!("**Assistant:** {content}\n")),
        NormalizedEntryType::ToolUse {
            action_type,
            status,
            ..
        } => Some(format_tool(action_type, status, content)),
        NormalizedEntryType::ErrorMessage { .. } => Some(format!("**Error:** {content}\n")),
        NormalizedEntryType::SystemMessage => Some(format!("**System:** {content}\n")),
        NormalizedEntryType::Thinking
        | NormalizedEntryType::Loading
        | NormalizedEntryType::NextAction { .. } => None,
    }
}

fn format_tool(action_type: &ActionType, status: &ToolStatus, content: &str) -> String {
    let action = describe_action(action_type);
    let marker = match status {
        ToolStatus::Created | ToolStatus::Success => String::new(),
        ToolStatus::Failed => " [FAILED]".to_string(),
        ToolStatus::Denied { reason: Some(reason) } => {
            return format!("**Tool:** [{action}] {content} [DENIED: {reason}]\n");
        }
        ToolStatus::Denied { reason: None } => " [DENIED]".to_string(),
        ToolStatus::TimedOut => " [TIMED OUT]".to_string(),
        ToolStatus::PendingApproval { .. } => " [PENDING]".to_string(),
    };
    format!("**Tool:** [{action}]{marker} {content}\n")
}

fn describe_action(action_type: &ActionType) -> String {
    match action_type {
        ActionType::FileRead { path } => format!("Read File: {path}"),
        ActionType::FileEdit { path } => format!("Edit File: {path}"),
        ActionType::CommandRun { command, result } => {
            let mut description =
                format!("Run Command: {}", prefix(command, MAX_SUMMARY_LENGTH));
            let Some(result) = result else {
                return description;
            };
            if let Some(status) = &result.exit_status {
                let code = match status {
                    CommandExitStatus::ExitCode { code } => *code,
                    CommandExitStatus::Success { success } => i32::from(!success),
                };
                description.push_str(&format!(" (exit: {code})"));
            }
            let output = result
                .output
                .as_deref()
                .map(|output| prefix(output, MAX_OUTPUT_LENGTH))
                .unwrap_or_default();
            if !output.is_empty() {
                description.push_str("\n    Output: ");
                description.push_str(output);
            }
            description
        }
        ActionType::Search { query } => format!("Search: {}", prefix(query, MAX_SUMMARY_LENGTH)),
        ActionType::WebFetch { url } => format!("Web Fetch: {}", prefix(url, MAX_SUMMARY_LENGTH)),
        ActionType::Tool {
            tool_name,
            arguments,
            ..
        } => match arguments {
            Some(arguments) => format!(
                "{tool_name}: {}",
                prefix(&arguments.to_string(), MAX_SUMMARY_LENGTH)
            ),
            None => tool_name.clone(),
        },
        ActionType::TaskCreate { description } => {
            format!("Create Task: {}", prefix(description, MAX_SUMMARY_LENGTH))
        }
        ActionType::Other { description } => prefix(description, MAX_SUMMARY_LENGTH).to_string(),
    }
}

/// At most `max_len` bytes of `s`, cut on a char boundary.
fn prefix(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// The end of `markdown` behind a truncation header, at most `limit` bytes
/// overall. Starts on a line boundary where one is available.
fn keep_tail(markdown: &str, limit: usize) -> String {
    let budget = limit.saturating_sub(TRUNCATED_HEADER.len());
    let mut cut = markdown.len().saturating_sub(budget);
    while !markdown.is_char_boundary(cut) {
        cut += 1;
    }
    let start = markdown[cut..]
        .find('\n')
        .map_or(cut, |offset| cut + offset + 1);
    format!("{TRUNCATED_HEADER}{}", &markdown[start..])
}
