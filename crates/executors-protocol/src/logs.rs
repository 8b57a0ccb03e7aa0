use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct NormalizedEntry {
    pub timestamp: Option<String>,
    pub entry_type: NormalizedEntryType,
    pub content: String,
    #[ts(type = "Record<string, unknown> | null")]
    pub metadata: Option<Value>,
}

impl NormalizedEntry {
    pub fn new(entry_type: NormalizedEntryType, content: impl Into<String>) -> Self {
        Self {
            timestamp: None,
            entry_type,
            content: content.into(),
            metadata: None,
        }
    }

    pub fn is_user_message(&self) -> bool {
        matches!(self.entry_type, NormalizedEntryType::UserMessage)
    }

    pub fn is_pending_approval(&self) -> bool {
        matches!(
            self.entry_type,
            NormalizedEntryType::ToolUse {
                status: ToolStatus::PendingApproval { .. },
                ..
            }
        )
    }

    pub fn is_setup_required_error(&self) -> bool {
        matches!(
            self.entry_type,
            NormalizedEntryType::ErrorMessage {
                error_type: NormalizedEntryError::SetupRequired
            }
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NormalizedEntryType {
    UserMessage,
    UserFeedback {
        denied_tool: String,
    },
    AssistantMessage,
    ToolUse {
        tool_name: String,
        action_type: ActionType,
        status: ToolStatus,
    },
    SystemMessage,
    ErrorMessage {
        error_type: NormalizedEntryError,
    },
    Thinking,
    Loading,
    NextAction {
        failed: bool,
        execution_processes: usize,
        needs_setup: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        setup_help_text: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NormalizedEntryError {
    SetupRequired,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolStatus {
    Created,
    Success,
    Failed,
    Denied {
        reason: Option<String>,
    },
    PendingApproval {
        approval_id: String,
        requested_at: DateTime<Utc>,
        timeout_at: DateTime<Utc>,
    },
    TimedOut,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionType {
    FileRead {
        path: String,
    },
    FileEdit {
        path: String,
    },
    CommandRun {
        command: String,
        #[serde(default)]
        result: Option<CommandRunResult>,
    },
    Search {
        query: String,
    },
    WebFetch {
        url: String,
    },
    Tool {
        tool_name: String,
        #[ts(type = "unknown")]
        arguments: Option<Value>,
        #[ts(type = "unknown")]
        result: Option<Value>,
    },
    TaskCreate {
        description: String,
    },
    Other {
        description: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct CommandRunResult {
    pub exit_status: Option<CommandExitStatus>,
    pub output: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandExitStatus {
    ExitCode { code: i32 },
    Success { success: bool },
}
