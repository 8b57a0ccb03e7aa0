use serde::{Deserialize, Serialize};
use ts_rs::TS;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
pub struct ExecutorProfileId {
    pub executor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct CodingAgentInitialRequest {
    pub prompt: String,
    /// Executor profile specification
    #[serde(alias = "profile_variant_label")]
    pub executor_profile_id: ExecutorProfileId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct CodingAgentFollowUpRequest {
    pub prompt: String,
    pub session_id: String,
    #[serde(alias = "profile_variant_label")]
    pub executor_profile_id: ExecutorProfileId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub enum ScriptRequestLanguage {
    Bash,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
pub enum ScriptContext {
    SetupScript,
    CleanupScript,
    DevServer,
    ToolInstallScript,
}

impl ScriptContext {
    /// Label shown for the synthesized tool entry of a script run. Dev servers
    /// are not part of the conversation and have none.
    pub fn tool_label(&self) -> Option<&'static str> {
        match self {
            ScriptContext::SetupScript => Some("Setup Script"),
            ScriptContext::CleanupScript => Some("Cleanup Script"),
            ScriptContext::ToolInstallScript => Some("Tool Install Script"),
            ScriptContext::DevServer => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct ScriptRequest {
    pub script: String,
    pub language: ScriptRequestLanguage,
    pub context: ScriptContext,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(tag = "type")]
pub enum ExecutorActionType {
    CodingAgentInitialRequest(CodingAgentInitialRequest),
    CodingAgentFollowUpRequest(CodingAgentFollowUpRequest),
    ScriptRequest(ScriptRequest),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct ExecutorAction {
    pub typ: ExecutorActionType,
    #[serde(default)]
    pub next_action: Option<Box<ExecutorAction>>,
}

impl ExecutorAction {
    pub fn new(typ: ExecutorActionType, next_action: Option<Box<ExecutorAction>>) -> Self {
        Self { typ, next_action }
    }

    pub fn typ(&self) -> &ExecutorActionType {
        &self.typ
    }

    /// The prompt sent to the coding agent, if this action is an agent request.
    pub fn prompt(&self) -> Option<&str> {
        match &self.typ {
            ExecutorActionType::CodingAgentInitialRequest(request) => Some(&request.prompt),
            ExecutorActionType::CodingAgentFollowUpRequest(request) => Some(&request.prompt),
            ExecutorActionType::ScriptRequest(_) => None,
        }
    }

    /// The executor profile of an agent request.
    pub fn executor_profile_id(&self) -> Option<&ExecutorProfileId> {
        match &self.typ {
            ExecutorActionType::CodingAgentInitialRequest(request) => {
                Some(&request.executor_profile_id)
            }
            ExecutorActionType::CodingAgentFollowUpRequest(request) => {
                Some(&request.executor_profile_id)
            }
            ExecutorActionType::ScriptRequest(_) => None,
        }
    }

    pub fn script(&self) -> Option<&ScriptRequest> {
        match &self.typ {
            ExecutorActionType::ScriptRequest(request) => Some(request),
            _ => None,
        }
    }

    pub fn is_script(&self) -> bool {
        self.script().is_some()
    }
}
