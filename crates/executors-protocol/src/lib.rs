pub mod actions;
pub mod execution_process;
pub mod logs;

pub use actions::{
    CodingAgentFollowUpRequest, CodingAgentInitialRequest, ExecutorAction, ExecutorActionType,
    ExecutorProfileId, ScriptContext, ScriptRequest, ScriptRequestLanguage,
};
pub use execution_process::{ExecutionProcess, ExecutionProcessRunReason, ExecutionProcessStatus};
pub use logs::{
    ActionType, CommandExitStatus, CommandRunResult, NormalizedEntry, NormalizedEntryError,
    NormalizedEntryType, ToolStatus,
};
