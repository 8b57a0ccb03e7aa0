use chrono::{DateTime, Duration, TimeZone, Utc};
use executors_protocol::{
    CodingAgentInitialRequest, ExecutionProcess, ExecutionProcessRunReason,
    ExecutionProcessStatus, ExecutorAction, ExecutorActionType, ExecutorProfileId,
    NormalizedEntry, NormalizedEntryType, ScriptContext, ScriptRequest, ScriptRequestLanguage,
};
use logs_protocol::PatchType;
use uuid::Uuid;

pub fn at(offset_secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).single().unwrap() + Duration::seconds(offset_secs)
}

pub fn agent(offset_secs: i64, status: ExecutionProcessStatus) -> ExecutionProcess {
    process(
        offset_secs,
        status,
        ExecutionProcessRunReason::CodingAgent,
        ExecutorActionType::CodingAgentInitialRequest(CodingAgentInitialRequest {
            prompt: format!("prompt at {offset_secs}"),
            executor_profile_id: ExecutorProfileId {
                executor: "CLAUDE_CODE".to_string(),
                variant: None,
            },
        }),
    )
}

pub fn script(
    offset_secs: i64,
    status: ExecutionProcessStatus,
    context: ScriptContext,
) -> ExecutionProcess {
    let run_reason = match context {
        ScriptContext::CleanupScript => ExecutionProcessRunReason::CleanupScript,
        ScriptContext::DevServer => ExecutionProcessRunReason::DevServer,
        _ => ExecutionProcessRunReason::SetupScript,
    };
    process(
        offset_secs,
        status,
        run_reason,
        ExecutorActionType::ScriptRequest(ScriptRequest {
            script: "pnpm install".to_string(),
            language: ScriptRequestLanguage::Bash,
            context,
        }),
    )
}

fn process(
    offset_secs: i64,
    status: ExecutionProcessStatus,
    run_reason: ExecutionProcessRunReason,
    typ: ExecutorActionType,
) -> ExecutionProcess {
    let created_at = at(offset_secs);
    let exit_code = match status {
        ExecutionProcessStatus::Running => None,
        ExecutionProcessStatus::Completed => Some(0),
        ExecutionProcessStatus::Failed | ExecutionProcessStatus::Killed => Some(1),
    };
    ExecutionProcess {
        id: Uuid::new_v4(),
        task_attempt_id: Uuid::nil(),
        run_reason,
        executor_action: ExecutorAction::new(typ, None),
        status,
        exit_code,
        dropped: false,
        started_at: created_at,
        completed_at: None,
        created_at,
        updated_at: created_at,
    }
}

pub fn assistant(text: &str) -> PatchType {
    PatchType::NormalizedEntry(NormalizedEntry::new(
        NormalizedEntryType::AssistantMessage,
        text,
    ))
}
