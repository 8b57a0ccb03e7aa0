use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use ts_rs::TS;
use uuid::Uuid;

use crate::actions::ExecutorAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExecutionProcessStatus {
    Running,
    Completed,
    Failed,
    Killed,
}

impl ExecutionProcessStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ExecutionProcessStatus::Running)
    }

    pub fn is_failed_or_killed(&self) -> bool {
        matches!(
            self,
            ExecutionProcessStatus::Failed | ExecutionProcessStatus::Killed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExecutionProcessRunReason {
    SetupScript,
    CleanupScript,
    CodingAgent,
    DevServer,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct ExecutionProcess {
    pub id: Uuid,
    pub task_attempt_id: Uuid,
    pub run_reason: ExecutionProcessRunReason,
    pub executor_action: ExecutorAction,
    pub status: ExecutionProcessStatus,
    pub exit_code: Option<i64>,
    /// dropped: true if this process is excluded from the current
    /// history view (due to restore/trimming). Hidden from the timeline;
    /// still listed by the directory.
    #[serde(default)]
    pub dropped: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionProcess {
    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    /// Processes shown in the conversation timeline: not soft-deleted and not a
    /// dev server.
    pub fn is_visible_in_timeline(&self) -> bool {
        !self.dropped && self.run_reason != ExecutionProcessRunReason::DevServer
    }
}
