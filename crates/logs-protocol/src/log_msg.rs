use json_patch::Patch;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProtocolError;

const FINISHED_WS_TEXT: &str = r#"{"finished":true}"#;

/// One message on a process log channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LogMsg {
    Stdout(String),
    Stderr(String),
    JsonPatch(Patch),
    SessionId(String),
    Finished,
}

impl LogMsg {
    pub fn name(&self) -> &'static str {
        match self {
            LogMsg::Stdout(_) => "stdout",
            LogMsg::Stderr(_) => "stderr",
            LogMsg::JsonPatch(_) => "json_patch",
            LogMsg::SessionId(_) => "session_id",
            LogMsg::Finished => "finished",
        }
    }

    /// Text frame sent over a log WebSocket. `Finished` is encoded as the
    /// `{"finished":true}` sentinel rather than its serde form.
    pub fn to_ws_text(&self) -> Result<String, ProtocolError> {
        match self {
            LogMsg::Finished => Ok(FINISHED_WS_TEXT.to_string()),
            _ => Ok(serde_json::to_string(self)?),
        }
    }

    pub fn from_ws_text(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        if value.get("finished").and_then(Value::as_bool) == Some(true) {
            return Ok(LogMsg::Finished);
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Rough in-memory footprint, used to bound stored history.
    pub fn approx_bytes(&self) -> usize {
        const OVERHEAD: usize = 8;
        match self {
            LogMsg::Stdout(s) | LogMsg::Stderr(s) | LogMsg::SessionId(s) => OVERHEAD + s.len(),
            LogMsg::JsonPatch(patch) => {
                OVERHEAD + serde_json::to_string(patch).map(|s| s.len()).unwrap_or(2)
            }
            LogMsg::Finished => OVERHEAD,
        }
    }
}
