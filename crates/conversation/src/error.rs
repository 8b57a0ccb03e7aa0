use logs_protocol::ProtocolError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("stream_retry.max_attempts must be at least 1")]
    ZeroAttempts,
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no task attempt selected")]
    NoActiveAttempt,
    #[error("execution process {process_id} belongs to attempt {process_attempt_id}, not {attempt_id}")]
    ForeignProcess {
        process_id: Uuid,
        process_attempt_id: Uuid,
        attempt_id: Uuid,
    },
    #[error(transparent)]
    Directory(#[from] ProtocolError),
}
