use logs_protocol::ProtocolError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("no log stream available for execution process {0}")]
    NotFound(Uuid),
    #[error("invalid stream url: {0}")]
    Url(#[from] url::ParseError),
    #[error("unsupported base url scheme: {0}")]
    UnsupportedScheme(String),
    #[error(transparent)]
    WebSocket(Box<tungstenite::Error>),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("stream closed before the finished signal")]
    ClosedBeforeFinished,
}

impl From<tungstenite::Error> for StreamError {
    fn from(err: tungstenite::Error) -> Self {
        StreamError::WebSocket(Box::new(err))
    }
}
