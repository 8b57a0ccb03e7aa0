use async_trait::async_trait;
use futures::{StreamExt, stream::BoxStream};
use logs_protocol::LogMsg;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;
use uuid::Uuid;

use crate::{
    EntriesMode, PatchStream, PatchStreamClient, StreamEndpoint, StreamError, entries_stream_with,
};

/// Streams process logs from a running server over WebSocket.
///
/// `base_url` is the API root (e.g. `http://127.0.0.1:3000/api`); http(s) is
/// mapped to ws(s).
#[derive(Debug, Clone)]
pub struct WsPatchStreamClient {
    base_url: Url,
}

impl WsPatchStreamClient {
    pub fn new(base_url: &str) -> Result<Self, StreamError> {
        let mut url = Url::parse(base_url)?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(StreamError::UnsupportedScheme(other.to_string())),
        };
        url.set_scheme(scheme)
            .map_err(|()| StreamError::UnsupportedScheme(url.scheme().to_string()))?;
        Ok(Self { base_url: url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, path_and_query: &str) -> Result<Url, StreamError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}{path_and_query}"))?)
    }

    /// Live directory of an attempt's execution processes: an initial
    /// `replace /execution_processes` snapshot followed by per-process patches.
    pub async fn open_directory(
        &self,
        task_attempt_id: Uuid,
    ) -> Result<BoxStream<'static, Result<LogMsg, StreamError>>, StreamError> {
        let url = self.url_for(&format!(
            "/execution-processes/stream/ws?task_attempt_id={task_attempt_id}"
        ))?;
        connect_messages(&url).await
    }

    async fn open_with(
        &self,
        endpoint: &StreamEndpoint,
        mode: EntriesMode,
    ) -> Result<PatchStream, StreamError> {
        let url = self.url_for(&endpoint.path())?;
        let messages = connect_messages(&url).await?;
        Ok(entries_stream_with(messages, mode))
    }
}

async fn connect_messages(
    url: &Url,
) -> Result<BoxStream<'static, Result<LogMsg, StreamError>>, StreamError> {
    let (socket, _response) = connect_async(url.as_str()).await?;
    tracing::debug!(url = %url, "log websocket connected");

    Ok(socket
        .filter_map(|frame| async move {
            match frame {
                Ok(Message::Text(text)) => Some(LogMsg::from_ws_text(&text).map_err(StreamError::from)),
                Ok(_) => None,
                Err(err) => Some(Err(StreamError::from(err))),
            }
        })
        .boxed())
}

#[async_trait]
impl PatchStreamClient for WsPatchStreamClient {
    async fn open(&self, endpoint: &StreamEndpoint) -> Result<PatchStream, StreamError> {
        self.open_with(endpoint, EntriesMode::Snapshots).await
    }

    async fn open_history(&self, endpoint: &StreamEndpoint) -> Result<PatchStream, StreamError> {
        self.open_with(endpoint, EntriesMode::FinalOnly).await
    }
}
