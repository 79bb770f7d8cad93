use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The realtime channel is not connected; chat is never queued.
    #[error("realtime channel is disconnected")]
    ChannelDisconnected,

    /// The server rejected the request with a domain error.
    #[error("{status} {code}: {message}")]
    Api {
        status: StatusCode,
        code: String,
        message: String,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Several units are owned and none was selected.
    #[error("select at least one unit before voting")]
    SelectionRequired,

    #[error("unit '{0}' is not one of the caller's units")]
    InvalidSelection(String),
}

impl ClientError {
    /// Machine code of an API rejection, e.g. `ALREADY_VOTED`.
    pub fn api_code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }
}
