use shared::error::{join_errors, GraphQlError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to notes api failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("notes api returned {status}: {body}")]
    Http {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("notes api rejected the operation: {}", join_errors(.0))]
    GraphQl(Vec<GraphQlError>),
    #[error("notes api response is missing `{0}`")]
    MissingData(&'static str),
    #[error("failed to decode notes api payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("websocket failure: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("subscription protocol error: {0}")]
    Protocol(String),
    #[error("invalid endpoint url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("note list controller already started")]
    AlreadyStarted,
}

impl ClientError {
    /// True for failures the backend reported (as opposed to the network).
    pub fn is_remote_rejection(&self) -> bool {
        matches!(self, ClientError::GraphQl(_) | ClientError::Http { .. })
    }
}
