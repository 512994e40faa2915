//! Crate-level error type.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = ChatError> = std::result::Result<T, E>;

/// Errors surfaced by the controller, the backend client and configuration
/// loading.
///
/// Each variant carries enough context to diagnose the failure without
/// needing to inspect the originating error directly.
#[derive(Debug, Error)]
pub enum ChatError {
    /// `submit` was called with an empty message.
    #[error("message is empty")]
    EmptyMessage,
    /// No topic is selected.
    #[error("no topic selected")]
    NoTopic,
    /// The conversation history is still loading.
    #[error("conversation is still loading")]
    Loading,
    /// A completion is already streaming into the conversation.
    #[error("a response is still streaming; stop it first")]
    StreamBusy,
    /// An edit addressed a turn that does not exist.
    #[error("message index {index} out of range (conversation has {len} messages)")]
    IndexOutOfRange { index: usize, len: usize },
    /// A TCP-level connection could not be established or the request was aborted.
    #[error("connection failed to {url}: {detail}")]
    Connect { url: String, detail: String },
    /// The backend replied with a non-2xx HTTP status code.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },
    /// Response body could not be parsed as the expected JSON structure.
    #[error("JSON parse error on field '{field}': {detail}")]
    Json { field: String, detail: String },
    /// Reading the streamed response body failed part-way.
    #[error("stream read failed: {0}")]
    Stream(String),
    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("config file: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ChatError {
    /// True for the precondition rejections that never reach the network.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ChatError::EmptyMessage
                | ChatError::NoTopic
                | ChatError::Loading
                | ChatError::StreamBusy
                | ChatError::IndexOutOfRange { .. }
        )
    }
}
