//! HTTP client for the debate backend.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, COOKIE};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use std::pin::Pin;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::message::{parse_history, Message, TopicId};

/// Streamed completion body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// Body of `POST`, `DELETE` and `PUT /message`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub new_message_content: String,
    /// 1-based position of the edited turn; only sent with `PUT`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_sort_order: Option<usize>,
    pub topic_id: TopicId,
}

impl CompletionRequest {
    pub fn new(content: impl Into<String>, topic_id: TopicId) -> Self {
        CompletionRequest {
            new_message_content: content.into(),
            message_sort_order: None,
            topic_id,
        }
    }

    /// Edit of the turn at store `index`.
    pub fn edit(content: impl Into<String>, index: usize, topic_id: TopicId) -> Self {
        CompletionRequest {
            new_message_content: content.into(),
            message_sort_order: Some(index + 1),
            topic_id,
        }
    }
}

/// Which completion endpoint a request goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionKind {
    /// `POST /message`: a new user turn.
    Create,
    /// `DELETE /message`: redo the last reply.
    Regenerate,
    /// `PUT /message`: edit a turn and redo everything after it.
    Edit,
}

impl CompletionKind {
    pub fn method(self) -> Method {
        match self {
            CompletionKind::Create => Method::POST,
            CompletionKind::Regenerate => Method::DELETE,
            CompletionKind::Edit => Method::PUT,
        }
    }
}

// ---------------------------------------------------------------------------
// Backend seam
// ---------------------------------------------------------------------------

/// Everything the controller needs from the backend.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// `GET /messages/{topic}`.
    async fn load_messages(&self, topic: &TopicId, cancel: CancellationToken) -> Result<Vec<Message>>;

    /// Issue a completion request. `Ok(None)` means the backend answered
    /// without a readable body.
    async fn complete(
        &self,
        kind: CompletionKind,
        request: &CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<Option<ByteStream>>;
}

/// [`ChatBackend`] over reqwest.
///
/// The cookie store is enabled so session cookies set by the backend are
/// replayed; a configured session cookie is sent on every request.
pub struct HttpBackend {
    client: Client,
    api_host: String,
}

impl HttpBackend {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(cookie) = config.session_cookie.as_deref() {
            let value = HeaderValue::from_str(cookie)
                .map_err(|e| ChatError::Config(format!("session cookie: {}", e)))?;
            headers.insert(COOKIE, value);
        }
        let client = Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .build()
            .map_err(|e| ChatError::Config(format!("http client: {}", e)))?;
        Ok(HttpBackend { client, api_host: config.api_host.clone() })
    }

    pub fn api_host(&self) -> &str {
        &self.api_host
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_host, path)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(ChatError::Connect { url: url.to_string(), detail: "aborted".into() });
            }
            r = request.send() => r.map_err(|e| ChatError::Connect {
                url: url.to_string(),
                detail: e.to_string(),
            })?,
        };
        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::Http { status: status.as_u16(), url: url.to_string() });
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn load_messages(&self, topic: &TopicId, cancel: CancellationToken) -> Result<Vec<Message>> {
        let url = self.url(&format!("/messages/{}", topic));
        tracing::debug!(topic_id = %topic, url = %url, "loading messages");
        let response = self.send(self.client.get(&url), &url, &cancel).await?;
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(ChatError::Connect { url, detail: "aborted".into() });
            }
            b = response.bytes() => b.map_err(|e| ChatError::Stream(e.to_string()))?,
        };
        parse_history(&body)
    }

    async fn complete(
        &self,
        kind: CompletionKind,
        request: &CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<Option<ByteStream>> {
        let url = self.url("/message");
        tracing::debug!(
            topic_id = %request.topic_id,
            method = %kind.method(),
            url = %url,
            "issuing completion request"
        );
        let builder = self.client.request(kind.method(), &url).json(request);
        let response = self.send(builder, &url, &cancel).await?;

        if response.status() == StatusCode::NO_CONTENT || response.content_length() == Some(0) {
            return Ok(None);
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ChatError::Stream(e.to_string())));
        Ok(Some(Box::pin(body)))
    }
}
