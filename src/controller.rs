//! Completion controller: turns send / regenerate / edit / cancel intents
//! into backend requests and owns every piece of mutable chat state.
//!
//! All state lives behind one mutex. A stream may only write into the
//! message store while its [`CompletionToken`] id is the current one, and
//! the id check happens under the same lock as the write, so swapping the
//! token is atomic with respect to the old stream's next chunk.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::api::{ByteStream, ChatBackend, CompletionKind, CompletionRequest};
use crate::error::{ChatError, Result};
use crate::message::{Message, MessageStore, TopicId};
use crate::presets::Preset;
use crate::stream::{consume_stream, CompletionToken, StreamOutcome, StreamSink};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Immutable view published after every mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatSnapshot {
    pub messages: Arc<Vec<Message>>,
    pub streaming: bool,
    pub loading: bool,
    pub input: String,
    pub topic: Option<TopicId>,
    pub auto_scroll_disabled: bool,
    pub scroll_requested: bool,
    /// Id of the stream that last wrote into the trailing slot. Reset when
    /// an operation replaces the slot.
    pub writer: Option<u64>,
}

impl ChatSnapshot {
    /// Whether the trailing slot is being written by a live stream.
    pub fn is_streaming_slot(&self, index: usize) -> bool {
        self.streaming && index + 1 == self.messages.len()
    }
}

#[derive(Debug)]
struct ChatState {
    store: MessageStore,
    topic: Option<TopicId>,
    input: String,
    streaming: bool,
    loading: bool,
    auto_scroll_disabled: bool,
    scroll_requested: bool,
    writer: Option<u64>,
    token: CompletionToken,
    load_generation: u64,
    load_cancel: CancellationToken,
}

impl ChatState {
    fn new() -> Self {
        ChatState {
            store: MessageStore::new(),
            topic: None,
            input: String::new(),
            streaming: false,
            loading: false,
            auto_scroll_disabled: false,
            scroll_requested: false,
            writer: None,
            token: CompletionToken::new(0),
            load_generation: 0,
            load_cancel: CancellationToken::new(),
        }
    }

    /// Cancel whatever stream is running and hand out a fresh token.
    fn begin_operation(&mut self) -> CompletionToken {
        if self.streaming {
            tracing::debug!(stream_id = self.token.id(), "superseding in-flight stream");
        }
        self.token = self.token.supersede();
        self.streaming = false;
        self.writer = None;
        self.token.clone()
    }

    fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            messages: self.store.snapshot(),
            streaming: self.streaming,
            loading: self.loading,
            input: self.input.clone(),
            topic: self.topic.clone(),
            auto_scroll_disabled: self.auto_scroll_disabled,
            scroll_requested: self.scroll_requested,
            writer: self.writer,
        }
    }
}

struct Shared {
    state: Mutex<ChatState>,
    updates: watch::Sender<ChatSnapshot>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, state: &ChatState) {
        self.updates.send_replace(state.snapshot());
    }
}

impl StreamSink for Shared {
    fn append(&self, stream_id: u64, text: &str) -> bool {
        let mut state = self.lock();
        if state.token.id() != stream_id {
            return false;
        }
        state.store.append_to_last(text);
        state.writer = Some(stream_id);
        state.scroll_requested = true;
        self.publish(&state);
        true
    }

    fn finish(&self, stream_id: u64) {
        let mut state = self.lock();
        if state.token.id() == stream_id && state.streaming {
            state.streaming = false;
            self.publish(&state);
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Cheap to clone; clones drive the same conversation.
pub struct ChatController<B: ?Sized> {
    backend: Arc<B>,
    shared: Arc<Shared>,
}

impl<B: ?Sized> Clone for ChatController<B> {
    fn clone(&self) -> Self {
        ChatController { backend: Arc::clone(&self.backend), shared: Arc::clone(&self.shared) }
    }
}

impl<B: ChatBackend + ?Sized> ChatController<B> {
    pub fn new(backend: Arc<B>) -> Self {
        let state = ChatState::new();
        let (updates, _) = watch::channel(state.snapshot());
        ChatController {
            backend,
            shared: Arc::new(Shared { state: Mutex::new(state), updates }),
        }
    }

    /// Receive a snapshot after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.shared.updates.subscribe()
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.shared.lock().snapshot()
    }

    pub fn is_streaming(&self) -> bool {
        self.shared.lock().streaming
    }

    pub fn topic(&self) -> Option<TopicId> {
        self.shared.lock().topic.clone()
    }

    // -- input buffer --------------------------------------------------------

    pub fn set_input(&self, text: impl Into<String>) {
        let mut state = self.shared.lock();
        state.input = text.into();
        self.shared.publish(&state);
    }

    /// Fill the input buffer with a canned prompt.
    pub fn apply_preset(&self, preset: Preset) {
        self.set_input(preset.prompt());
    }

    // -- scroll follow -------------------------------------------------------

    /// The reader scrolled away from the bottom; stop following the stream.
    pub fn suppress_auto_scroll(&self) {
        let mut state = self.shared.lock();
        state.auto_scroll_disabled = true;
        self.shared.publish(&state);
    }

    /// Consume a pending scroll-to-bottom request. Returns true only when
    /// one was pending and auto-scroll is enabled.
    pub fn take_scroll_request(&self) -> bool {
        let mut state = self.shared.lock();
        if !state.scroll_requested || state.auto_scroll_disabled {
            return false;
        }
        state.scroll_requested = false;
        self.shared.publish(&state);
        true
    }

    // -- topic ---------------------------------------------------------------

    /// Switch to `topic` and hydrate its history.
    ///
    /// Any in-flight stream and any earlier history load are aborted; a load
    /// that finishes after a newer selection is discarded. Completions are
    /// rejected until the load finishes. `None` clears the conversation and
    /// leaves it in the loading state.
    pub async fn select_topic(&self, topic: Option<TopicId>) -> Result<()> {
        let (generation, cancel) = {
            let mut state = self.shared.lock();
            state.begin_operation();
            state.load_cancel.cancel();
            state.load_cancel = CancellationToken::new();
            state.load_generation += 1;
            state.store.clear();
            state.topic = topic.clone();
            state.loading = true;
            self.shared.publish(&state);
            (state.load_generation, state.load_cancel.clone())
        };

        let Some(topic) = topic else {
            return Ok(());
        };

        let result = self.backend.load_messages(&topic, cancel).await;

        let mut state = self.shared.lock();
        if state.load_generation != generation {
            tracing::debug!(topic_id = %topic, "discarding stale history load");
            return Ok(());
        }
        state.loading = false;
        let outcome = match result {
            Ok(history) => {
                tracing::info!(topic_id = %topic, messages = history.len(), "loaded history");
                state.begin_operation();
                state.store = MessageStore::from_history(history);
                state.scroll_requested = true;
                Ok(())
            }
            Err(ChatError::Json { detail, .. }) => {
                tracing::warn!(topic_id = %topic, error = %detail, "history is not a message array");
                Ok(())
            }
            Err(e) => {
                tracing::error!(topic_id = %topic, error = %e, "failed to load history");
                Err(e)
            }
        };
        self.shared.publish(&state);
        outcome
    }

    // -- completions ---------------------------------------------------------

    /// Send the current input buffer to the selected topic.
    pub async fn submit_input(&self) -> Result<StreamOutcome> {
        let (text, topic) = {
            let state = self.shared.lock();
            (state.input.clone(), state.topic.clone())
        };
        self.submit(text, topic.as_ref()).await
    }

    /// Append a new user turn and stream the reply into a fresh placeholder.
    pub async fn submit(&self, text: impl Into<String>, topic: Option<&TopicId>) -> Result<StreamOutcome> {
        let text = text.into();
        let (token, topic) = {
            let mut state = self.shared.lock();
            if text.is_empty() {
                return Err(ChatError::EmptyMessage);
            }
            let Some(topic) = topic else {
                return Err(ChatError::NoTopic);
            };
            if state.loading {
                return Err(ChatError::Loading);
            }
            if state.streaming {
                return Err(ChatError::StreamBusy);
            }
            let token = state.begin_operation();
            state.input.clear();
            state.store.push_turn(&text);
            state.scroll_requested = true;
            self.shared.publish(&state);
            (token, topic.clone())
        };

        let request = CompletionRequest::new(text, topic);
        self.run_completion(CompletionKind::Create, request, token).await
    }

    /// Redo the last reply.
    ///
    /// Conversations of more than three entries lose their last entry; all
    /// of them gain an empty placeholder the new reply streams into.
    pub async fn regenerate(&self, topic: Option<&TopicId>) -> Result<StreamOutcome> {
        let (token, topic) = {
            let mut state = self.shared.lock();
            let Some(topic) = topic else {
                return Err(ChatError::NoTopic);
            };
            if state.loading {
                return Err(ChatError::Loading);
            }
            if state.streaming {
                return Err(ChatError::StreamBusy);
            }
            let token = state.begin_operation();
            state.store.prepare_regenerate();
            self.shared.publish(&state);
            (token, topic.clone())
        };

        let request = CompletionRequest::new("", topic);
        self.run_completion(CompletionKind::Regenerate, request, token).await
    }

    /// Rewrite the turn at `index`, drop everything after it, and stream a
    /// new reply. Any in-flight stream is cancelled first.
    pub async fn edit_and_resubmit(
        &self,
        index: usize,
        content: impl Into<String>,
        topic: Option<&TopicId>,
    ) -> Result<StreamOutcome> {
        let content = content.into();
        let (token, topic) = {
            let mut state = self.shared.lock();
            let Some(topic) = topic else {
                return Err(ChatError::NoTopic);
            };
            if state.loading {
                return Err(ChatError::Loading);
            }
            let len = state.store.len();
            if index >= len {
                return Err(ChatError::IndexOutOfRange { index, len });
            }
            let token = state.begin_operation();
            state.store.prepare_edit(index, &content)?;
            self.shared.publish(&state);
            (token, topic.clone())
        };

        let request = CompletionRequest::edit(content, index, topic);
        self.run_completion(CompletionKind::Edit, request, token).await
    }

    /// Stop the in-flight stream, if any. Bytes the transport already
    /// buffered are dropped.
    pub fn cancel(&self) {
        let mut state = self.shared.lock();
        let was_streaming = state.streaming;
        let token = state.begin_operation();
        tracing::info!(stream_id = token.id(), was_streaming, "completion cancelled");
        self.shared.publish(&state);
    }

    async fn run_completion(
        &self,
        kind: CompletionKind,
        request: CompletionRequest,
        token: CompletionToken,
    ) -> Result<StreamOutcome> {
        let stream_id = token.id();
        let topic_id = request.topic_id.clone();
        let response = self
            .backend
            .complete(kind, &request, token.cancel_handle())
            .await;

        let body: ByteStream = match response {
            Ok(Some(body)) => body,
            Ok(None) => {
                tracing::warn!(topic_id = %topic_id, stream_id, "completion response had no body");
                return Ok(StreamOutcome::NoBody);
            }
            Err(_) if token.is_cancelled() => {
                tracing::debug!(topic_id = %topic_id, stream_id, "completion aborted before response");
                return Ok(StreamOutcome::Cancelled);
            }
            Err(e) => {
                tracing::error!(topic_id = %topic_id, stream_id, error = %e, "completion request failed");
                return Err(e);
            }
        };

        {
            let mut state = self.shared.lock();
            if state.token.id() != stream_id {
                return Ok(StreamOutcome::Superseded);
            }
            state.streaming = true;
            if kind == CompletionKind::Edit {
                state.auto_scroll_disabled = false;
            }
            self.shared.publish(&state);
        }
        tracing::info!(topic_id = %topic_id, stream_id, ?kind, "streaming completion");

        let outcome = consume_stream(body, self.shared.as_ref(), &token).await;
        tracing::info!(topic_id = %topic_id, stream_id, %outcome, "completion ended");
        Ok(outcome)
    }
}
