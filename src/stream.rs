//! Draining a streamed completion body into the trailing message slot.

use bytes::Bytes;
use std::fmt;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Completion token
// ---------------------------------------------------------------------------

/// Handle for one in-flight completion.
///
/// The `id` decides who may write into the message store: the controller
/// only accepts chunks tagged with its current id. The embedded
/// [`CancellationToken`] aborts the transport read of a superseded stream.
#[derive(Debug, Clone)]
pub struct CompletionToken {
    id: u64,
    cancel: CancellationToken,
}

impl CompletionToken {
    pub fn new(id: u64) -> Self {
        CompletionToken { id, cancel: CancellationToken::new() }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Transport-side handle, for aborting the request itself.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// The token after this one. `self` is cancelled.
    pub fn supersede(&self) -> CompletionToken {
        self.cancel();
        CompletionToken::new(self.id.wrapping_add(1))
    }
}

// ---------------------------------------------------------------------------
// Incremental UTF-8 decoding
// ---------------------------------------------------------------------------

/// Stateful UTF-8 decoder for one stream.
///
/// A multi-byte character split across two reads is held back until its
/// remaining bytes arrive. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk`, returning every complete character it finishes.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(chunk);

        let mut out = String::with_capacity(buf.len());
        let mut rest: &[u8] = &buf;
        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    break;
                }
                Err(e) => {
                    let (valid, tail) = rest.split_at(e.valid_up_to());
                    if let Ok(s) = std::str::from_utf8(valid) {
                        out.push_str(s);
                    }
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &tail[bad..];
                        }
                        None => {
                            self.pending = tail.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush at end of stream. A dangling partial character becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Stream consumer
// ---------------------------------------------------------------------------

/// Receiver of decoded text for the trailing message slot.
pub trait StreamSink {
    /// Append `text` to the last message if `stream_id` still owns it.
    /// Returns false once the stream has been superseded.
    fn append(&self, stream_id: u64, text: &str) -> bool;

    /// The stream ended. Clears the streaming flag only if `stream_id` is
    /// still current.
    fn finish(&self, stream_id: u64);
}

/// How a stream consumption ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The body ended normally.
    Completed,
    /// The token was cancelled while reading.
    Cancelled,
    /// A newer operation took over the slot; remaining chunks were dropped.
    Superseded,
    /// The transport failed part-way.
    Interrupted(String),
    /// The backend answered without a readable body.
    NoBody,
}

impl fmt::Display for StreamOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamOutcome::Completed => write!(f, "completed"),
            StreamOutcome::Cancelled => write!(f, "cancelled"),
            StreamOutcome::Superseded => write!(f, "superseded"),
            StreamOutcome::Interrupted(e) => write!(f, "interrupted: {}", e),
            StreamOutcome::NoBody => write!(f, "no body"),
        }
    }
}

/// Drain `body` into `sink` until it ends, fails, or `token` is cancelled.
///
/// Chunks are applied in arrival order through one decoder for the whole
/// stream. Neither cancellation nor a transport error is treated as fatal.
pub async fn consume_stream<S, E, K>(mut body: S, sink: &K, token: &CompletionToken) -> StreamOutcome
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: fmt::Display,
    K: StreamSink + ?Sized,
{
    let stream_id = token.id();
    let mut decoder = Utf8StreamDecoder::new();
    let mut chunks = 0usize;

    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::debug!(stream_id, chunks, "stream cancelled");
                return StreamOutcome::Cancelled;
            }
            item = body.next() => item,
        };

        match next {
            Some(Ok(bytes)) => {
                let text = decoder.decode(&bytes);
                if text.is_empty() {
                    continue;
                }
                chunks += 1;
                if !sink.append(stream_id, &text) {
                    tracing::debug!(stream_id, chunks, "stream superseded, dropping remaining chunks");
                    return StreamOutcome::Superseded;
                }
            }
            Some(Err(e)) => {
                tracing::warn!(stream_id, chunks, error = %e, "stream read failed");
                sink.finish(stream_id);
                return StreamOutcome::Interrupted(e.to_string());
            }
            None => {
                let tail = decoder.finish();
                if !tail.is_empty() && !sink.append(stream_id, &tail) {
                    return StreamOutcome::Superseded;
                }
                sink.finish(stream_id);
                tracing::debug!(stream_id, chunks, "stream finished");
                return StreamOutcome::Completed;
            }
        }
    }
}
