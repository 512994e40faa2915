pub mod api;
pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod message;
pub mod payload;
pub mod presets;
pub mod render;
pub mod stream;

pub use api::{ByteStream, ChatBackend, CompletionKind, CompletionRequest, HttpBackend};
pub use config::ChatConfig;
pub use controller::{ChatController, ChatSnapshot};
pub use error::{ChatError, Result};
pub use message::{Message, MessageStore, Role, TopicId};
pub use payload::{parse_display, CardMetadataWithVotes, DisplayMessage, Metadata};
pub use presets::Preset;
pub use stream::{consume_stream, CompletionToken, StreamOutcome, StreamSink, Utf8StreamDecoder};
