//! Display parsing for packed message payloads.
//!
//! Assistant replies arrive as `"<json-array>||<text>"`: evidence cards the
//! backend retrieved, then the reply itself. The JSON prefix is routinely
//! incomplete while a reply is still streaming, so nothing here fails hard.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::message::Role;

/// Separator between the metadata prefix and the reply text.
pub const PAYLOAD_SEPARATOR: &str = "||";

/// Separator-less assistant content longer than this many UTF-16 units is a
/// failed generation.
pub const STUMPED_THRESHOLD: usize = 50;

/// Shown in place of a reply the backend could not finish.
pub const STUMPED_FALLBACK: &str = "I am stumped and cannot figure out how to respond to this. Try regenerating your response or making a new debate topic.";

// ---------------------------------------------------------------------------
// Card metadata
// ---------------------------------------------------------------------------

/// One evidence card attached to an assistant reply.
///
/// Every field is optional: the backend has shipped several card shapes.
/// Deserialisation goes through [`Value`] and never rejects a record; a
/// field whose JSON type does not fit is left in `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct CardMetadataWithVotes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_upvotes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_downvotes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Value> for CardMetadataWithVotes {
    fn from(value: Value) -> Self {
        let Value::Object(mut map) = value else {
            return CardMetadataWithVotes::default();
        };
        CardMetadataWithVotes {
            id: take_field(&mut map, "id", read_text),
            content: take_field(&mut map, "content", read_text),
            link: take_field(&mut map, "link", read_text),
            author: take_field(&mut map, "author", |v| Some(v.clone())),
            card_html: take_field(&mut map, "card_html", read_text),
            total_upvotes: take_field(&mut map, "total_upvotes", read_count),
            total_downvotes: take_field(&mut map, "total_downvotes", read_count),
            created_at: take_field(&mut map, "created_at", read_text),
            extra: map,
        }
    }
}

/// Remove `key` from `map` if `read` accepts it. Nulls are dropped.
fn take_field<T>(map: &mut Map<String, Value>, key: &str, read: fn(&Value) -> Option<T>) -> Option<T> {
    let parsed = match map.get(key)? {
        Value::Null => None,
        value => Some(read(value)?),
    };
    map.remove(key);
    parsed
}

fn read_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn read_count(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

impl CardMetadataWithVotes {
    /// Net score shown next to the card.
    pub fn score(&self) -> i64 {
        self.total_upvotes
            .unwrap_or(0)
            .saturating_sub(self.total_downvotes.unwrap_or(0))
    }

    /// Short human label: the link if there is one, else the first line of
    /// the card text.
    pub fn label(&self) -> String {
        if let Some(link) = self.link.as_deref().filter(|l| !l.is_empty()) {
            return link.to_string();
        }
        let text = self.content.as_deref().unwrap_or("");
        let first = text.lines().next().unwrap_or("").trim();
        excerpt(first, 80)
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

// ---------------------------------------------------------------------------
// Display view
// ---------------------------------------------------------------------------

/// Where the metadata section of a rendered message stands.
#[derive(Debug, Clone, PartialEq)]
pub enum Metadata {
    /// Non-assistant turns carry no cards.
    Absent,
    /// The prefix exists but is not parseable yet (mid-stream or malformed).
    Pending,
    Cards(Vec<CardMetadataWithVotes>),
}

impl Metadata {
    pub fn cards(&self) -> &[CardMetadataWithVotes] {
        match self {
            Metadata::Cards(cards) => cards,
            _ => &[],
        }
    }
}

/// A message ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayMessage {
    pub text: String,
    pub metadata: Metadata,
}

impl DisplayMessage {
    fn plain(text: impl Into<String>) -> Self {
        DisplayMessage { text: text.into(), metadata: Metadata::Absent }
    }

    /// True when there is nothing to show yet and a "thinking" indicator
    /// belongs in the bubble.
    pub fn is_waiting(&self) -> bool {
        self.text.is_empty()
    }
}

/// Build the renderable view of one message.
///
/// `streaming` is true while this message is the slot a live stream is
/// writing into; a separator-less payload is then treated as pending rather
/// than as a failed generation.
pub fn parse_display(content: &str, role: Role, streaming: bool) -> DisplayMessage {
    let split = content.split_once(PAYLOAD_SEPARATOR);

    if role != Role::Assistant {
        return match split {
            Some((_, text)) => DisplayMessage::plain(text),
            None => DisplayMessage::plain(content),
        };
    }

    let (metadata, text) = match split {
        Some((prefix, text)) => {
            let metadata = match serde_json::from_str::<Vec<CardMetadataWithVotes>>(prefix) {
                Ok(cards) => Metadata::Cards(cards),
                Err(e) => {
                    tracing::trace!(error = %e, "card metadata not parseable yet");
                    Metadata::Pending
                }
            };
            (metadata, text)
        }
        None if streaming => (Metadata::Pending, ""),
        None if content.encode_utf16().count() > STUMPED_THRESHOLD => {
            return DisplayMessage::plain(STUMPED_FALLBACK);
        }
        None => (Metadata::Cards(Vec::new()), content),
    };

    let text = if metadata.cards().len() > 1 {
        strip_counterargument_labels(text)
    } else {
        String::new()
    };

    DisplayMessage { text, metadata }
}

/// Drop the first lowercase and the first capitalised `counterargument:`
/// label from `text`.
pub fn strip_counterargument_labels(text: &str) -> String {
    let once = text.replacen("counterargument:", "", 1);
    once.replacen("Counterargument:", "", 1)
}
