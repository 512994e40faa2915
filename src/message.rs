//! Conversation turns and the in-memory message store.
//!
//! The store never mutates a published message list in place: every change
//! builds a new `Vec<Message>` and swaps the shared `Arc`, so a renderer
//! holding a snapshot always sees a complete list.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{ChatError, Result};

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    #[default]
    User,
    Assistant,
}

impl Role {
    /// Positional role used for hydrated history: slot 0 is the system
    /// prompt, then user and assistant turns alternate starting at slot 1
    /// with the assistant.
    pub fn from_index(index: usize) -> Self {
        if index == 0 {
            Role::System
        } else if index % 2 == 0 {
            Role::User
        } else {
            Role::Assistant
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Opaque topic identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicId(String);

impl TopicId {
    pub fn new(id: impl Into<String>) -> Self {
        TopicId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TopicId {
    fn from(s: &str) -> Self {
        TopicId(s.to_string())
    }
}

/// One conversation turn.
///
/// Only `content` travels over the wire; `role` is assigned when the turn
/// enters the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(skip)]
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Message { role, content: content.into() }
    }

    /// Empty assistant slot that a stream will fill.
    pub fn placeholder() -> Self {
        Message::new(Role::Assistant, "")
    }
}

/// Ordered conversation for the active topic.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Arc<Vec<Message>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from hydrated history, assigning positional roles.
    pub fn from_history(history: Vec<Message>) -> Self {
        let messages = history
            .into_iter()
            .enumerate()
            .map(|(i, m)| Message::new(Role::from_index(i), m.content))
            .collect();
        MessageStore { messages: Arc::new(messages) }
    }

    /// Cheap shared handle to the current list.
    pub fn snapshot(&self) -> Arc<Vec<Message>> {
        Arc::clone(&self.messages)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn clear(&mut self) {
        self.messages = Arc::new(Vec::new());
    }

    pub fn replace_all(&mut self, other: MessageStore) {
        self.messages = other.messages;
    }

    /// Append a user turn followed by an empty assistant placeholder. An
    /// empty conversation first gets the two padding slots the backend
    /// reserves ahead of the first user turn.
    pub fn push_turn(&mut self, text: &str) {
        let mut next = Vec::with_capacity(self.messages.len() + 4);
        if self.messages.is_empty() {
            next.push(Message::new(Role::System, ""));
            next.push(Message::new(Role::Assistant, ""));
        } else {
            next.extend(self.messages.iter().cloned());
        }
        next.push(Message::new(Role::User, text));
        next.push(Message::placeholder());
        self.messages = Arc::new(next);
    }

    /// Prepare the tail for a regenerated reply. Conversations longer than
    /// three turns lose their last entry; every conversation gains a fresh
    /// placeholder.
    pub fn prepare_regenerate(&mut self) {
        let len = self.messages.len();
        let keep = if len > 3 { len - 1 } else { len };
        let mut next: Vec<Message> = self.messages[..keep].to_vec();
        next.push(Message::placeholder());
        self.messages = Arc::new(next);
    }

    /// Replace the turn at `index` with `content`, drop everything after it
    /// and append an empty placeholder. The result has `index + 2` entries.
    pub fn prepare_edit(&mut self, index: usize, content: &str) -> Result<()> {
        let len = self.messages.len();
        if index >= len {
            return Err(ChatError::IndexOutOfRange { index, len });
        }
        let mut next: Vec<Message> = self.messages[..=index].to_vec();
        next[index].content = content.to_string();
        next.push(Message::placeholder());
        self.messages = Arc::new(next);
        Ok(())
    }

    /// Extend the last message with `chunk`. All other entries are shared
    /// unchanged; returns false when there is no message to extend.
    pub fn append_to_last(&mut self, chunk: &str) -> bool {
        let Some(last) = self.messages.last() else {
            return false;
        };
        let mut next: Vec<Message> = Vec::with_capacity(self.messages.len());
        next.extend(self.messages[..self.messages.len() - 1].iter().cloned());
        let mut content = String::with_capacity(last.content.len() + chunk.len());
        content.push_str(&last.content);
        content.push_str(chunk);
        next.push(Message::new(last.role, content));
        self.messages = Arc::new(next);
        true
    }
}

/// Parse a `GET /messages/{topic}` body. Anything that is not an array of
/// `{content: string}` objects is rejected.
pub fn parse_history(bytes: &[u8]) -> Result<Vec<Message>> {
    serde_json::from_slice::<Vec<Message>>(bytes).map_err(|e| ChatError::Json {
        field: "messages".into(),
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_of(len: usize) -> MessageStore {
        MessageStore::from_history((0..len).map(|i| Message::new(Role::User, format!("m{i}"))).collect())
    }

    #[test]
    fn role_from_index_pattern() {
        assert_eq!(Role::from_index(0), Role::System);
        assert_eq!(Role::from_index(1), Role::Assistant);
        assert_eq!(Role::from_index(2), Role::User);
        assert_eq!(Role::from_index(3), Role::Assistant);
        assert_eq!(Role::from_index(4), Role::User);
    }

    #[test]
    fn from_history_assigns_positional_roles() {
        let store = store_of(4);
        let roles: Vec<Role> = store.snapshot().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::Assistant, Role::User, Role::Assistant]);
    }

    #[test]
    fn push_turn_on_empty_adds_padding() {
        let mut store = MessageStore::new();
        store.push_turn("resolved: cats");
        let msgs = store.snapshot();
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0].content, "");
        assert_eq!(msgs[1].content, "");
        assert_eq!(msgs[2], Message::new(Role::User, "resolved: cats"));
        assert_eq!(msgs[3], Message::placeholder());
    }

    #[test]
    fn push_turn_on_existing_appends_two() {
        let mut store = store_of(4);
        store.push_turn("next");
        assert_eq!(store.len(), 6);
        assert_eq!(store.get(4).map(|m| m.content.as_str()), Some("next"));
        assert_eq!(store.last(), Some(&Message::placeholder()));
    }

    #[test]
    fn regenerate_long_history_replaces_last() {
        let mut store = store_of(5);
        store.prepare_regenerate();
        let msgs = store.snapshot();
        assert_eq!(msgs.len(), 5);
        assert_eq!(msgs[3].content, "m3");
        assert_eq!(msgs[4], Message::placeholder());
    }

    #[test]
    fn regenerate_short_history_keeps_all_and_appends() {
        let mut store = store_of(2);
        store.prepare_regenerate();
        let msgs = store.snapshot();
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].content, "m0");
        assert_eq!(msgs[1].content, "m1");
        assert_eq!(msgs[2], Message::placeholder());
    }

    #[test]
    fn regenerate_boundary_at_three() {
        let mut store = store_of(3);
        store.prepare_regenerate();
        assert_eq!(store.len(), 4);

        let mut store = store_of(4);
        store.prepare_regenerate();
        assert_eq!(store.len(), 4);
        assert_eq!(store.get(2).map(|m| m.content.as_str()), Some("m2"));
    }

    #[test]
    fn edit_truncates_to_index_plus_two() {
        let mut store = store_of(7);
        store.prepare_edit(2, "rewritten").unwrap();
        let msgs = store.snapshot();
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[2].content, "rewritten");
        assert_eq!(msgs[2].role, Role::User);
        assert_eq!(msgs[3], Message::placeholder());
    }

    #[test]
    fn edit_last_index() {
        let mut store = store_of(3);
        store.prepare_edit(2, "x").unwrap();
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn edit_out_of_range_leaves_store_untouched() {
        let mut store = store_of(3);
        let before = store.snapshot();
        let err = store.prepare_edit(3, "x").unwrap_err();
        assert!(matches!(err, ChatError::IndexOutOfRange { index: 3, len: 3 }));
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
    }

    #[test]
    fn append_to_last_replaces_list() {
        let mut store = store_of(3);
        let before = store.snapshot();
        assert!(store.append_to_last("!"));
        let after = store.snapshot();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(before[2].content, "m2");
        assert_eq!(after[2].content, "m2!");
        assert_eq!(after[..2], before[..2]);
    }

    #[test]
    fn append_to_empty_store_is_noop() {
        let mut store = MessageStore::new();
        assert!(!store.append_to_last("lost"));
        assert!(store.is_empty());
    }

    #[test]
    fn parse_history_accepts_content_array() {
        let msgs = parse_history(br#"[{"content":"sys"},{"content":"hi"}]"#).unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1].content, "hi");
    }

    #[test]
    fn parse_history_ignores_extra_fields() {
        let msgs = parse_history(br#"[{"content":"a","id":"x","sort_order":1}]"#).unwrap();
        assert_eq!(msgs[0].content, "a");
    }

    #[test]
    fn parse_history_rejects_non_array() {
        assert!(matches!(parse_history(br#"{"content":"a"}"#), Err(ChatError::Json { .. })));
        assert!(parse_history(br#"[{"text":"a"}]"#).is_err());
        assert!(parse_history(br#"[{"content":5}]"#).is_err());
    }

    #[test]
    fn message_serializes_content_only() {
        let json = serde_json::to_string(&Message::new(Role::Assistant, "hi")).unwrap();
        assert_eq!(json, r#"{"content":"hi"}"#);
    }

    #[test]
    fn topic_id_is_transparent() {
        let id = TopicId::new("abc-123");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""abc-123""#);
        assert_eq!(id.to_string(), "abc-123");
    }
}
