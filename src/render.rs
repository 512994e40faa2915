//! Terminal rendering of conversation snapshots.

use colored::*;

use crate::controller::ChatSnapshot;
use crate::message::{Message, Role};
use crate::payload::{parse_display, CardMetadataWithVotes, DisplayMessage, Metadata};

const THINKING: &str = "thinking…";

fn speaker(role: Role) -> ColoredString {
    match role {
        Role::User => "you".bright_cyan().bold(),
        Role::Assistant => "debater".bright_magenta().bold(),
        Role::System => "system".dimmed(),
    }
}

/// Visible view of the message at `index` in `snapshot`.
pub fn display_at(snapshot: &ChatSnapshot, index: usize) -> Option<DisplayMessage> {
    let message = snapshot.messages.get(index)?;
    Some(parse_display(&message.content, message.role, snapshot.is_streaming_slot(index)))
}

/// One turn as a labelled block. System turns render as nothing.
pub fn render_message(index: usize, message: &Message, streaming: bool) -> Option<String> {
    if message.role == Role::System {
        return None;
    }
    let view = parse_display(&message.content, message.role, streaming);
    let mut out = format!("{} {}\n", format!("[{}]", index).as_str().dimmed(), speaker(message.role));

    let text = view.text.trim_start();
    if view.is_waiting() {
        out.push_str(&format!("  {}\n", THINKING.dimmed().italic()));
    } else {
        for line in text.lines() {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
    }

    match &view.metadata {
        Metadata::Cards(cards) if !cards.is_empty() => out.push_str(&render_cards(cards)),
        Metadata::Pending if message.role == Role::Assistant && !message.content.is_empty() => {
            out.push_str(&format!("  {}\n", "gathering evidence…".dimmed()));
        }
        _ => {}
    }
    Some(out)
}

/// Numbered evidence list.
pub fn render_cards(cards: &[CardMetadataWithVotes]) -> String {
    let mut out = format!("  {}\n", "evidence".bright_yellow());
    for (i, card) in cards.iter().enumerate() {
        let score = card.score();
        let score = if score > 0 {
            format!("+{}", score).as_str().green()
        } else if score < 0 {
            score.to_string().as_str().red()
        } else {
            score.to_string().as_str().normal()
        };
        out.push_str(&format!("   {}. {} ({})\n", i + 1, card.label(), score));
    }
    out
}

/// Every visible turn in `snapshot`.
pub fn render_conversation(snapshot: &ChatSnapshot) -> String {
    if snapshot.loading {
        return format!("{}\n", "loading conversation…".dimmed());
    }
    snapshot
        .messages
        .iter()
        .enumerate()
        .filter_map(|(i, m)| render_message(i, m, snapshot.is_streaming_slot(i)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prints a streaming reply incrementally.
///
/// Tracks what has already been written for the trailing message and emits
/// only the new suffix; if the visible text is rewritten (for example when
/// the metadata prefix completes and the label stripping kicks in) the
/// remainder is printed on a fresh line.
#[derive(Debug, Default)]
pub struct StreamPrinter {
    slot: Option<usize>,
    printed: String,
    /// Stream whose reply line is being printed.
    writer: Option<u64>,
    /// A reply line has been started and not yet terminated.
    open: bool,
}

impl StreamPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text to print for this snapshot, if anything changed.
    pub fn update(&mut self, snapshot: &ChatSnapshot) -> Option<String> {
        let index = snapshot.messages.len().checked_sub(1)?;
        let message = &snapshot.messages[index];
        if message.role != Role::Assistant {
            return None;
        }
        if self.slot != Some(index) {
            self.slot = Some(index);
            self.printed.clear();
        }
        let view = display_at(snapshot, index)?;
        let visible = view.text.trim_start();
        if visible == self.printed {
            return None;
        }
        let out = match visible.strip_prefix(self.printed.as_str()) {
            Some(rest) => rest.to_string(),
            None => format!("\n{}", visible),
        };
        self.printed = visible.to_string();
        Some(out)
    }

    /// Everything to print for this snapshot: a header when a new stream
    /// starts writing, the new reply text, and a newline once the reply is
    /// over.
    ///
    /// Keyed on `snapshot.writer` rather than on the streaming flag, so a
    /// reply whose whole lifetime collapsed into one observed snapshot is
    /// still printed.
    pub fn feed(&mut self, snapshot: &ChatSnapshot) -> String {
        let mut out = String::new();
        match snapshot.writer {
            None => {
                if self.open {
                    out.push('\n');
                    self.open = false;
                }
                self.writer = None;
                return out;
            }
            Some(id) if self.writer != Some(id) => {
                if self.open {
                    out.push('\n');
                }
                self.reset();
                self.writer = Some(id);
                self.open = true;
                out.push_str(&format!("{} ", speaker(Role::Assistant)));
            }
            Some(_) => {}
        }
        if !self.open {
            return out;
        }
        if let Some(text) = self.update(snapshot) {
            out.push_str(&text);
        }
        if !snapshot.streaming {
            out.push('\n');
            self.open = false;
        }
        out
    }

    /// Forget the tracked slot, e.g. after a topic switch.
    pub fn reset(&mut self) {
        self.slot = None;
        self.printed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn snapshot(messages: Vec<Message>, streaming: bool) -> ChatSnapshot {
        ChatSnapshot { messages: Arc::new(messages), streaming, ..Default::default() }
    }

    #[test]
    fn system_turns_are_hidden() {
        assert!(render_message(0, &Message::new(Role::System, "sys"), false).is_none());
    }

    #[test]
    fn empty_reply_shows_thinking() {
        colored::control::set_override(false);
        let out = render_message(3, &Message::placeholder(), true).unwrap();
        assert!(out.contains("debater"));
        assert!(out.contains(THINKING));
    }

    #[test]
    fn reply_with_cards_lists_evidence() {
        colored::control::set_override(false);
        let content = r#"[{"link":"https://a.org","total_upvotes":2},{"content":"b card"}]||  Counterargument: taxes"#;
        let out = render_message(3, &Message::new(Role::Assistant, content), false).unwrap();
        assert!(out.contains("  taxes"));
        assert!(!out.contains("Counterargument"));
        assert!(out.contains("1. https://a.org (+2)"));
        assert!(out.contains("2. b card (0)"));
    }

    #[test]
    fn user_turn_strips_packing() {
        colored::control::set_override(false);
        let out = render_message(2, &Message::new(Role::User, "ctx||my point"), false).unwrap();
        assert!(out.contains("you"));
        assert!(out.contains("  my point"));
        assert!(!out.contains("ctx"));
    }

    #[test]
    fn loading_conversation() {
        let snap = ChatSnapshot { loading: true, ..Default::default() };
        assert!(render_conversation(&snap).contains("loading"));
    }

    #[test]
    fn printer_emits_suffixes() {
        let mut printer = StreamPrinter::new();
        let cards = r#"[{"a":1},{"a":2}]||"#;
        let user = Message::new(Role::User, "hi");

        let s1 = snapshot(vec![user.clone(), Message::new(Role::Assistant, format!("{cards}One"))], true);
        assert_eq!(printer.update(&s1).as_deref(), Some("One"));

        let s2 = snapshot(vec![user.clone(), Message::new(Role::Assistant, format!("{cards}One two"))], true);
        assert_eq!(printer.update(&s2).as_deref(), Some(" two"));
        assert_eq!(printer.update(&s2), None);
    }

    #[test]
    fn printer_restarts_on_rewrite() {
        let mut printer = StreamPrinter::new();
        let cards = r#"[{"a":1},{"a":2}]||"#;
        let s1 = snapshot(vec![Message::new(Role::Assistant, format!("{cards}Counter"))], true);
        assert_eq!(printer.update(&s1).as_deref(), Some("Counter"));
        let s2 = snapshot(vec![Message::new(Role::Assistant, format!("{cards}Counterargument: x"))], true);
        assert_eq!(printer.update(&s2).as_deref(), Some("\nx"));
    }

    fn written(messages: Vec<Message>, streaming: bool, writer: u64) -> ChatSnapshot {
        ChatSnapshot { writer: Some(writer), ..snapshot(messages, streaming) }
    }

    #[test]
    fn feed_prints_reply_seen_only_after_it_finished() {
        colored::control::set_override(false);
        let mut printer = StreamPrinter::new();
        let reply = Message::new(Role::Assistant, r#"[{"a":1},{"a":2}]||Short reply"#);
        let done = written(vec![Message::new(Role::User, "hi"), reply], false, 1);
        assert_eq!(printer.feed(&done), "debater Short reply\n");
        assert_eq!(printer.feed(&done), "");
    }

    #[test]
    fn feed_streams_then_closes_line() {
        colored::control::set_override(false);
        let mut printer = StreamPrinter::new();
        let cards = r#"[{"a":1},{"a":2}]||"#;
        let user = Message::new(Role::User, "hi");

        let turn = snapshot(vec![user.clone(), Message::placeholder()], false);
        assert_eq!(printer.feed(&turn), "");

        let s1 = written(vec![user.clone(), Message::new(Role::Assistant, format!("{cards}One"))], true, 2);
        assert_eq!(printer.feed(&s1), "debater One");
        let s2 = written(vec![user.clone(), Message::new(Role::Assistant, format!("{cards}One two"))], true, 2);
        assert_eq!(printer.feed(&s2), " two");
        let end = ChatSnapshot { streaming: false, ..s2 };
        assert_eq!(printer.feed(&end), "\n");
    }

    #[test]
    fn feed_restarts_for_regenerated_slot() {
        colored::control::set_override(false);
        let mut printer = StreamPrinter::new();
        let cards = r#"[{"a":1},{"a":2}]||"#;
        let user = Message::new(Role::User, "hi");

        let first = written(vec![user.clone(), Message::new(Role::Assistant, format!("{cards}Old"))], true, 3);
        assert_eq!(printer.feed(&first), "debater Old");
        let second = written(vec![user.clone(), Message::new(Role::Assistant, format!("{cards}New"))], true, 4);
        assert_eq!(printer.feed(&second), "\ndebater New");
    }

    #[test]
    fn feed_closes_line_on_cancel() {
        colored::control::set_override(false);
        let mut printer = StreamPrinter::new();
        let cards = r#"[{"a":1},{"a":2}]||"#;
        let part = written(vec![Message::new(Role::Assistant, format!("{cards}Half"))], true, 5);
        assert_eq!(printer.feed(&part), "debater Half");
        let cancelled = ChatSnapshot { writer: None, streaming: false, ..part };
        assert_eq!(printer.feed(&cancelled), "\n");
        assert_eq!(printer.feed(&cancelled), "");
    }

    #[test]
    fn printer_ignores_user_tail() {
        let mut printer = StreamPrinter::new();
        let s = snapshot(vec![Message::new(Role::User, "typed")], false);
        assert_eq!(printer.update(&s), None);
    }
}
