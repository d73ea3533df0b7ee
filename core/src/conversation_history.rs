//! In-memory transcript of one session's `Message`s (spec §3 "Session":
//! "alternating `user` ... and `assistant`"), used by the Orchestrator to
//! hand a backend the running context of a turn and by the Session Manager
//! to seed history on resume.
//!
//! Grounded in the teacher's `conversation_history.rs`: adjacent assistant
//! messages merge so a streamed partial delta and the final full message
//! don't end up as two separate history entries.

use massgen_protocol::Message;
use massgen_protocol::Role;

#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    /// The oldest items are at the beginning of the vector.
    items: Vec<Message>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn contents(&self) -> Vec<Message> {
        self.items.clone()
    }

    /// `messages` is ordered from oldest to newest. System messages are
    /// dropped; everything else is recorded, merging into an adjacent
    /// trailing assistant message when both are plain assistant text.
    pub fn record_messages<I: IntoIterator<Item = Message>>(&mut self, messages: I) {
        for message in messages {
            if message.role == Role::System {
                continue;
            }
            match (&message, self.items.last_mut()) {
                (
                    Message {
                        role: Role::Assistant,
                        content: new_content,
                        tool_calls,
                        ..
                    },
                    Some(Message {
                        role: Role::Assistant,
                        content: last_content,
                        ..
                    }),
                ) if tool_calls.is_empty() => {
                    last_content.push_str(new_content);
                }
                _ => self.items.push(message),
            }
        }
    }

    /// Append a text delta to the latest assistant message, starting a new
    /// one if none exists yet (first delta of a turn).
    pub fn append_assistant_text(&mut self, delta: &str) {
        match self.items.last_mut() {
            Some(Message {
                role: Role::Assistant,
                content,
                ..
            }) => content.push_str(delta),
            _ => self.items.push(Message::assistant(delta)),
        }
    }

    /// Keep only the last `n` messages, oldest-to-newest order preserved.
    pub fn keep_last_messages(&mut self, n: usize) {
        if n == 0 {
            self.items.clear();
            return;
        }
        let start = self.items.len().saturating_sub(n);
        self.items.drain(..start);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_adjacent_assistant_messages() {
        let mut h = ConversationHistory::default();
        h.record_messages([Message::assistant("Hello"), Message::assistant(", world!")]);
        assert_eq!(
            h.contents(),
            vec![Message::assistant("Hello, world!")]
        );
    }

    #[test]
    fn append_assistant_text_creates_and_merges_with_recorded_message() {
        let mut h = ConversationHistory::default();
        h.append_assistant_text("Hello");
        h.append_assistant_text(", world");
        h.record_messages([Message::assistant("!")]);
        assert_eq!(
            h.contents(),
            vec![Message::assistant("Hello, world!")]
        );
    }

    #[test]
    fn filters_system_messages_but_keeps_user_and_assistant() {
        let mut h = ConversationHistory::default();
        h.record_messages([
            Message::system("ignored"),
            Message::user("hi"),
            Message::assistant("hello"),
        ]);
        assert_eq!(
            h.contents(),
            vec![Message::user("hi"), Message::assistant("hello")]
        );
    }

    #[test]
    fn keep_last_messages_truncates_from_the_front() {
        let mut h = ConversationHistory::default();
        h.record_messages([
            Message::user("turn1"),
            Message::assistant("alpha"),
            Message::user("turn2"),
            Message::assistant("beta"),
        ]);
        h.keep_last_messages(2);
        assert_eq!(
            h.contents(),
            vec![Message::user("turn2"), Message::assistant("beta")]
        );
    }
}
