//! Session Manager (spec §4.6): assigns session ids, hands the Orchestrator
//! restored history on resume, and records winner info after a turn closes.
//!
//! Grounded in the teacher's `conversation_manager.rs` (a registry keyed by
//! an id, guarded by an async lock) and in the id-naming convention from
//! `rollout.rs`'s `rollout-<date>-<uuid>` files.

use std::sync::Arc;

use massgen_protocol::Message;
use time::OffsetDateTime;
use time::format_description::FormatItem;
use time::macros::format_description;
use uuid::Uuid;

use crate::attempt_storage::AttemptStorage;
use crate::conversation_history::ConversationHistory;

const DATE_FORMAT: &[FormatItem] = format_description!("[year]-[month]-[day]");

/// `<date>-<uuid v4>`, sortable by creation time (spec §4.6).
pub fn new_session_id(now: OffsetDateTime) -> String {
    let date = now.format(DATE_FORMAT).unwrap_or_else(|_| "0000-00-00".to_string());
    format!("{date}-{}", Uuid::new_v4())
}

pub struct SessionManager {
    storage: Arc<AttemptStorage>,
}

impl SessionManager {
    pub fn new(storage: Arc<AttemptStorage>) -> Self {
        Self { storage }
    }

    /// `Some(id)` resumes; `None` assigns a fresh id.
    pub async fn open_session(
        &self,
        session_id: Option<String>,
        now: OffsetDateTime,
    ) -> (String, Vec<Message>, u64) {
        match session_id {
            Some(id) => {
                let turns = self.storage.previous_turns_for_session(&id).await;
                let mut history = ConversationHistory::new();
                for turn in &turns {
                    history.record_messages([Message::user(turn.task.clone()), Message::assistant(turn.answer_text.clone())]);
                }
                let next_turn = turns.iter().map(|t| t.turn_number).max().unwrap_or(0) + 1;
                (id, history.contents(), next_turn)
            }
            None => (new_session_id(now), Vec::new(), 1),
        }
    }

    /// Called after a turn closes successfully; `winning_agents_history`
    /// lives on disk next to the other session records (spec §4.3 layout)
    /// but the in-process record is this append, which the Orchestrator
    /// calls right after `mark_successful_attempt`.
    pub async fn record_turn_outcome(
        &self,
        session_id: &str,
        turn_number: u64,
        attempt_number: u64,
    ) -> crate::error::Result<()> {
        self.storage
            .mark_successful_attempt(session_id, turn_number, attempt_number)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_sortable_and_unique() {
        let now = OffsetDateTime::now_utc();
        let a = new_session_id(now);
        let b = new_session_id(now);
        assert_ne!(a, b);
        assert!(a.starts_with(&now.format(DATE_FORMAT).unwrap()));
    }
}
