//! Attempt / Turn / Session record shapes (spec §3, §4.3). This module is
//! pure data — no filesystem access. See `massgen-core::attempt_storage` for
//! the durable-layout implementation that reads and writes these.

use serde::Deserialize;
use serde::Serialize;

/// One parallel run of all agents for a given turn (spec GLOSSARY).
///
/// Invariant: `(session_id, turn_number, attempt_number)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attempt {
    pub session_id: String,
    pub turn_number: u64,
    pub attempt_number: u64,
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winning_agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_instructions: Option<String>,
    /// RFC 3339 timestamp, formatted by the caller (this crate does not read
    /// the clock so that it stays deterministic for tests).
    pub timestamp: String,
    pub answer_text: String,
    /// Set once the attempt has been persisted; `None` for an attempt still
    /// being assembled in memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_snapshot_path: Option<String>,
}

impl Attempt {
    pub fn key(&self) -> (String, u64, u64) {
        (self.session_id.clone(), self.turn_number, self.attempt_number)
    }
}

/// Lightweight projection of an `Attempt` returned by listing operations
/// that don't need the full answer text inline (kept separate from
/// `Attempt` because callers like `previous_attempts_context` only need the
/// metadata, not necessarily a loaded answer).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttemptSummary {
    pub turn_number: u64,
    pub attempt_number: u64,
    pub task: String,
    pub winning_agent_id: Option<String>,
    pub restart_reason: Option<String>,
}

impl From<&Attempt> for AttemptSummary {
    fn from(a: &Attempt) -> Self {
        Self {
            turn_number: a.turn_number,
            attempt_number: a.attempt_number,
            task: a.task.clone(),
            winning_agent_id: a.winning_agent_id.clone(),
            restart_reason: a.restart_reason.clone(),
        }
    }
}

/// The record `previous_turns_for_session` returns for each closed turn
/// (spec §4.3): the successful attempt, or the latest attempt with a
/// warning if none was marked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnRecord {
    pub turn_number: u64,
    pub task: String,
    pub winning_agent_id: Option<String>,
    pub answer_text: String,
    pub workspace_path: Option<String>,
}
