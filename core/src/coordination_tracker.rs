//! Coordination Tracker (spec §4.7): a pure, append-only, in-memory event
//! log per session. Records what the Orchestrator already decided; performs
//! no coordination logic of its own.

// Poisoned mutex should fail the program.
#![allow(clippy::expect_used)]

use std::sync::Mutex;

use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(tag = "type", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    ContextReceived,
    NewAnswer,
    VoteCast,
    StatusChange,
    RestartCompleted,
    FinalAnswer,
    FinalAgentSelected,
    FinalRoundStart,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackerEvent {
    pub seq: u64,
    pub timestamp: String,
    pub event_type: EventType,
    pub agent_id: Option<String>,
    pub round: Option<u64>,
    pub details: String,
}

/// Append-only log with a strictly monotonically increasing sequence number
/// per session (spec §8 invariant 5). `Mutex` rather than an async lock: the
/// only operation is a fast, non-blocking push.
pub struct CoordinationTracker {
    events: Mutex<Vec<TrackerEvent>>,
    next_seq: Mutex<u64>,
}

impl Default for CoordinationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CoordinationTracker {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            next_seq: Mutex::new(0),
        }
    }

    pub fn record(
        &self,
        event_type: EventType,
        agent_id: Option<String>,
        round: Option<u64>,
        details: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> u64 {
        let mut next_seq = self.next_seq.lock().expect("tracker seq mutex poisoned");
        let seq = *next_seq;
        *next_seq += 1;
        drop(next_seq);

        let event = TrackerEvent {
            seq,
            timestamp: timestamp.into(),
            event_type,
            agent_id,
            round,
            details: details.into(),
        };
        self.events
            .lock()
            .expect("tracker events mutex poisoned")
            .push(event);
        seq
    }

    pub fn events(&self) -> Vec<TrackerEvent> {
        self.events.lock().expect("tracker events mutex poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_are_strictly_monotonic() {
        let tracker = CoordinationTracker::new();
        let s1 = tracker.record(EventType::NewAnswer, Some("a".into()), Some(1), "first", "t0");
        let s2 = tracker.record(EventType::VoteCast, Some("b".into()), Some(1), "second", "t1");
        let s3 = tracker.record(EventType::FinalAnswer, None, Some(1), "third", "t2");
        assert_eq!((s1, s2, s3), (0, 1, 2));
        let events = tracker.events();
        assert_eq!(events.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![0, 1, 2]);
    }
}
