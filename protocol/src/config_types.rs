//! Small configuration enums shared between the orchestrator and whatever
//! external config layer populates an `OrchestratorConfig` (spec §6, §9 Open
//! Questions).

use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;

/// Winner-selection policy for self-votes (spec §9 Open Questions: "this
/// spec leaves the policy configurable; default is to allow self-votes as a
/// single vote").
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VotePolicy {
    #[default]
    AllowSelfVote,
    RejectSelfVote,
}

/// What triggered a restart (spec §4.5.5), recorded on the `Attempt` and on
/// `Coordination Tracker` `restart_completed` events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(tag = "type", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RestartTrigger {
    /// An agent emitted the configured restart-requesting tool-call.
    AgentRequested { agent_id: String },
    /// The candidate set was empty when the turn closed.
    Inconclusive,
    /// Too many agents ended the attempt in `Failed`.
    FailureThreshold { failed_count: usize },
}
