use std::time::Duration;

use massgen_protocol::VotePolicy;

use crate::permission::ManagedPath;

/// One agent's static definition, as supplied by whatever external CLI/config
/// layer drives the core (spec §6: "CLI and config are out of scope but MUST
/// supply: agent definitions, session id, and tunables").
///
/// `backend` is intentionally not part of this struct: the caller constructs
/// an `Arc<dyn Backend>` per agent and passes it alongside this definition
/// when building an `Agent` (see `crate::agent::Agent::new`).
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub agent_id: String,
    pub system_prompt: String,
    /// The agent's exclusive writable workspace for the duration of an
    /// attempt.
    pub workspace: ManagedPath,
    /// Read-only context paths: other agents' workspace snapshots, or a
    /// prior turn's workspace, granted for this attempt.
    pub context_paths: Vec<ManagedPath>,
}

/// Tunables the Orchestrator needs and that a config layer must supply
/// (spec §6, §9 "Open questions").
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub agents: Vec<AgentConfig>,
    /// `None` starts a new session; `Some(id)` resumes an existing one.
    pub session_id: Option<String>,
    pub per_attempt_timeout: Duration,
    pub max_restarts_per_turn: u32,
    pub vote_policy: VotePolicy,
    /// Name of the tool-call an agent issues to request a restart (spec
    /// §4.5 step 5: "a configured 'restart' tool-call"). Configurable so a
    /// caller's tool-naming convention doesn't collide with this one;
    /// defaults to `"request_restart"`.
    pub restart_tool_name: String,
    /// Root directory under which `AttemptStorage` persists
    /// `sessions/<session_id>/...` (spec §4.3).
    pub session_storage_root: std::path::PathBuf,
    /// Alternate root checked for a pre-existing session directory before
    /// falling back to `session_storage_root` (spec §4.3 "Restore
    /// semantics"). `None` disables the split-location merge.
    pub alternate_session_storage_root: Option<std::path::PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            agents: Vec::new(),
            session_id: None,
            per_attempt_timeout: Duration::from_secs(300),
            max_restarts_per_turn: 3,
            vote_policy: VotePolicy::default(),
            restart_tool_name: "request_restart".to_string(),
            session_storage_root: std::path::PathBuf::from("sessions"),
            alternate_session_storage_root: None,
        }
    }
}
