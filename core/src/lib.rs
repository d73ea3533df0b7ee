//! Root of the `massgen-core` library: the multi-agent coordination core
//! (spec §1-§2). This crate is renderer- and backend-agnostic — it exposes
//! the four core subsystems (Stream Chunk Bus consumption, Path Permission
//! Manager, Attempt Storage, Orchestrator) plus the Session Manager and
//! Coordination Tracker as a library for an external CLI, display, and
//! backend layer to drive.
//!
//! No `main.rs` ships here; see `massgen-protocol` for the wire-adjacent
//! vocabulary (`StreamChunk`, `ToolCall`, `Attempt`, ...) this crate builds
//! behavior on top of.

// Prevent accidental direct writes to stdout/stderr in library code. All
// user-visible output must go through the appropriate abstraction (e.g. a
// display adapter or the tracing stack).
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod agent;
pub mod attempt_storage;
pub mod backend;
pub mod config;
pub mod conversation_history;
pub mod coordination_tracker;
pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod permission;
pub mod prompt;
pub mod session_manager;
pub mod tools;
pub mod util;

pub use agent::Agent;
pub use agent::AgentContext;
pub use attempt_storage::AttemptStorage;
pub use backend::Backend;
pub use backend::BackendStream;
pub use backend::TurnContext;
pub use config::AgentConfig;
pub use config::OrchestratorConfig;
pub use conversation_history::ConversationHistory;
pub use coordination_tracker::CoordinationTracker;
pub use coordination_tracker::EventType;
pub use coordination_tracker::TrackerEvent;
pub use error::CoreError;
pub use error::Result;
pub use memory::MemoryStore;
pub use memory::MemoryTier;
pub use orchestrator::Orchestrator;
pub use orchestrator::TurnOutcome;
pub use permission::ManagedPath;
pub use permission::PermissionManager;
pub use session_manager::SessionManager;
pub use tools::ToolHandler;
