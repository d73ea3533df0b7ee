//! Wire-adjacent data types shared by every MassGen coordination-core
//! component: the Stream Chunk Bus envelope, the coordination tool-call
//! shapes, and the persisted attempt/turn/session records.
//!
//! This crate defines vocabulary only. It does not know how a backend talks
//! to a model, how a display renders a chunk, or how bytes reach disk — see
//! `massgen-core` for the components that give these types behavior.

pub mod attempt;
pub mod chunk;
pub mod config_types;

pub use attempt::Attempt;
pub use attempt::AttemptSummary;
pub use attempt::TurnRecord;
pub use chunk::AgentState;
pub use chunk::Message;
pub use chunk::Role;
pub use chunk::StatusKind;
pub use chunk::StreamChunk;
pub use chunk::ToolCall;
pub use chunk::ToolResult;
pub use chunk::ToolSpec;
pub use chunk::simulate_stream;
pub use config_types::RestartTrigger;
pub use config_types::VotePolicy;
