//! The Stream Chunk Bus envelope (spec §3, §4.1): the uniform vocabulary a
//! backend speaks to the orchestrator and a runner speaks to a display.

use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;

/// A single message in the conversation sent to a backend (spec §6, backend
/// adapter contract). Roles mirror the ones named in the spec's `messages`
/// shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// Flat tool definition, the single representation the core deals in (spec
/// §6). Adapters convert to/from whatever flavor their wire format wants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON-Schema-like parameter description. Opaque to the core.
    pub parameters: serde_json::Value,
}

impl ToolSpec {
    /// Reshape into the `{type: "function", function: {...}}` envelope many
    /// chat-completions-style backends expect.
    pub fn into_function_style(self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }

    /// Reshape into a flat `{name, description, parameters}` object, the
    /// shape used by backends that don't nest under `function`.
    pub fn into_flat_style(self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "parameters": self.parameters,
        })
    }
}

/// A tool-call request, as emitted inside a `StreamChunk::ToolCalls` chunk.
///
/// `arguments` is kept as a JSON value rather than a raw string: backends
/// that hand back a JSON-encoded string are normalized to a value by the
/// runner before the `ToolCall` is constructed (spec §3: "object or
/// JSON-string").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Arguments for a `new_answer` call, if this call is one.
    pub fn as_new_answer(&self) -> Option<String> {
        if self.name != "new_answer" {
            return None;
        }
        self.arguments
            .get("content")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
    }

    /// `(agent_id, reason)` for a `vote` call, if this call is one.
    pub fn as_vote(&self) -> Option<(String, Option<String>)> {
        if self.name != "vote" {
            return None;
        }
        let agent_id = self.arguments.get("agent_id")?.as_str()?.to_owned();
        let reason = self
            .arguments
            .get("reason")
            .and_then(|v| v.as_str())
            .map(str::to_owned);
        Some((agent_id, reason))
    }

    /// Reason text for a restart-requesting call, if this call's name
    /// matches the caller-configured `restart_tool_name` (spec §4.5.5 "a
    /// configured restart-requesting tool-call").
    pub fn as_restart_request(&self, restart_tool_name: &str) -> Option<Option<String>> {
        if self.name != restart_tool_name {
            return None;
        }
        Some(
            self.arguments
                .get("reason")
                .and_then(|v| v.as_str())
                .map(str::to_owned),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub call_id: String,
    pub output: String,
    pub is_error: bool,
}

/// Coarse-grained lifecycle status carried on a `StreamChunk::Status` chunk,
/// distinct from the orchestrator-local `AgentState` (spec §3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StatusKind {
    Answering,
    Voted,
    Answered,
    Completed,
    Streaming,
}

/// One element of a backend's lazy output sequence (spec §3, §4.1).
///
/// A sequence MUST terminate with exactly one `Done` or `Error`; anything
/// observed after that is a protocol violation and MUST be dropped by the
/// consumer with a warning, never treated as fatal.
#[derive(Debug, Clone, Serialize, Deserialize, Display)]
#[serde(tag = "type", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StreamChunk {
    /// Incremental text from the model.
    Content { text: String },
    /// Incremental chain-of-thought, semantically separate from `Content`.
    Reasoning { text: String },
    /// One or more tool-call requests.
    ToolCalls { calls: Vec<ToolCall> },
    ToolResult {
        call_id: String,
        output: String,
        is_error: bool,
    },
    /// A whole message finalized by the backend (used both natively and by
    /// the simulated-streaming path for non-streaming backends).
    CompleteMessage {
        role: Role,
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Status { kind: StatusKind },
    Error { message: String },
    /// Terminal. No chunk may follow.
    Done,
}

impl StreamChunk {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamChunk::Done | StreamChunk::Error { .. })
    }
}

/// Build the simulated-streaming sequence for a backend that only returns a
/// finished response (spec §4.1, final paragraph): content chunks, then a
/// synthetic `CompleteMessage`, then `Done`. Tool calls, if any, precede the
/// `CompleteMessage`.
pub fn simulate_stream(content: &str, tool_calls: Vec<ToolCall>) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();
    if !content.is_empty() {
        chunks.push(StreamChunk::Content {
            text: content.to_string(),
        });
    }
    if !tool_calls.is_empty() {
        chunks.push(StreamChunk::ToolCalls {
            calls: tool_calls.clone(),
        });
    }
    chunks.push(StreamChunk::CompleteMessage {
        role: Role::Assistant,
        content: content.to_string(),
        tool_calls,
    });
    chunks.push(StreamChunk::Done);
    chunks
}

/// Orchestrator-local per-agent-per-attempt status (spec §3 `AgentState`).
///
/// An agent can be in at most one of `HasAnswer` / `Voted` at any instant;
/// transitioning to one discards whichever of the two it held before.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(tag = "type", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AgentState {
    Idle,
    Working,
    HasAnswer { answer: String, round: u64 },
    Voted { target_agent_id: String, round: u64 },
    Completed,
    Failed { reason: String },
}

impl AgentState {
    pub fn is_terminal_coordination_state(&self) -> bool {
        matches!(
            self,
            AgentState::HasAnswer { .. }
                | AgentState::Voted { .. }
                | AgentState::Completed
                | AgentState::Failed { .. }
        )
    }
}

/// Every field a filesystem-affecting tool call might carry a path in.
/// Used by the Path Permission Manager (spec §4.2) to find path-like
/// arguments without assuming a specific tool's argument schema.
pub fn extract_path_like_strings(arguments: &serde_json::Value) -> Vec<String> {
    const PATH_KEYS: &[&str] = &["path", "file_path", "paths", "dest", "destination", "target", "move_path"];
    let mut out = Vec::new();
    if let Some(obj) = arguments.as_object() {
        for key in PATH_KEYS {
            match obj.get(*key) {
                Some(serde_json::Value::String(s)) => out.push(s.clone()),
                Some(serde_json::Value::Array(arr)) => {
                    for item in arr {
                        if let Some(s) = item.as_str() {
                            out.push(s.to_string());
                        }
                    }
                }
                _ => {}
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulate_stream_ends_with_done_and_is_ordered() {
        let chunks = simulate_stream("hi", vec![]);
        assert!(matches!(chunks.first(), Some(StreamChunk::Content { .. })));
        assert!(matches!(chunks.last(), Some(StreamChunk::Done)));
    }

    #[test]
    fn simulate_stream_places_tool_calls_before_complete_message() {
        let call = ToolCall {
            id: "1".into(),
            name: "new_answer".into(),
            arguments: serde_json::json!({"content": "42"}),
        };
        let chunks = simulate_stream("", vec![call]);
        let tool_calls_idx = chunks
            .iter()
            .position(|c| matches!(c, StreamChunk::ToolCalls { .. }))
            .expect("tool calls chunk present");
        let complete_idx = chunks
            .iter()
            .position(|c| matches!(c, StreamChunk::CompleteMessage { .. }))
            .expect("complete message chunk present");
        assert!(tool_calls_idx < complete_idx);
    }

    #[test]
    fn tool_call_recognizes_new_answer() {
        let call = ToolCall {
            id: "1".into(),
            name: "new_answer".into(),
            arguments: serde_json::json!({"content": "hello"}),
        };
        assert_eq!(call.as_new_answer(), Some("hello".to_string()));
        assert_eq!(call.as_vote(), None);
    }

    #[test]
    fn tool_call_recognizes_vote() {
        let call = ToolCall {
            id: "2".into(),
            name: "vote".into(),
            arguments: serde_json::json!({"agent_id": "a", "reason": "correct"}),
        };
        assert_eq!(
            call.as_vote(),
            Some(("a".to_string(), Some("correct".to_string())))
        );
    }

    #[test]
    fn extract_path_like_strings_finds_common_keys() {
        let args = serde_json::json!({"path": "/tmp/a.txt", "other": 1});
        assert_eq!(extract_path_like_strings(&args), vec!["/tmp/a.txt"]);
    }
}
