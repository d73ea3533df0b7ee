//! Tool dispatch (spec §4.4 step 3, §6 "Tool handler contract").
//!
//! `new_answer` and `vote` are reserved names handled by the orchestrator
//! itself and never reach a `ToolHandler`; everything else is dispatched
//! through one, with filesystem-affecting calls additionally checked by the
//! Path Permission Manager first.

use async_trait::async_trait;
use massgen_protocol::ToolResult;

use crate::agent::AgentContext;

/// Tool names the orchestrator intercepts before dispatch (spec §6).
pub const RESERVED_COORDINATION_TOOLS: &[&str] = &["new_answer", "vote"];

pub fn is_coordination_tool(name: &str) -> bool {
    RESERVED_COORDINATION_TOOLS.contains(&name)
}

/// Executes a non-coordination tool call (spec §6 "Tool handler contract").
/// No implementation ships in this crate; tests use an in-memory fake.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(
        &self,
        name: &str,
        arguments: serde_json::Value,
        ctx: &AgentContext,
    ) -> ToolResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_reserved_names() {
        assert!(is_coordination_tool("new_answer"));
        assert!(is_coordination_tool("vote"));
        assert!(!is_coordination_tool("read_file"));
    }
}
