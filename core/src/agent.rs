//! An agent's static identity (spec §3 "Agent"): a system prompt, a backend
//! handle, a dedicated workspace, and optional read-only context paths.

use std::sync::Arc;

use crate::backend::Backend;
use crate::permission::ManagedPath;
use crate::permission::PermissionManager;

pub struct Agent {
    pub agent_id: String,
    pub system_prompt: String,
    pub backend: Arc<dyn Backend>,
    pub workspace: ManagedPath,
    pub context_paths: Vec<ManagedPath>,
}

impl Agent {
    pub fn new(
        agent_id: impl Into<String>,
        system_prompt: impl Into<String>,
        backend: Arc<dyn Backend>,
        workspace: ManagedPath,
        context_paths: Vec<ManagedPath>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            system_prompt: system_prompt.into(),
            backend,
            workspace,
            context_paths,
        }
    }

    /// Build the permission manager for one attempt: the agent's own
    /// workspace (writable) plus every granted context path (read-only,
    /// regardless of what permission the caller set on them — spec §3
    /// "Workspace": "the agent may read them, but never owns them").
    pub fn permission_manager(&self) -> PermissionManager {
        let mut managed = vec![self.workspace.clone()];
        for ctx in &self.context_paths {
            managed.push(ManagedPath::read_only(ctx.path.clone()));
        }
        PermissionManager::new(managed)
    }
}

/// Context handed to a `ToolHandler` call: which agent is calling and what
/// its permission manager currently allows.
pub struct AgentContext {
    pub agent_id: String,
    pub permissions: Arc<PermissionManager>,
}
