use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Error taxonomy for the coordination core (spec §7). Every variant
/// corresponds to a named error kind in the spec; there is no catch-all
/// "other" bucket so callers can match exhaustively on propagation policy.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Backend I/O failure. Not fatal to the turn: the originating agent
    /// transitions to `Failed` and the turn continues.
    #[error("transport error talking to backend for agent {agent_id}: {message}")]
    Transport { agent_id: String, message: String },

    /// Malformed chunk, a chunk observed after `Done`, or an unrecognized
    /// coordination target. The offending chunk is discarded; the agent may
    /// continue.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Filesystem access rejected by the Path Permission Manager.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Durable persistence failed after retries were exhausted.
    #[error("storage error: {0}")]
    Storage(String),

    /// Per-attempt budget exceeded.
    #[error("attempt timed out after {0:?}")]
    TimeoutExceeded(std::time::Duration),

    /// Max restarts per turn exceeded.
    #[error("restart budget exhausted after {0} restarts")]
    RestartExhausted(u32),

    /// Benign: expected during restart or shutdown.
    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// A user-facing rendering with no internal detail leaked (spec §7: no
    /// stack traces or raw transport errors on the user surface).
    pub fn user_message(&self) -> String {
        match self {
            CoreError::Transport { agent_id, .. } => {
                format!("agent '{agent_id}' lost its connection to the backend")
            }
            CoreError::PermissionDenied(reason) => format!("blocked: {reason}"),
            CoreError::TimeoutExceeded(_) => {
                "the attempt took too long and was cancelled".to_string()
            }
            CoreError::RestartExhausted(n) => {
                format!("gave up after {n} restarts without a usable answer")
            }
            CoreError::Cancelled => "cancelled".to_string(),
            other => other.to_string(),
        }
    }

    /// Whether this error is the originating agent's problem (transitions it
    /// to `Failed` and lets the turn continue) or fatal to the whole attempt.
    pub fn is_agent_local(&self) -> bool {
        matches!(self, CoreError::Transport { .. } | CoreError::Protocol(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_hides_transport_detail() {
        let err = CoreError::Transport {
            agent_id: "agent_a".to_string(),
            message: "connection reset by peer on port 9999".to_string(),
        };
        let msg = err.user_message();
        assert_eq!(msg, "agent 'agent_a' lost its connection to the backend");
        assert!(!msg.contains("9999"));
    }

    #[test]
    fn user_message_passes_through_storage_detail() {
        let err = CoreError::Storage("rename failed: disk full".to_string());
        assert_eq!(
            err.user_message(),
            "storage error: rename failed: disk full"
        );
    }

    #[test]
    fn transport_and_protocol_are_agent_local() {
        assert!(
            CoreError::Transport {
                agent_id: "a".to_string(),
                message: "x".to_string()
            }
            .is_agent_local()
        );
        assert!(CoreError::Protocol("bad chunk".to_string()).is_agent_local());
        assert!(!CoreError::Cancelled.is_agent_local());
    }
}
