//! Error types for cross-context coordination

use super::messages::ContextId;

/// Failures in the coordination layer
///
/// Timeouts are first-class here: a torn-down execution context must
/// surface as a typed error, never as a caller hung forever.
#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    /// Named-lock acquisition exceeded its deadline
    #[error("lock '{name}' acquisition timed out after {timeout_ms} ms")]
    LockTimeout { name: String, timeout_ms: u64 },

    /// No response envelope arrived within the request deadline
    #[error("request '{kind}' to {context:?} timed out after {timeout_ms} ms")]
    RequestTimeout {
        kind: String,
        context: ContextId,
        timeout_ms: u64,
    },

    /// The target context has no registered inbox
    #[error("no context registered for {0:?}")]
    ContextUnavailable(ContextId),

    /// The responder dropped its channel before answering
    #[error("channel closed while awaiting response for '{0}'")]
    ChannelClosed(String),
}
