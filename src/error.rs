//! Error taxonomy for the query engine
//!
//! Four kinds of failure: configuration, capability (embedding/LLM calls),
//! data integrity, and validation. Only transient capability failures are
//! ever retried; everything else is fatal and names the offending
//! id/field/mode in its message.

/// Classification of a capability (embedding or language-model) failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityErrorKind {
    /// The service rejected the call due to rate limiting.
    RateLimited,
    /// The service is temporarily unavailable (5xx, overloaded).
    Unavailable,
    /// The connection failed or timed out before a response arrived.
    Connection,
    /// Any other failure (auth, bad request, malformed response).
    Other,
}

impl CapabilityErrorKind {
    /// Whether this failure kind is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CapabilityErrorKind::RateLimited
                | CapabilityErrorKind::Unavailable
                | CapabilityErrorKind::Connection
        )
    }
}

/// Errors produced by the query engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid configuration: non-positive chunk budget, overlap >= chunk
    /// size, unknown index-kind/mode combination, missing required field.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An embedding or language-model call failed.
    #[error("capability error ({kind:?}): {message}")]
    Capability {
        kind: CapabilityErrorKind,
        message: String,
    },

    /// A reference to a missing node id, unknown document id, or
    /// unresolvable composite member.
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    /// Rejected input: duplicate document id without overwrite permission,
    /// node without text, malformed snapshot.
    #[error("validation error: {0}")]
    Validation(String),
}

impl EngineError {
    /// Shorthand for a capability error of the given kind.
    pub fn capability(kind: CapabilityErrorKind, message: impl Into<String>) -> Self {
        EngineError::Capability {
            kind,
            message: message.into(),
        }
    }

    /// Whether this error may be retried with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Capability { kind, .. } => kind.is_transient(),
            _ => false,
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(EngineError::capability(CapabilityErrorKind::RateLimited, "429").is_transient());
        assert!(EngineError::capability(CapabilityErrorKind::Connection, "reset").is_transient());
        assert!(!EngineError::capability(CapabilityErrorKind::Other, "bad key").is_transient());
        assert!(!EngineError::Configuration("overlap >= chunk size".into()).is_transient());
        assert!(!EngineError::DataIntegrity("node x not found".into()).is_transient());
    }

    #[test]
    fn test_error_messages_name_the_cause() {
        let err = EngineError::DataIntegrity("node id abc-123 not found".into());
        assert!(err.to_string().contains("abc-123"));
    }
}
