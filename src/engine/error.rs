//! Error types for search engine calls

/// Result type for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors returned by a [`SearchEngine`](super::SearchEngine) implementation
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// Transport or connection failure; never retried by this crate
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    /// The engine answered with an error status
    #[error("Engine rejected request ({status} {kind}): {reason}")]
    Rejected {
        status: u16,
        kind: String,
        reason: String,
    },

    /// The engine answered with a body that could not be decoded
    #[error("Failed to decode engine response: {0}")]
    Decode(String),
}

impl EngineError {
    pub fn rejected(status: u16, kind: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::Rejected {
            status,
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::Rejected { status: 404, .. })
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Decode(err.to_string())
    }
}
