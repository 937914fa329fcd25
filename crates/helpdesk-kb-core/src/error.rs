//! Error taxonomy shared by every knowledge-base operation.

use thiserror::Error;

use crate::models::{RecordId, SourceKind};

/// Errors returned by knowledge-base operations.
///
/// Store operations are local and infallible apart from these cases, so
/// callers can match on the variant instead of parsing messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KbError {
    /// Update or delete referenced an id that is not in the collection.
    #[error("{kind} {id} not found")]
    NotFound { kind: SourceKind, id: RecordId },

    /// A training run was requested while another one is still in flight.
    #[error("training already in progress for agent '{agent_id}'")]
    AlreadyInProgress { agent_id: String },

    /// The change would push the knowledge base past its size limit.
    /// Only produced under [`QuotaPolicy::Enforce`](crate::store::QuotaPolicy::Enforce).
    #[error(
        "knowledge base quota exceeded: {requested} bytes requested, {available} of {limit} bytes available"
    )]
    QuotaExceeded {
        requested: u64,
        available: u64,
        limit: u64,
    },

    /// A required field was empty or malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl KbError {
    pub fn not_found(kind: SourceKind, id: RecordId) -> Self {
        KbError::NotFound { kind, id }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        KbError::InvalidInput(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, KbError::NotFound { .. })
    }
}

pub type KbResult<T> = Result<T, KbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = KbError::not_found(SourceKind::Qa, 7);
        assert_eq!(err.to_string(), "qa 7 not found");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_quota_message() {
        let err = KbError::QuotaExceeded {
            requested: 10,
            available: 4,
            limit: 100,
        };
        assert!(err.to_string().contains("10 bytes requested"));
        assert!(!err.is_not_found());
    }
}
