//! Error types for ChainSign

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// Persisted chain could not be read or parsed.
    #[error("Initialization failure: {0}")]
    InitializationFailure(String),
    /// The durable copy could not be rewritten after an in-memory append.
    #[error("Persistence write failure: {0}")]
    PersistenceWriteFailure(String),
    #[error("Mining gave up after {attempts} attempts without an admissible hash")]
    MiningAttemptsExceeded { attempts: u64 },
    #[error("Chain is empty")]
    EmptyChain,
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChainError {
    /// Whether the caller may simply try the same operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChainError::MiningAttemptsExceeded { .. })
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_mining_exhaustion_is_retryable() {
        assert!(ChainError::MiningAttemptsExceeded { attempts: 10 }.is_retryable());
        assert!(!ChainError::EmptyChain.is_retryable());
        assert!(!ChainError::PersistenceWriteFailure("disk full".into()).is_retryable());
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            ChainError::MiningAttemptsExceeded { attempts: 42 }.to_string(),
            "Mining gave up after 42 attempts without an admissible hash"
        );
        assert_eq!(ChainError::EmptyChain.to_string(), "Chain is empty");
    }
}
