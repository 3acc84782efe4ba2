use thiserror::Error;

/// Failures raised while a strategy is running.
///
/// Validation problems are not errors in this sense; they are returned as
/// [`crate::validation::ValidationError`] values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Invalid configuration in block '{block}': {message}")]
    Config { block: String, message: String },

    #[error("Block '{block}' failed: {message}")]
    Execution { block: String, message: String },

    #[error("Market data unavailable: {0}")]
    MarketData(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    /// Wallet rejection, RPC failure or program revert on the on-chain path.
    /// The message is surfaced verbatim.
    #[error("{0}")]
    Transaction(String),
}

impl EngineError {
    pub fn config(block: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            block: block.into(),
            message: message.into(),
        }
    }

    pub fn execution(block: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            block: block.into(),
            message: message.into(),
        }
    }

    /// Transient failures worth another attempt. Configuration and
    /// on-chain failures are escalated instead.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Execution { .. } | Self::MarketData(_))
    }
}

/// Rejected graph mutations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Block '{0}' not found")]
    UnknownBlock(String),

    #[error("Block '{0}' already exists")]
    DuplicateBlock(String),

    #[error("Connection '{0}' not found")]
    UnknownConnection(String),

    #[error("Block '{0}' cannot connect to itself")]
    SelfLoop(String),

    #[error("Block '{block}' has no config field '{field}'")]
    FixedConfigKey { block: String, field: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(EngineError::execution("b", "boom").is_retryable());
        assert!(EngineError::MarketData("timeout".into()).is_retryable());
        assert!(!EngineError::config("b", "bad").is_retryable());
        assert!(!EngineError::Transaction("reverted".into()).is_retryable());
        assert!(!EngineError::Wallet("rejected".into()).is_retryable());
    }

    #[test]
    fn transaction_message_is_verbatim() {
        let e = EngineError::Transaction("User rejected the request.".into());
        assert_eq!(e.to_string(), "User rejected the request.");
    }
}
