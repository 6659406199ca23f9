//! Ledger error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A complete line that is not valid JSON, or a record whose
    /// identity fields are unusable. Trailing partial lines from an
    /// interrupted write are tolerated, this is not that.
    #[error("ledger integrity error at line {line}: {message}")]
    Integrity { line: usize, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LedgerError {
    pub fn integrity(line: usize, message: impl Into<String>) -> Self {
        Self::Integrity {
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
