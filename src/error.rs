//! Error types for splitpath.

use std::fmt;
use std::io;

use thiserror::Error;

/// Result type alias for splitpath operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for splitpath.
#[derive(Error, Debug)]
pub enum Error {
    // Caller contract errors
    #[error("unknown egress interface: {0}")]
    UnknownInterface(String),

    #[error("invalid prefix: {0}")]
    InvalidPrefix(String),

    #[error("invalid weight {weight} for interface {interface}")]
    InvalidWeight { interface: String, weight: f64 },

    // Locking errors
    #[error("timed out acquiring {mode} lock on {table}")]
    LockTimeout { table: &'static str, mode: LockMode },

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Mode a table lock was requested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Read,
    Write,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Read => f.write_str("read"),
            LockMode::Write => f.write_str("write"),
        }
    }
}

impl Error {
    /// Check if error is recoverable (the operation may simply be retried).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::LockTimeout { .. } | Error::Io(_))
    }

    /// Check if error is a caller contract violation.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Error::UnknownInterface(_) | Error::InvalidPrefix(_) | Error::InvalidWeight { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let timeout = Error::LockTimeout {
            table: "rstable",
            mode: LockMode::Write,
        };
        assert!(timeout.is_recoverable());
        assert!(!timeout.is_contract_violation());
        assert_eq!(timeout.to_string(), "timed out acquiring write lock on rstable");

        let unknown = Error::UnknownInterface("eth9".into());
        assert!(unknown.is_contract_violation());
        assert!(!unknown.is_recoverable());
    }
}
