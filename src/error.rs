use std::fmt;

use crate::transaction::TransactionId;

pub type Result<T> = std::result::Result<T, Error>;

/// Why a transaction was told to abort
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The lock wait bound elapsed before the lock was granted
    LockTimeout,
    /// Granting the lock would have closed a cycle in the wait-for graph
    Deadlock,
}

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    /// Storage-consistency violation; a caller logic error, never retryable
    Storage(String),
    TransactionAborted {
        tx: TransactionId,
        reason: AbortReason,
    },
    /// Cache is full and every resident page is pinned by a live transaction
    CacheExhausted {
        capacity: usize,
    },
    IteratorProtocol(&'static str),
    /// Operator built or driven with arguments that cannot work
    InvalidOperation(String),
    Codec(String),
}

impl Error {
    /// True only for errors that ask the transaction to abort and retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransactionAborted { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Storage(msg) => write!(f, "Storage error: {}", msg),
            Error::TransactionAborted { tx, reason } => match reason {
                AbortReason::LockTimeout => {
                    write!(f, "Transaction {} aborted: lock wait timed out", tx)
                }
                AbortReason::Deadlock => write!(f, "Transaction {} aborted: deadlock", tx),
            },
            Error::CacheExhausted { capacity } => write!(
                f,
                "Page cache exhausted: all {} pages are held by live transactions",
                capacity
            ),
            Error::IteratorProtocol(msg) => write!(f, "Iterator protocol violation: {}", msg),
            Error::InvalidOperation(msg) => write!(f, "Invalid operation: {}", msg),
            Error::Codec(msg) => write!(f, "Codec error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<bincode::error::EncodeError> for Error {
    fn from(err: bincode::error::EncodeError) -> Self {
        Error::Codec(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for Error {
    fn from(err: bincode::error::DecodeError) -> Self {
        Error::Codec(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_aborts_are_retryable() {
        let tx = TransactionId::new();
        let abort = Error::TransactionAborted {
            tx,
            reason: AbortReason::Deadlock,
        };
        assert!(abort.is_retryable());
        assert!(!Error::CacheExhausted { capacity: 4 }.is_retryable());
        assert!(!Error::Storage("slot 3 is empty".into()).is_retryable());
        assert!(!Error::IteratorProtocol("next before open").is_retryable());
    }

    #[test]
    fn test_display_names_transaction() {
        let tx = TransactionId::new();
        let err = Error::TransactionAborted {
            tx,
            reason: AbortReason::LockTimeout,
        };
        assert!(err.to_string().contains(&tx.to_string()));
    }
}
