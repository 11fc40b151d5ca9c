//! Error of a single fetch attempt, kept concrete for retry classification.

use std::fmt;

/// Error returned by one fetch attempt (curl failure, HTTP error, short body, local write).
/// Classified by the retry loop before it is turned into a `FetchError`.
#[derive(Debug)]
pub enum AttemptError {
    /// Curl reported an error (timeout, connection, DNS, etc.).
    Curl(curl::Error),
    /// HTTP response had a non-2xx status.
    Http(u32),
    /// Transfer completed but fewer bytes arrived than `Content-Length` announced
    /// (e.g. server closed early).
    PartialTransfer { expected: u64, received: u64 },
    /// Writing the body to the scratch file failed. Not retried.
    Storage(std::io::Error),
    /// The cancel token was set during the attempt.
    Cancelled,
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Curl(e) => write!(f, "{}", e),
            AttemptError::Http(code) => write!(f, "HTTP {}", code),
            AttemptError::PartialTransfer { expected, received } => {
                write!(f, "truncated transfer: expected {} bytes, got {}", expected, received)
            }
            AttemptError::Storage(e) => write!(f, "storage: {}", e),
            AttemptError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for AttemptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AttemptError::Curl(e) => Some(e),
            AttemptError::Storage(e) => Some(e),
            AttemptError::Http(_) | AttemptError::PartialTransfer { .. } | AttemptError::Cancelled => {
                None
            }
        }
    }
}
