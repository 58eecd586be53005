//! Error types for console operations

use thiserror::Error;

use crate::domain::rule::OrderingError;

/// Errors that can occur while talking to the gateway
///
/// Transport-class failures (`Transport`, `Timeout`) and semantic
/// rejections (`Rejected`) are distinct variants on purpose: a timeout
/// says nothing about whether the kernel applied the request, while a
/// rejection means the kernel saw it and refused. Callers that hit a
/// transport failure should re-validate the current configuration to
/// learn the true state.
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// Gateway unreachable or the response was not a valid envelope
    #[error("transport error: {0}")]
    Transport(String),

    /// Request timed out; the kernel-side operation may or may not have run
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The kernel received the request and refused it
    #[error("kernel rejected the request (code {code}): {message}")]
    Rejected { code: i64, message: String },

    /// Some records of a change set were applied, the rest were not
    #[error("partial application: {applied} of {total} changes applied: {message}")]
    PartialApplication {
        applied: usize,
        total: usize,
        message: String,
    },

    /// Malformed rule permutation, caught locally before any round trip
    #[error(transparent)]
    Ordering(#[from] OrderingError),

    /// Payload could not be serialized or a reply could not be decoded
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for console operations
pub type ConsoleResult<T> = Result<T, ConsoleError>;

impl ConsoleError {
    /// True for failures of the transport class, where the outcome on the
    /// kernel side is unknown
    pub fn is_transport(&self) -> bool {
        matches!(self, ConsoleError::Transport(_) | ConsoleError::Timeout(_))
    }
}

impl From<serde_json::Error> for ConsoleError {
    fn from(err: serde_json::Error) -> Self {
        ConsoleError::Serialization(err.to_string())
    }
}
