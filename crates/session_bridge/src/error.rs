use std::time::Duration;

use session_store::SessionStoreError;
use thiserror::Error;
use transcript::TranscriptError;

use crate::protocol::{ErrorKind, Outcome, RequestId};

/// Failure seen by the UI side of the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge transport disconnected")]
    Disconnected,

    #[error("request {id} timed out after {timeout:?}")]
    Timeout { id: RequestId, timeout: Duration },

    #[error("agent host rejected request ({kind}): {message}")]
    Remote { kind: ErrorKind, message: String },

    #[error("unexpected response body for '{command}'")]
    UnexpectedBody { command: &'static str },
}

impl BridgeError {
    /// Remote error kind, if the host answered with an error outcome.
    #[must_use]
    pub fn remote_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Remote { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Host-side request failure, converted into an error outcome on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub(crate) struct HostError {
    pub kind: ErrorKind,
    pub message: String,
}

impl HostError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<SessionStoreError> for HostError {
    fn from(error: SessionStoreError) -> Self {
        let kind = match &error {
            SessionStoreError::ThreadNotFound { .. } => ErrorKind::ThreadNotFound,
            SessionStoreError::InvalidThreadId { .. } | SessionStoreError::ThreadExists { .. } => {
                ErrorKind::InvalidRequest
            }
            _ => ErrorKind::StoreFailure,
        };
        Self::new(kind, error.to_string())
    }
}

impl From<TranscriptError> for HostError {
    fn from(error: TranscriptError) -> Self {
        let kind = match &error {
            TranscriptError::MissingSessionContext { .. } => ErrorKind::MissingSessionContext,
            _ => ErrorKind::AgentFailed,
        };
        Self::new(kind, error.to_string())
    }
}

impl From<HostError> for Outcome {
    fn from(error: HostError) -> Self {
        Outcome::error(error.kind, error.message)
    }
}
