use thiserror::Error;

/// Failures of the transcript transforms.
///
/// Unknown raw message kinds are not errors; they contribute nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptError {
    #[error("user message '{id}' has neither text nor an image")]
    EmptyUserMessage { id: String },

    #[error("invalid data URL: {reason}")]
    InvalidDataUrl { reason: String },

    #[error("unsupported image MIME type '{mime_type}'; expected image/*")]
    UnsupportedImageMime { mime_type: String },

    #[error("missing session context: {missing}")]
    MissingSessionContext { missing: &'static str },

    #[error("unknown tool phase '{0}'; expected 'start' or 'end'")]
    UnknownToolPhase(String),
}

impl TranscriptError {
    #[must_use]
    pub fn invalid_data_url(reason: impl Into<String>) -> Self {
        Self::InvalidDataUrl {
            reason: reason.into(),
        }
    }
}
