/// Convenience result type used across framereel.
pub type ReelResult<T> = Result<T, ReelError>;

/// Top-level error taxonomy surfaced to callers of a conversion.
#[derive(thiserror::Error, Debug)]
pub enum ReelError {
    /// Caller-provided arguments are unusable (empty frame list, missing output, bad fps).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An input image could not be decoded.
    ///
    /// Per-frame decode failures are absorbed by the pipeline; this only escapes when no
    /// frame at all could be decoded.
    #[error("decode failure: {0}")]
    DecodeFailure(String),

    /// The encoder broke the buffer-exchange contract (e.g. a second format change).
    #[error("encoder protocol violation: {0}")]
    EncoderProtocolViolation(String),

    /// Unexpected failure while driving the encoder or the muxer.
    #[error("encoder/muxer fault: {0}")]
    EncoderOrMuxerFault(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Machine-readable error category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ErrorKind {
    /// See [`ReelError::InvalidInput`].
    InvalidInput,
    /// See [`ReelError::DecodeFailure`].
    DecodeFailure,
    /// See [`ReelError::EncoderProtocolViolation`].
    EncoderProtocolViolation,
    /// See [`ReelError::EncoderOrMuxerFault`] and [`ReelError::Other`].
    EncoderOrMuxerFault,
}

impl ErrorKind {
    /// Stable code string for host applications.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::DecodeFailure => "DECODE_FAILURE",
            ErrorKind::EncoderProtocolViolation => "ENCODER_PROTOCOL_VIOLATION",
            ErrorKind::EncoderOrMuxerFault => "ENCODER_OR_MUXER_FAULT",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl ReelError {
    /// Build a [`ReelError::InvalidInput`] value.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Build a [`ReelError::DecodeFailure`] value.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::DecodeFailure(msg.into())
    }

    /// Build a [`ReelError::EncoderProtocolViolation`] value.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::EncoderProtocolViolation(msg.into())
    }

    /// Build a [`ReelError::EncoderOrMuxerFault`] value.
    pub fn fault(msg: impl Into<String>) -> Self {
        Self::EncoderOrMuxerFault(msg.into())
    }

    /// Category of this error.
    ///
    /// Wrapped dependency errors (IO while writing the container, process plumbing) count as
    /// encoder/muxer faults.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReelError::InvalidInput(_) => ErrorKind::InvalidInput,
            ReelError::DecodeFailure(_) => ErrorKind::DecodeFailure,
            ReelError::EncoderProtocolViolation(_) => ErrorKind::EncoderProtocolViolation,
            ReelError::EncoderOrMuxerFault(_) | ReelError::Other(_) => {
                ErrorKind::EncoderOrMuxerFault
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
