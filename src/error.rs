use thiserror::Error;

/// audiopump's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// audiopump's crate-wide error type.
///
/// This is intentionally decoupled from `anyhow` so hosts can map every failure onto one of a
/// small set of categories (see [`ErrorCategory`]) without string matching.
#[derive(Debug, Error)]
pub enum Error {
    /// The source does not exist (missing file, HTTP 404, ...).
    #[error("not found: {0}")]
    NotFound(String),

    /// Any I/O-level failure: unreadable source, failed seek, refused sink growth or a failed
    /// resampler.
    #[error("{message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// The source was read but cannot be handled: unknown container, low probe score, missing
    /// decoder or DRM.
    #[error("unsupported audio content: {0}")]
    Unsupported(String),

    /// An audio-stream ordinal past the number of audio streams in the container.
    #[error("audio stream index {index} out of range ({available} audio streams)")]
    IndexOutOfRange { index: usize, available: usize },

    /// A single packet could not be decoded. The pump treats this as recoverable.
    #[error("failed to decode packet: {0}")]
    Decode(String),
}

/// The host-facing error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    Io,
    Unsupported,
    IndexOutOfRange,
}

impl Error {
    pub(crate) fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn io_with(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(source),
        }
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// Map this error onto the category a host surfaces to its callers.
    ///
    /// A stray [`Error::Decode`] that escapes the pump is reported as unsupported content.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::Io { .. } => ErrorCategory::Io,
            Self::Unsupported(_) | Self::Decode(_) => ErrorCategory::Unsupported,
            Self::IndexOutOfRange { .. } => ErrorCategory::IndexOutOfRange,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(err.to_string())
        } else {
            Self::Io {
                message: err.to_string(),
                source: Some(err),
            }
        }
    }
}
