//! Error types for MTOM/XOP decoding.

use std::fmt;

/// Result type alias for decoding operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Resource limit that a message can exceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// Length of the multipart boundary token.
    BoundaryLength,
    /// Number of parts in one envelope.
    PartCount,
    /// Cumulative size of all part bodies.
    BodySize,
    /// Size of one part's header block.
    HeaderSize,
    /// Number of header lines in one part.
    HeaderCount,
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BoundaryLength => write!(f, "boundary length"),
            Self::PartCount => write!(f, "part count"),
            Self::BodySize => write!(f, "cumulative body size"),
            Self::HeaderSize => write!(f, "part header size"),
            Self::HeaderCount => write!(f, "part header count"),
        }
    }
}

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input is malformed.
    Format,
    /// The input exceeds a configured limit.
    LimitExceeded,
    /// The underlying stream failed.
    Io,
    /// The wrapped message codec failed.
    Codec,
}

/// Decoding error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed envelope, part, or reference.
    #[error("Malformed message: {0}")]
    Format(String),

    /// The root document is not well-formed XML.
    #[error("Invalid XML: {0}")]
    Xml(String),

    /// A configured resource limit was exceeded.
    #[error("{limit} limit exceeded: {actual} > {max}")]
    LimitExceeded {
        /// Which limit tripped.
        limit: Limit,
        /// Observed value.
        actual: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Error raised by the wrapped message codec.
    #[error("Message codec error: {0}")]
    Codec(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Creates a format error.
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }

    /// Creates a limit error.
    #[must_use]
    pub const fn limit(limit: Limit, actual: usize, max: usize) -> Self {
        Self::LimitExceeded { limit, actual, max }
    }

    /// Wraps an error raised by a message codec.
    pub fn codec(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Codec(err.into())
    }

    /// Returns the classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::Format(_) | Self::Xml(_) => ErrorKind::Format,
            Self::LimitExceeded { .. } => ErrorKind::LimitExceeded,
            Self::Codec(_) => ErrorKind::Codec,
        }
    }

    /// Returns true for malformed input.
    #[must_use]
    pub const fn is_format(&self) -> bool {
        matches!(self.kind(), ErrorKind::Format)
    }

    /// Returns true when a resource limit was exceeded.
    #[must_use]
    pub const fn is_limit_exceeded(&self) -> bool {
        matches!(self.kind(), ErrorKind::LimitExceeded)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind() {
        assert_eq!(Error::format("x").kind(), ErrorKind::Format);
        assert_eq!(Error::Xml("x".into()).kind(), ErrorKind::Format);
        assert!(Error::limit(Limit::PartCount, 3, 2).is_limit_exceeded());
        assert_eq!(Error::codec("inner").kind(), ErrorKind::Codec);
    }

    #[test]
    fn test_limit_display() {
        let err = Error::limit(Limit::BoundaryLength, 71, 70);
        assert_eq!(err.to_string(), "boundary length limit exceeded: 71 > 70");
    }
}
