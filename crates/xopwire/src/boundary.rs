//! Multipart boundary extraction and validation.

use std::fmt;

use crate::content_type::ContentType;
use crate::error::{Error, Limit, Result};

/// Validated multipart boundary token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary(String);

impl Boundary {
    /// Extracts the `boundary` parameter from a content type header.
    ///
    /// One layer of surrounding double quotes is removed.
    ///
    /// # Errors
    ///
    /// Returns a format error if the parameter is missing, empty, or
    /// malformed, and a limit error if it is longer than `length_limit`.
    pub fn resolve(content_type: &str, length_limit: usize) -> Result<Self> {
        let parsed = ContentType::parse(content_type)?;
        let token = parsed
            .boundary()
            .ok_or_else(|| Error::format("content type has no boundary parameter"))?;
        Self::new(token, length_limit)
    }

    /// Validates an already unquoted boundary token.
    ///
    /// # Errors
    ///
    /// See [`Boundary::resolve`].
    pub fn new(token: &str, length_limit: usize) -> Result<Self> {
        if token.is_empty() {
            return Err(Error::format("empty boundary"));
        }
        if token.len() > length_limit {
            return Err(Error::limit(Limit::BoundaryLength, token.len(), length_limit));
        }
        if token.bytes().any(|b| b == b'\r' || b == b'\n' || !b.is_ascii()) {
            return Err(Error::format(format!("boundary has invalid characters: {token:?}")));
        }
        Ok(Self(token.to_string()))
    }

    /// Returns the token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the in-body delimiter, `CRLF--boundary`.
    #[must_use]
    pub fn delimiter(&self) -> Vec<u8> {
        let mut delimiter = Vec::with_capacity(self.0.len() + 4);
        delimiter.extend_from_slice(b"\r\n--");
        delimiter.extend_from_slice(self.0.as_bytes());
        delimiter
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
