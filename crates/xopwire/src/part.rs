//! MIME part structure and classification.

use std::ops::Range;

use bytes::Bytes;

use crate::content_type::{parse_parameters, split_segments};
use crate::error::{Error, Result};
use crate::header::Headers;

/// Body bytes of a part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartBody {
    /// Bytes copied out of the stream into a buffer owned by the part.
    Owned(Bytes),
    /// A range of a larger buffer holding the whole pre-read envelope.
    Shared {
        /// The whole envelope.
        source: Bytes,
        /// Location of this body inside `source`.
        range: Range<usize>,
    },
}

impl PartBody {
    /// Returns the body bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Owned(bytes) => bytes,
            Self::Shared { source, range } => &source[range.clone()],
        }
    }

    /// Body length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Owned(bytes) => bytes.len(),
            Self::Shared { range, .. } => range.len(),
        }
    }

    /// Returns true for an empty body.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the body as a cheaply cloneable buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Self::Owned(bytes) => bytes.clone(),
            Self::Shared { source, range } => source.slice(range.clone()),
        }
    }
}

/// Parsed `Content-Disposition` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDisposition {
    /// Disposition type, lowercased (e.g., "attachment", "form-data").
    pub disposition: String,
    /// Parameters in declaration order, names lowercased.
    pub parameters: Vec<(String, String)>,
}

impl ContentDisposition {
    /// Parses a `Content-Disposition` value.
    ///
    /// # Errors
    ///
    /// Returns a format error if the value is empty or malformed.
    pub fn parse(s: &str) -> Result<Self> {
        let mut segments = split_segments(s)?.into_iter();
        let disposition = segments.next().unwrap_or_default().trim();
        if disposition.is_empty()
            || !disposition
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
        {
            return Err(Error::format(format!("invalid content disposition: {s:?}")));
        }

        Ok(Self {
            disposition: disposition.to_ascii_lowercase(),
            parameters: parse_parameters(segments)?,
        })
    }

    /// Returns a parameter value by case-insensitive name.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the `name` parameter.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.parameter("name")
    }

    /// Returns the `filename` parameter.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.parameter("filename")
            .or_else(|| self.parameter("filename*"))
    }
}

/// Classification of a multipart section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    /// Binary content: an attachment, a file upload, or an undispositioned
    /// MTOM part.
    Binary,
    /// A form field without a file name.
    FormField,
}

impl PartKind {
    /// Classifies a section by its disposition.
    ///
    /// # Errors
    ///
    /// Returns a format error for a disposition that is neither an
    /// attachment nor form data.
    pub fn classify(disposition: Option<&ContentDisposition>) -> Result<Self> {
        let Some(disposition) = disposition else {
            return Ok(Self::Binary);
        };
        match disposition.disposition.as_str() {
            "attachment" | "inline" => Ok(Self::Binary),
            "form-data" if disposition.filename().is_some() => Ok(Self::Binary),
            "form-data" => Ok(Self::FormField),
            other => Err(Error::format(format!(
                "unclassifiable content disposition: {other:?}"
            ))),
        }
    }
}

/// One section of a multipart envelope.
#[derive(Debug, Clone)]
pub struct Part {
    headers: Headers,
    content_disposition: Option<ContentDisposition>,
    kind: PartKind,
    body: PartBody,
}

impl Part {
    /// Creates a part, parsing and classifying its disposition.
    ///
    /// # Errors
    ///
    /// Returns a format error if the disposition is unparsable or
    /// unclassifiable.
    pub fn new(headers: Headers, body: PartBody) -> Result<Self> {
        let content_disposition = headers
            .get("content-disposition")
            .map(ContentDisposition::parse)
            .transpose()?;
        let kind = PartKind::classify(content_disposition.as_ref())?;

        Ok(Self {
            headers,
            content_disposition,
            kind,
            body,
        })
    }

    /// Part headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Raw `Content-Type` value.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    /// Parsed `Content-Disposition`.
    #[must_use]
    pub const fn content_disposition(&self) -> Option<&ContentDisposition> {
        self.content_disposition.as_ref()
    }

    /// Raw `Content-ID` value, normally `<identifier>`.
    #[must_use]
    pub fn content_id(&self) -> Option<&str> {
        self.headers.get("content-id")
    }

    /// `Content-ID` with surrounding angle brackets removed.
    #[must_use]
    pub fn bare_content_id(&self) -> Option<&str> {
        self.content_id().map(strip_angle_brackets)
    }

    /// Section classification.
    #[must_use]
    pub const fn kind(&self) -> PartKind {
        self.kind
    }

    /// Part body.
    #[must_use]
    pub const fn body(&self) -> &PartBody {
        &self.body
    }
}

/// Removes one pair of surrounding `<` `>`.
#[must_use]
pub fn strip_angle_brackets(id: &str) -> &str {
    let id = id.trim();
    id.strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(id)
}
