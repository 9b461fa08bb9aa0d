//! MIME content type handling and XOP content negotiation.

use crate::error::{Error, Result};
use std::fmt;

/// Media type of an XOP-packaged root part.
pub const XOP_XML: &str = "application/xop+xml";

/// Media type of an MTOM envelope.
pub const MULTIPART_RELATED: &str = "multipart/related";

/// MIME content type with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "multipart", "application").
    pub main_type: String,
    /// Subtype (e.g., "related", "xop+xml").
    pub sub_type: String,
    /// Parameters in declaration order, names lowercased.
    pub parameters: Vec<(String, String)>,
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            parameters: Vec::new(),
        }
    }

    /// Adds or replaces a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_parameter(key, value);
        self
    }

    /// Sets a parameter, keeping its position if already present.
    pub fn set_parameter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into().to_ascii_lowercase();
        let value = value.into();
        match self.parameters.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.parameters.push((key, value)),
        }
    }

    /// Returns a parameter value by case-insensitive name.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameter("charset")
    }

    /// Returns the boundary parameter if present.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameter("boundary")
    }

    /// Returns the `start` parameter if present.
    #[must_use]
    pub fn start(&self) -> Option<&str> {
        self.parameter("start")
    }

    /// Returns `type/subtype` without parameters.
    #[must_use]
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.main_type, self.sub_type)
    }

    /// Checks the media type, ignoring case and parameters.
    #[must_use]
    pub fn is(&self, mime_type: &str) -> bool {
        mime_type.split_once('/').is_some_and(|(main, sub)| {
            self.main_type.eq_ignore_ascii_case(main) && self.sub_type.eq_ignore_ascii_case(sub)
        })
    }

    /// Parses a content type string.
    ///
    /// Format: `type/subtype; param1=value1; param2="quoted; value"`
    ///
    /// # Errors
    ///
    /// Returns an error if the media type or a parameter is malformed.
    pub fn parse(s: &str) -> Result<Self> {
        let mut segments = split_segments(s)?.into_iter();

        let type_str = segments.next().unwrap_or_default().trim();
        let (main_type, sub_type) = type_str
            .split_once('/')
            .ok_or_else(|| Error::format(format!("content type without subtype: {type_str:?}")))?;
        let main_type = main_type.trim();
        let sub_type = sub_type.trim();
        if main_type.is_empty() || sub_type.is_empty() {
            return Err(Error::format(format!("empty media type: {type_str:?}")));
        }

        let mut content_type = Self::new(main_type.to_lowercase(), sub_type.to_lowercase());
        content_type.parameters = parse_parameters(segments)?;
        Ok(content_type)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let main = &self.main_type;
        let sub = &self.sub_type;
        write!(f, "{main}/{sub}")?;

        for (key, value) in &self.parameters {
            // Quote value if it contains special characters
            if value.is_empty()
                || value.contains(|c: char| c.is_whitespace() || "()<>@,;:\\\"/[]?=".contains(c))
            {
                let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "; {key}=\"{escaped}\"")?;
            } else {
                write!(f, "; {key}={value}")?;
            }
        }

        Ok(())
    }
}

/// Returns true if `content_type` names an MTOM envelope.
///
/// The header must contain a `multipart/related` segment and a
/// `type="application/xop+xml"` parameter, in any order and letter case.
#[must_use]
pub fn is_xop_multipart(content_type: &str) -> bool {
    let mut related = false;
    let mut xop = false;

    for segment in content_type.split(';').map(str::trim) {
        if segment.eq_ignore_ascii_case(MULTIPART_RELATED) {
            related = true;
        } else if let Some((key, value)) = segment.split_once('=') {
            if key.trim().eq_ignore_ascii_case("type")
                && unquote(value.trim()).eq_ignore_ascii_case(XOP_XML)
            {
                xop = true;
            }
        }
    }

    related && xop
}

/// Parses `name=value` segments, stripping one layer of quotes from values.
pub(crate) fn parse_parameters<'a>(
    segments: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<(String, String)>> {
    let mut parameters = Vec::new();

    for segment in segments {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let (key, value) = segment
            .split_once('=')
            .ok_or_else(|| Error::format(format!("parameter without value: {segment:?}")))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::format(format!("parameter without name: {segment:?}")));
        }
        parameters.push((key.to_ascii_lowercase(), unquote_strict(value.trim())?));
    }

    Ok(parameters)
}

/// Splits a header value on `;` outside double-quoted strings.
pub(crate) fn split_segments(s: &str) -> Result<Vec<&str>> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                segments.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if in_quotes {
        return Err(Error::format(format!("unterminated quoted string in {s:?}")));
    }
    segments.push(&s[start..]);
    Ok(segments)
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn unquote_strict(value: &str) -> Result<String> {
    let Some(inner) = value.strip_prefix('"') else {
        if value.contains('"') {
            return Err(Error::format(format!("stray quote in parameter value {value:?}")));
        }
        return Ok(value.to_string());
    };
    let inner = inner
        .strip_suffix('"')
        .ok_or_else(|| Error::format(format!("unbalanced quotes in {value:?}")))?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_parse() {
        let ct = ContentType::parse("application/xop+xml; charset=UTF-8; type=\"text/xml\"").unwrap();
        assert_eq!(ct.main_type, "application");
        assert_eq!(ct.sub_type, "xop+xml");
        assert_eq!(ct.charset(), Some("UTF-8"));
        assert_eq!(ct.parameter("TYPE"), Some("text/xml"));
        assert!(ct.is(XOP_XML));
    }

    #[test]
    fn test_content_type_parse_quoted_semicolon() {
        let ct = ContentType::parse("multipart/related; boundary=\"a;b\"; start=\"<root>\"").unwrap();
        assert_eq!(ct.boundary(), Some("a;b"));
        assert_eq!(ct.start(), Some("<root>"));
    }

    #[test]
    fn test_content_type_parse_errors() {
        assert!(ContentType::parse("text").is_err());
        assert!(ContentType::parse("/plain").is_err());
        assert!(ContentType::parse("text/plain; charset=\"utf-8").is_err());
        assert!(ContentType::parse("text/plain; charset").is_err());
    }

    #[test]
    fn test_content_type_display_preserves_order() {
        let ct = ContentType::new("application", "xop+xml")
            .with_parameter("charset", "utf-8")
            .with_parameter("type", "application/soap+xml");
        assert_eq!(
            ct.to_string(),
            "application/xop+xml; charset=utf-8; type=\"application/soap+xml\""
        );
    }

    #[test]
    fn test_set_parameter_replaces_in_place() {
        let mut ct = ContentType::parse("text/xml; charset=utf-16; a=b").unwrap();
        ct.set_parameter("Charset", "utf-8");
        assert_eq!(ct.to_string(), "text/xml; charset=utf-8; a=b");
    }

    #[test]
    fn test_is_xop_multipart() {
        assert!(is_xop_multipart(
            "multipart/related; type=\"application/xop+xml\"; boundary=\"x\""
        ));
        assert!(is_xop_multipart(
            "boundary=x;TYPE=\"Application/XOP+XML\";  Multipart/Related "
        ));
        assert!(is_xop_multipart("multipart/related; type = application/xop+xml"));
        assert!(!is_xop_multipart("multipart/related; boundary=x"));
        assert!(!is_xop_multipart("application/xop+xml"));
        assert!(!is_xop_multipart("application/json"));
    }
}
