//! Turns the parts of an MTOM envelope into one self-contained document.

use std::ops::Range;

use crate::charset::Charset;
use crate::config::DecoderConfig;
use crate::content_type::{ContentType, XOP_XML};
use crate::error::{Error, Result};
use crate::registry::PartRegistry;
use crate::xop::XopResolver;

/// A resolved root document ready for the inner message codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessage {
    /// UTF-8 XML with every `xop:Include` replaced.
    pub body: Vec<u8>,
    /// Content type of the root part.
    pub content_type: String,
}

/// Selects the root part, decodes it, and resolves its XOP references.
#[derive(Debug, Clone, Copy)]
pub struct MessageAssembler<'a> {
    config: &'a DecoderConfig,
}

impl<'a> MessageAssembler<'a> {
    /// Creates an assembler.
    #[must_use]
    pub const fn new(config: &'a DecoderConfig) -> Self {
        Self { config }
    }

    /// Builds the resolved root document.
    ///
    /// # Errors
    ///
    /// Returns a format error if there are no parts, the root content type
    /// or charset is unusable, the root is not valid text in its charset, or
    /// XOP resolution fails.
    pub fn assemble(
        &self,
        parts: &PartRegistry,
        outer_content_type: &ContentType,
    ) -> Result<AssembledMessage> {
        let root = parts
            .root(outer_content_type.start())
            .ok_or_else(|| Error::format("multipart envelope has no parts"))?;

        let mut content_type = match root.content_type() {
            Some(raw) => ContentType::parse(raw)?,
            None => {
                let ct = ContentType::new("application", "xop+xml");
                match outer_content_type.parameter("start-info") {
                    Some(info) => ct.with_parameter("type", info),
                    None => ct,
                }
            }
        };

        let charset = match content_type.charset() {
            Some(label) => Charset::from_label(label)
                .ok_or_else(|| Error::format(format!("unsupported charset {label:?}")))?,
            None => self.config.default_charset,
        };
        let text = charset.decode(root.body().as_bytes())?;

        if !content_type.is(XOP_XML) {
            tracing::debug!(root_type = %content_type.mime_type(), "root part is not application/xop+xml");
        }

        let resolved = declare_utf8(XopResolver::new(parts).resolve(&text)?);

        // The output is always UTF-8.
        let content_type = match root.content_type() {
            Some(raw) if charset == Charset::Utf8 || content_type.charset().is_none() => {
                raw.to_string()
            }
            _ => {
                if content_type.charset().is_some() {
                    content_type.set_parameter("charset", Charset::Utf8.label());
                }
                content_type.to_string()
            }
        };

        Ok(AssembledMessage {
            body: resolved.into_bytes(),
            content_type,
        })
    }
}

/// Points the `encoding` of a leading XML declaration at UTF-8.
fn declare_utf8(mut xml: String) -> String {
    let is_decl = xml.starts_with("<?xml")
        && xml.as_bytes().get(5).is_some_and(u8::is_ascii_whitespace);
    let Some(end) = xml.find("?>").filter(|_| is_decl) else {
        return xml;
    };
    if let Some(range) = encoding_value(&xml[..end]) {
        if !xml[range.clone()].eq_ignore_ascii_case("utf-8") {
            xml.replace_range(range, "utf-8");
        }
    }
    xml
}

/// Location of the `encoding` pseudo-attribute value in an XML declaration.
fn encoding_value(decl: &str) -> Option<Range<usize>> {
    let bytes = decl.as_bytes();
    let skip_space = |mut pos: usize| {
        while bytes.get(pos).is_some_and(u8::is_ascii_whitespace) {
            pos += 1;
        }
        pos
    };

    let pos = skip_space(decl.find("encoding")? + "encoding".len());
    if bytes.get(pos) != Some(&b'=') {
        return None;
    }
    let pos = skip_space(pos + 1);
    let quote = *bytes.get(pos).filter(|q| **q == b'"' || **q == b'\'')?;
    let start = pos + 1;
    let len = decl[start..].find(char::from(quote))?;
    Some(start..start + len)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::header::Headers;
    use crate::part::{Part, PartBody};

    fn part(headers: &[(&str, &str)], body: &[u8]) -> Part {
        let mut h = Headers::new();
        for (name, value) in headers {
            h.add(*name, *value);
        }
        Part::new(h, PartBody::Owned(Bytes::copy_from_slice(body))).unwrap()
    }

    fn outer(s: &str) -> ContentType {
        ContentType::parse(s).unwrap()
    }

    const ROOT_TYPE: &str = "application/xop+xml; charset=UTF-8; type=\"text/xml\"";

    #[test]
    fn test_assemble_with_start() {
        let parts: PartRegistry = [
            part(&[("Content-ID", "<bin>")], b"\x01\x02"),
            part(
                &[("Content-ID", "<root>"), ("Content-Type", ROOT_TYPE)],
                b"<r xmlns:xop=\"http://www.w3.org/2004/08/xop/include\"><xop:Include href=\"cid:bin\"/></r>",
            ),
        ]
        .into_iter()
        .collect();

        let config = DecoderConfig::default();
        let msg = MessageAssembler::new(&config)
            .assemble(&parts, &outer("multipart/related; boundary=b; start=\"<root>\""))
            .unwrap();

        assert_eq!(msg.body, b"<r xmlns:xop=\"http://www.w3.org/2004/08/xop/include\">AQI=</r>");
        assert_eq!(msg.content_type, ROOT_TYPE);
    }

    #[test]
    fn test_first_part_is_root_without_start() {
        let parts: PartRegistry = [
            part(&[("Content-ID", "<z>"), ("Content-Type", "text/xml")], b"<first/>"),
            part(&[("Content-ID", "<a>"), ("Content-Type", "text/xml")], b"<second/>"),
        ]
        .into_iter()
        .collect();

        let config = DecoderConfig::default();
        let msg = MessageAssembler::new(&config)
            .assemble(&parts, &outer("multipart/related; boundary=b"))
            .unwrap();
        assert_eq!(msg.body, b"<first/>");
        assert_eq!(msg.content_type, "text/xml");
    }

    #[test]
    fn test_latin1_root_is_reencoded() {
        let parts: PartRegistry = [part(
            &[("Content-Type", "application/xop+xml; charset=ISO-8859-1; type=\"text/xml\"")],
            b"<r>caf\xE9</r>",
        )]
        .into_iter()
        .collect();

        let config = DecoderConfig::default();
        let msg = MessageAssembler::new(&config)
            .assemble(&parts, &outer("multipart/related; boundary=b"))
            .unwrap();
        assert_eq!(msg.body, "<r>café</r>".as_bytes());
        assert_eq!(
            msg.content_type,
            "application/xop+xml; charset=utf-8; type=\"text/xml\""
        );
    }

    #[test]
    fn test_xml_declaration_follows_output_encoding() {
        let parts: PartRegistry = [part(
            &[("Content-Type", "text/xml; charset=utf-16le")],
            &"<?xml version=\"1.0\" encoding='UTF-16'?><r/>"
                .encode_utf16()
                .flat_map(u16::to_le_bytes)
                .collect::<Vec<_>>(),
        )]
        .into_iter()
        .collect();

        let config = DecoderConfig::default();
        let msg = MessageAssembler::new(&config)
            .assemble(&parts, &outer("multipart/related; boundary=b"))
            .unwrap();
        assert_eq!(msg.body, b"<?xml version=\"1.0\" encoding='utf-8'?><r/>");
        assert_eq!(msg.content_type, "text/xml; charset=utf-8");
    }

    #[test]
    fn test_declare_utf8() {
        assert_eq!(
            declare_utf8("<?xml version=\"1.0\" encoding = \"ISO-8859-1\" ?>\n<a/>".into()),
            "<?xml version=\"1.0\" encoding = \"utf-8\" ?>\n<a/>"
        );
        for unchanged in [
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><a/>",
            "<?xml version=\"1.0\"?><a encoding=\"latin1\"/>",
            "<?xml-stylesheet href=\"a\" encoding=\"x\"?><a/>",
            "<a/>",
        ] {
            assert_eq!(declare_utf8(unchanged.to_string()), unchanged);
        }
    }

    #[test]
    fn test_missing_root_type_uses_start_info() {
        let parts: PartRegistry = [part(&[], b"<r/>")].into_iter().collect();
        let config = DecoderConfig::default();
        let msg = MessageAssembler::new(&config)
            .assemble(
                &parts,
                &outer("multipart/related; boundary=b; start-info=\"application/soap+xml\""),
            )
            .unwrap();
        assert_eq!(
            msg.content_type,
            "application/xop+xml; type=\"application/soap+xml\""
        );
    }

    #[test]
    fn test_default_charset_applies() {
        let parts: PartRegistry = [part(&[("Content-Type", "text/xml")], b"<r>\xE9</r>")]
            .into_iter()
            .collect();
        let outer_ct = outer("multipart/related; boundary=b");

        let utf8 = DecoderConfig::default();
        assert!(MessageAssembler::new(&utf8).assemble(&parts, &outer_ct).is_err());

        let latin1 = DecoderConfig::builder().default_charset(Charset::Latin1).build();
        let msg = MessageAssembler::new(&latin1).assemble(&parts, &outer_ct).unwrap();
        assert_eq!(msg.body, "<r>é</r>".as_bytes());
    }

    #[test]
    fn test_errors() {
        let config = DecoderConfig::default();
        let outer_ct = outer("multipart/related; boundary=b");
        let err = MessageAssembler::new(&config)
            .assemble(&PartRegistry::new(), &outer_ct)
            .unwrap_err();
        assert!(err.is_format());

        let parts: PartRegistry = [part(&[("Content-Type", "text/xml; charset=koi8-r")], b"<r/>")]
            .into_iter()
            .collect();
        let err = MessageAssembler::new(&config).assemble(&parts, &outer_ct).unwrap_err();
        assert!(err.to_string().contains("unsupported charset"));
    }
}
