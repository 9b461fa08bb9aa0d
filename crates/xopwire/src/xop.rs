//! XOP reference resolution.
//!
//! Every `xop:Include` element in the root document is replaced by the base64
//! text of the part its `href` names. The document is not re-serialised:
//! bytes outside the replaced elements are copied through untouched, so
//! whitespace and formatting survive exactly.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;

use crate::error::{Error, Result};
use crate::registry::PartRegistry;

/// Namespace of the XOP `Include` element.
pub const XOP_NAMESPACE: &str = "http://www.w3.org/2004/08/xop/include";

const INCLUDE: &[u8] = b"Include";

/// Replaces `xop:Include` elements with the base64 of the referenced parts.
#[derive(Debug, Clone, Copy)]
pub struct XopResolver<'a> {
    parts: &'a PartRegistry,
}

impl<'a> XopResolver<'a> {
    /// Creates a resolver over the parts of one message.
    #[must_use]
    pub const fn new(parts: &'a PartRegistry) -> Self {
        Self { parts }
    }

    /// Resolves every `Include` element in `xml`.
    ///
    /// # Errors
    ///
    /// Returns a format error if the document is not well-formed, if an
    /// `Include` has no `cid:` href, or if a reference matches no part or
    /// more than one part. Nothing is returned on error.
    pub fn resolve(&self, xml: &str) -> Result<String> {
        let mut reader = NsReader::from_str(xml);
        let mut out = String::with_capacity(xml.len());
        let mut copied = 0;
        let mut resolved = 0usize;
        let mut depth = 0usize;
        let mut seen_root = false;

        loop {
            let before = position(&reader)?;
            let (ns, event) = reader.read_resolved_event().map_err(xml_error)?;
            let in_xop_ns = matches!(ns, ResolveResult::Bound(ns) if ns.as_ref() == XOP_NAMESPACE.as_bytes());

            let (element, has_content) = match event {
                Event::Eof => break,
                Event::Start(e) => (e, true),
                Event::Empty(e) => (e, false),
                Event::End(_) => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| Error::Xml("unmatched end tag".to_string()))?;
                    continue;
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(xml_error)?;
                    if depth == 0 && !text.trim().is_empty() {
                        return Err(Error::Xml(
                            "text outside the document element".to_string(),
                        ));
                    }
                    continue;
                }
                Event::CData(_) if depth == 0 => {
                    return Err(Error::Xml(
                        "CDATA outside the document element".to_string(),
                    ));
                }
                _ => continue,
            };

            if depth == 0 {
                if seen_root {
                    return Err(Error::Xml("more than one document element".to_string()));
                }
                seen_root = true;
            }
            check_attributes(&element)?;

            if !in_xop_ns || element.local_name().as_ref() != INCLUDE {
                if has_content {
                    depth += 1;
                }
                continue;
            }
            if depth == 0 {
                return Err(Error::format("xop:Include is the document element"));
            }

            let id = reference_id(&element)?;
            let start = tag_start(xml, before, &element)?;
            if has_content {
                skip_element(&mut reader)?;
            }
            let after = position(&reader)?;
            let part = self.parts.by_content_id(&id)?;

            out.push_str(&xml[copied..start]);
            STANDARD.encode_string(part.body().as_bytes(), &mut out);
            copied = after;
            resolved += 1;

            tracing::trace!(id = %id, size = part.body().len(), "xop:Include resolved");
        }

        if !seen_root {
            return Err(Error::Xml("document has no element".to_string()));
        }
        if depth != 0 {
            return Err(Error::Xml("document element is not closed".to_string()));
        }

        out.push_str(&xml[copied..]);
        tracing::debug!(resolved, "xop references resolved");
        Ok(out)
    }
}

/// Finds the `<` opening `element`, whose event began at reader offset
/// `before`.
fn tag_start(xml: &str, before: usize, element: &BytesStart<'_>) -> Result<usize> {
    let bytes = xml.as_bytes();
    // After a text event the reader may already be past the '<'.
    let start = if bytes.get(before) == Some(&b'<') {
        before
    } else {
        before.saturating_sub(1)
    };

    let opens = bytes.get(start) == Some(&b'<')
        && bytes
            .get(start + 1..)
            .is_some_and(|rest| rest.starts_with(element.name().as_ref()));
    if !opens {
        return Err(Error::Xml("cannot locate xop:Include start tag".to_string()));
    }
    Ok(start)
}

/// Rejects attributes that are not well-formed.
fn check_attributes(element: &BytesStart<'_>) -> Result<()> {
    for attr in element.attributes() {
        let attr = attr.map_err(xml_error)?;
        if attr.value.contains(&b'<') {
            return Err(Error::Xml(format!(
                "'<' in value of attribute {:?}",
                String::from_utf8_lossy(attr.key.as_ref())
            )));
        }
        attr.unescape_value().map_err(xml_error)?;
    }
    Ok(())
}

/// Reads the `cid:` href of an `Include` element.
fn reference_id(element: &BytesStart<'_>) -> Result<String> {
    let href = element
        .try_get_attribute("href")
        .map_err(xml_error)?
        .ok_or_else(|| Error::format("xop:Include without href"))?;
    let href = href.unescape_value().map_err(xml_error)?;
    let href = href.trim();

    let id = href
        .get(..4)
        .filter(|scheme| scheme.eq_ignore_ascii_case("cid:"))
        .map(|_| &href[4..])
        .ok_or_else(|| Error::format(format!("xop:Include href is not a cid: URI: {href:?}")))?;
    if id.is_empty() {
        return Err(Error::format("xop:Include href has an empty content id"));
    }
    Ok(id.to_string())
}

/// Skips the content and end tag of an element whose start tag was just read.
fn skip_element(reader: &mut NsReader<&[u8]>) -> Result<()> {
    let mut depth = 1usize;
    while depth > 0 {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth -= 1,
            Event::Eof => return Err(Error::Xml("unclosed xop:Include element".to_string())),
            _ => {}
        }
    }
    Ok(())
}

fn position(reader: &NsReader<&[u8]>) -> Result<usize> {
    usize::try_from(reader.buffer_position())
        .map_err(|_| Error::format("document offset out of range"))
}

fn xml_error(err: impl std::fmt::Display) -> Error {
    Error::Xml(err.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bytes::Bytes;
    use proptest::prelude::*;

    use super::*;
    use crate::header::Headers;
    use crate::part::{Part, PartBody};

    fn registry(parts: &[(&str, &'static [u8])]) -> PartRegistry {
        parts
            .iter()
            .map(|(id, body)| {
                let mut headers = Headers::new();
                headers.add("Content-ID", format!("<{id}>"));
                Part::new(headers, PartBody::Owned(Bytes::from_static(body))).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_resolves_every_include() {
        let parts = registry(&[("a@x", b"hello"), ("b@x", b"\x00\xFF")]);
        let xml = concat!(
            "<s:Envelope xmlns:s=\"urn:s\" xmlns:xop=\"http://www.w3.org/2004/08/xop/include\">\n",
            "  <s:Body>\n",
            "    <data><xop:Include href=\"cid:a@x\"/></data>\n",
            "    <more>\t<xop:Include href='cid:b@x'></xop:Include>\t</more>\n",
            "  </s:Body>\n",
            "</s:Envelope>"
        );

        let resolved = XopResolver::new(&parts).resolve(xml).unwrap();
        assert_eq!(
            resolved,
            concat!(
                "<s:Envelope xmlns:s=\"urn:s\" xmlns:xop=\"http://www.w3.org/2004/08/xop/include\">\n",
                "  <s:Body>\n",
                "    <data>aGVsbG8=</data>\n",
                "    <more>\tAP8=\t</more>\n",
                "  </s:Body>\n",
                "</s:Envelope>"
            )
        );
    }

    #[test]
    fn test_default_namespace_include() {
        let parts = registry(&[("img", b"abc")]);
        let xml = "<r><Include xmlns=\"http://www.w3.org/2004/08/xop/include\" href=\"CID:img\"/></r>";
        let resolved = XopResolver::new(&parts).resolve(xml).unwrap();
        assert_eq!(resolved, "<r>YWJj</r>");
    }

    #[test]
    fn test_include_in_other_namespace_untouched() {
        let parts = registry(&[]);
        let xml = "<r xmlns:x=\"urn:other\"><x:Include href=\"cid:nope\"/><Include/></r>";
        let resolved = XopResolver::new(&parts).resolve(xml).unwrap();
        assert_eq!(resolved, xml);
    }

    #[test]
    fn test_unmatched_reference_is_format_error() {
        let parts = registry(&[("a@x", b"1")]);
        let xml = "<r xmlns:xop=\"http://www.w3.org/2004/08/xop/include\"><xop:Include href=\"cid:b@x\"/></r>";
        let err = XopResolver::new(&parts).resolve(xml).unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_duplicate_content_id_is_format_error() {
        let parts = registry(&[("a@x", b"1"), ("a@x", b"2")]);
        let xml = "<r xmlns:xop=\"http://www.w3.org/2004/08/xop/include\"><xop:Include href=\"cid:a@x\"/></r>";
        assert!(XopResolver::new(&parts).resolve(xml).unwrap_err().is_format());
    }

    #[test]
    fn test_bad_href() {
        let parts = registry(&[("a@x", b"1")]);
        for include in [
            "<xop:Include/>",
            "<xop:Include href=\"http://a@x\"/>",
            "<xop:Include href=\"cid:\"/>",
        ] {
            let xml = format!(
                "<r xmlns:xop=\"http://www.w3.org/2004/08/xop/include\">{include}</r>"
            );
            assert!(XopResolver::new(&parts).resolve(&xml).unwrap_err().is_format());
        }
    }

    #[test]
    fn test_malformed_xml() {
        let parts = registry(&[]);
        let err = XopResolver::new(&parts).resolve("<a><b></a>").unwrap_err();
        assert!(matches!(err, Error::Xml(_)));
        assert!(err.is_format());
    }

    #[test]
    fn test_document_without_includes_unchanged() {
        let parts = registry(&[]);
        let xml = "<?xml version=\"1.0\"?>\n<!-- c --><a  b=\"1\" >text<![CDATA[x]]></a>\n";
        assert_eq!(XopResolver::new(&parts).resolve(xml).unwrap(), xml);
    }

    const XOP_ROOT: &str = "<r xmlns:xop=\"http://www.w3.org/2004/08/xop/include\">";

    #[test]
    fn test_not_well_formed_documents_rejected() {
        let parts = registry(&[("a", b"hi")]);
        for xml in [
            "",
            "   ",
            "plain text, no xml",
            "<a>",
            "<a><b/>",
            "<a/><b/>",
            "<a></a>trailing",
            "<a/><![CDATA[x]]>",
            "<a>&bogus;</a>",
            "<a b=\"&bogus;\"/>",
            "<a b=\"1\" b=\"2\"/>",
            "</a>",
        ] {
            let err = XopResolver::new(&parts).resolve(xml).unwrap_err();
            assert!(err.is_format(), "accepted {xml:?}");
        }
    }

    #[test]
    fn test_known_entities_pass_through() {
        let parts = registry(&[]);
        let xml = "<a t=\"&quot;\">&lt;&amp;&#x41;&#66;</a>";
        assert_eq!(XopResolver::new(&parts).resolve(xml).unwrap(), xml);
    }

    #[test]
    fn test_raw_angle_bracket_in_attribute_rejected() {
        let parts = registry(&[("a", b"hi")]);
        let xml = format!("{XOP_ROOT}<xop:Include x=\"<\" href=\"cid:a\"/></r>");
        let err = XopResolver::new(&parts).resolve(&xml).unwrap_err();
        assert!(matches!(err, Error::Xml(_)));
    }

    #[test]
    fn test_include_as_document_element_rejected() {
        let parts = registry(&[("a", b"hi")]);
        let xml = "<xop:Include xmlns:xop=\"http://www.w3.org/2004/08/xop/include\" href=\"cid:a\"/>";
        assert!(XopResolver::new(&parts).resolve(xml).unwrap_err().is_format());
    }

    #[test]
    fn test_include_with_extra_attributes_and_children() {
        let parts = registry(&[("a", b"hi")]);
        let xml = format!(
            "{XOP_ROOT}\n  <v>x<xop:Include xmlns:f=\"urn:f\" f:note='a &amp; b' href=\"cid:a\" \
             ><f:child k=\"v\">text<f:leaf/></f:child><!-- c --></xop:Include>y</v>\n</r>"
        );
        let resolved = XopResolver::new(&parts).resolve(&xml).unwrap();
        assert_eq!(resolved, format!("{XOP_ROOT}\n  <v>xaGk=y</v>\n</r>"));
    }

    #[test]
    fn test_adjacent_includes_after_text() {
        let parts = registry(&[("a", b"1"), ("b", b"2")]);
        let xml = format!(
            "{XOP_ROOT}text<xop:Include href=\"cid:a\"/><xop:Include href=\"cid:b\"></xop:Include>end</r>"
        );
        let resolved = XopResolver::new(&parts).resolve(&xml).unwrap();
        assert_eq!(resolved, format!("{XOP_ROOT}textMQ==Mg==end</r>"));
    }

    fn owned_registry(bodies: &[Vec<u8>]) -> PartRegistry {
        bodies
            .iter()
            .enumerate()
            .map(|(i, body)| {
                let mut headers = Headers::new();
                headers.add("Content-ID", format!("<p{i}@x>"));
                Part::new(headers, PartBody::Owned(Bytes::copy_from_slice(body))).unwrap()
            })
            .collect()
    }

    /// Builds a root interleaving text with one `Include` per body, and the
    /// document expected once every `Include` is replaced.
    fn document(items: &[(Vec<u8>, String)]) -> (String, String) {
        let mut xml = XOP_ROOT.to_string();
        let mut expected = XOP_ROOT.to_string();
        for (i, (body, text)) in items.iter().enumerate() {
            xml.push_str(text);
            expected.push_str(text);
            xml.push_str(&format!("<e><xop:Include href=\"cid:p{i}@x\"/></e>"));
            expected.push_str(&format!("<e>{}</e>", STANDARD.encode(body)));
        }
        xml.push_str("</r>");
        expected.push_str("</r>");
        (xml, expected)
    }

    fn items() -> impl Strategy<Value = Vec<(Vec<u8>, String)>> {
        prop::collection::vec(
            (prop::collection::vec(any::<u8>(), 0..48), "[a-z \t\n]{0,8}"),
            0..6,
        )
    }

    proptest! {
        #[test]
        fn prop_resolution_only_touches_includes(items in items()) {
            let bodies: Vec<_> = items.iter().map(|(body, _)| body.clone()).collect();
            let parts = owned_registry(&bodies);
            let (xml, expected) = document(&items);

            prop_assert_eq!(XopResolver::new(&parts).resolve(&xml).unwrap(), expected);
        }

        #[test]
        fn prop_truncated_document_rejected(items in items(), cut in any::<prop::sample::Index>()) {
            let bodies: Vec<_> = items.iter().map(|(body, _)| body.clone()).collect();
            let parts = owned_registry(&bodies);
            let (xml, _) = document(&items);
            let cut = 1 + cut.index(xml.len() - 1);

            prop_assert!(XopResolver::new(&parts).resolve(&xml[..cut]).is_err());
        }
    }
}
