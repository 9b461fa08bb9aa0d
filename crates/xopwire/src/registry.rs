//! Parts of one decoded message.

use percent_encoding::percent_decode_str;

use crate::error::{Error, Result};
use crate::part::{Part, strip_angle_brackets};

/// Ordered collection of the parts of one message.
///
/// Order is stream order; it only matters for default root selection.
#[derive(Debug, Clone, Default)]
pub struct PartRegistry {
    parts: Vec<Part>,
}

impl PartRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a part.
    pub fn push(&mut self, part: Part) {
        self.parts.push(part);
    }

    /// Number of parts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Returns true if there are no parts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Returns the part at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Part> {
        self.parts.get(index)
    }

    /// Iterates over parts in stream order.
    pub fn iter(&self) -> std::slice::Iter<'_, Part> {
        self.parts.iter()
    }

    /// Parts carrying a header with the given value (name case-insensitive).
    pub fn find_by_header<'a>(
        &'a self,
        name: &'a str,
        value: &'a str,
    ) -> impl Iterator<Item = &'a Part> + 'a {
        self.parts
            .iter()
            .filter(move |part| part.headers().get_all(name).contains(&value))
    }

    /// Selects the root part.
    ///
    /// `start` is the envelope's `start` parameter. It is matched against
    /// each part's content id with angle brackets removed; without a `start`
    /// or a match the first part is the root.
    #[must_use]
    pub fn root(&self, start: Option<&str>) -> Option<&Part> {
        start
            .map(strip_angle_brackets)
            .and_then(|start| {
                self.parts
                    .iter()
                    .find(|part| part.bare_content_id() == Some(start))
            })
            .or_else(|| self.parts.first())
    }

    /// Finds the single part named by a content id.
    ///
    /// `id` is compared with each part's bracket-free content id both as
    /// given and percent-decoded, as `cid:` URLs are URL-encoded.
    ///
    /// # Errors
    ///
    /// Returns a format error when no part or more than one part matches.
    pub fn by_content_id(&self, id: &str) -> Result<&Part> {
        let decoded = percent_decode_str(id).decode_utf8_lossy();
        let mut matches = self.parts.iter().filter(|part| {
            part.bare_content_id()
                .is_some_and(|cid| cid == id || cid == decoded)
        });

        let part = matches
            .next()
            .ok_or_else(|| Error::format(format!("no part with content id {id:?}")))?;
        if matches.next().is_some() {
            return Err(Error::format(format!(
                "more than one part with content id {id:?}"
            )));
        }
        Ok(part)
    }
}

impl<'a> IntoIterator for &'a PartRegistry {
    type Item = &'a Part;
    type IntoIter = std::slice::Iter<'a, Part>;

    fn into_iter(self) -> Self::IntoIter {
        self.parts.iter()
    }
}

impl FromIterator<Part> for PartRegistry {
    fn from_iter<I: IntoIterator<Item = Part>>(iter: I) -> Self {
        Self {
            parts: iter.into_iter().collect(),
        }
    }
}
