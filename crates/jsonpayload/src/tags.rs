//! Mapping between JSON key names and compact integer tags.
use alloc::{collections::BTreeMap, string::String, vec::Vec};

use tracing::trace;

use crate::{error::Error, inline_vec::InlineVec, payload_type::PayloadType};

/// Identifier of a key name. `0` marks anonymous nodes such as array
/// elements.
pub type Tag = u16;

/// Key names from the document root down to one node.
pub type TagsPath = InlineVec<Tag, 6>;

/// Highest tag a tuple can encode (12 bits).
pub const MAX_TAG: Tag = (1 << 12) - 1;

/// Registry of key names and of the tag paths indexed by a schema.
///
/// # Examples
///
/// ```
/// use jsonpayload::{KeyValueType, PayloadFieldType, PayloadType, TagsMatcher};
///
/// let mut t = PayloadType::new("docs");
/// t.add(PayloadFieldType::new(KeyValueType::Int, "price", false).with_json_paths(&["offer.price"]))
///     .unwrap();
/// let tags = TagsMatcher::new(&t).unwrap();
///
/// let path = tags.path_to_tag_path("offer.price").unwrap();
/// assert_eq!(tags.tags_to_field(&path), Some(1));
/// assert_eq!(tags.tag_path_to_path(&path).as_deref(), Some("offer.price"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagsMatcher {
    names: Vec<String>,
    tags: BTreeMap<String, Tag>,
    fields: BTreeMap<Vec<Tag>, usize>,
    updated: bool,
}

impl TagsMatcher {
    /// Builds a matcher knowing every JSON path of `payload_type`.
    ///
    /// # Errors
    ///
    /// Fails if the schema uses more key names than tags can encode.
    pub fn new(payload_type: &PayloadType) -> Result<Self, Error> {
        let mut tm = Self::default();
        tm.update_payload_type(payload_type)?;
        tm.updated = false;
        Ok(tm)
    }

    /// Re-reads the indexed paths of `payload_type`. Existing tags keep their
    /// values.
    ///
    /// # Errors
    ///
    /// Fails if registering the path names overflows the tag space.
    pub fn update_payload_type(&mut self, payload_type: &PayloadType) -> Result<(), Error> {
        self.fields.clear();
        for (idx, field) in payload_type.fields().iter().enumerate().skip(1) {
            for path in field.json_paths() {
                let tags = path
                    .split('.')
                    .map(|name| self.tag_for(name))
                    .collect::<Result<Vec<_>, _>>()?;
                self.fields.insert(tags, idx);
            }
        }
        trace!(fields = self.fields.len(), names = self.names.len(), "indexed json paths");
        Ok(())
    }

    /// Looks up the tag of `name` without registering it.
    #[must_use]
    pub fn name_to_tag(&self, name: &str) -> Option<Tag> {
        self.tags.get(name).copied()
    }

    /// Returns the tag of `name`, registering it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TagsOverflow`] once [`MAX_TAG`] names exist.
    pub fn tag_for(&mut self, name: &str) -> Result<Tag, Error> {
        if let Some(tag) = self.name_to_tag(name) {
            return Ok(tag);
        }
        let tag = Tag::try_from(self.names.len() + 1)
            .ok()
            .filter(|&tag| tag <= MAX_TAG)
            .ok_or(Error::TagsOverflow(MAX_TAG.into()))?;
        self.names.push(name.into());
        self.tags.insert(name.into(), tag);
        self.updated = true;
        Ok(tag)
    }

    #[must_use]
    pub fn tag_to_name(&self, tag: Tag) -> Option<&str> {
        let idx = usize::from(tag).checked_sub(1)?;
        self.names.get(idx).map(String::as_str)
    }

    /// Field indexed at `path`, if any.
    #[must_use]
    pub fn tags_to_field(&self, path: &[Tag]) -> Option<usize> {
        self.fields.get(path).copied()
    }

    /// Resolves a dot-separated path. Returns `None` if any name is unknown.
    #[must_use]
    pub fn path_to_tag_path(&self, path: &str) -> Option<TagsPath> {
        path.split('.').map(|name| self.name_to_tag(name)).collect()
    }

    /// Inverse of [`path_to_tag_path`](Self::path_to_tag_path).
    #[must_use]
    pub fn tag_path_to_path(&self, path: &[Tag]) -> Option<String> {
        let mut out = String::new();
        for (i, &tag) in path.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            out.push_str(self.tag_to_name(tag)?);
        }
        Some(out)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Whether names were registered since the last
    /// [`clear_updated`](Self::clear_updated).
    #[must_use]
    pub fn is_updated(&self) -> bool {
        self.updated
    }

    pub fn clear_updated(&mut self) {
        self.updated = false;
    }
}

#[cfg(test)]
mod tests {
    use alloc::format;

    use super::*;
    use crate::{payload_type::PayloadFieldType, variant::KeyValueType};

    fn schema() -> PayloadType {
        let mut t = PayloadType::new("t");
        t.add(PayloadFieldType::new(KeyValueType::Int, "id", false)).unwrap();
        t.add(
            PayloadFieldType::new(KeyValueType::String, "city", false)
                .with_json_paths(&["address.city"]),
        )
        .unwrap();
        t
    }

    #[test]
    fn registers_schema_paths_in_order() {
        let tm = TagsMatcher::new(&schema()).unwrap();
        assert_eq!(tm.name_to_tag("id"), Some(1));
        assert_eq!(tm.name_to_tag("address"), Some(2));
        assert_eq!(tm.name_to_tag("city"), Some(3));
        assert_eq!(tm.tags_to_field(&[1]), Some(1));
        assert_eq!(tm.tags_to_field(&[2, 3]), Some(2));
        assert_eq!(tm.tags_to_field(&[3]), None);
        assert!(!tm.is_updated());
    }

    #[test]
    fn tag_for_creates_once() {
        let mut tm = TagsMatcher::new(&schema()).unwrap();
        let tag = tm.tag_for("extra").unwrap();
        assert_eq!(tag, 4);
        assert_eq!(tm.tag_for("extra"), Ok(4));
        assert_eq!(tm.tag_to_name(4), Some("extra"));
        assert_eq!(tm.tag_to_name(0), None);
        assert!(tm.is_updated());
    }

    #[test]
    fn unknown_path_components_fail_resolution() {
        let tm = TagsMatcher::new(&schema()).unwrap();
        assert_eq!(tm.path_to_tag_path("address.zip"), None);
        assert_eq!(tm.tag_path_to_path(&[2, 9]), None);
    }

    #[test]
    fn overflow_is_reported() {
        let mut tm = TagsMatcher::default();
        for i in 0..MAX_TAG {
            tm.tag_for(&format!("k{i}")).unwrap();
        }
        assert_eq!(tm.tag_for("one-too-many"), Err(Error::TagsOverflow(4095)));
        assert_eq!(tm.tag_for("k0"), Ok(1));
    }
}
