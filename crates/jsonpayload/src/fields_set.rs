//! Field filters: selections of indexed fields and JSON tag paths.
use crate::{
    inline_vec::InlineVec,
    tags::{Tag, TagsPath},
};

/// One entry of a [`FieldsSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSelector {
    /// An indexed field.
    Index(usize),
    /// A location inside the document tuple.
    JsonPath(TagsPath),
}

/// Ordered set of fields and tag paths.
///
/// Used to select which values of a document are decoded, hashed, compared
/// or serialized.
///
/// # Examples
///
/// ```
/// use jsonpayload::{FieldsSet, inline_vec};
///
/// let mut set = FieldsSet::from_fields(&[1, 3]);
/// set.push_tags_path(inline_vec![2, 5]);
/// assert!(set.contains(3));
/// assert!(!set.contains(2));
/// assert!(set.matches(&[2]));
/// assert!(set.matches(&[2, 5, 1]));
/// assert!(!set.matches(&[2, 6]));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldsSet {
    entries: InlineVec<FieldSelector, 4>,
    mask: u64,
}

impl FieldsSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_fields(fields: &[usize]) -> Self {
        let mut set = Self::new();
        for &field in fields {
            set.push_field(field);
        }
        set
    }

    #[must_use]
    pub fn from_tags_path(path: TagsPath) -> Self {
        let mut set = Self::new();
        set.push_tags_path(path);
        set
    }

    /// Adds `field` unless it is already present.
    pub fn push_field(&mut self, field: usize) {
        if self.contains(field) {
            return;
        }
        if field < 64 {
            self.mask |= 1 << field;
        }
        self.entries.push(FieldSelector::Index(field));
    }

    pub fn push_tags_path(&mut self, path: TagsPath) {
        self.entries.push(FieldSelector::JsonPath(path));
    }

    #[must_use]
    pub fn contains(&self, field: usize) -> bool {
        if field < 64 {
            (self.mask & (1 << field)) != 0
        } else {
            self.entries
                .iter()
                .any(|e| matches!(e, FieldSelector::Index(f) if *f == field))
        }
    }

    /// Returns `true` if `path` lies on, above or below one of the set's tag
    /// paths, i.e. one is a prefix of the other. A set without tag paths
    /// matches everything.
    #[must_use]
    pub fn matches(&self, path: &[Tag]) -> bool {
        let mut paths = self.tags_paths().peekable();
        if paths.peek().is_none() {
            return true;
        }
        paths.any(|filter| {
            let common = filter.len().min(path.len());
            filter[..common] == path[..common]
        })
    }

    pub fn tags_paths(&self) -> impl Iterator<Item = &TagsPath> {
        self.entries.iter().filter_map(|e| match e {
            FieldSelector::JsonPath(p) => Some(p),
            FieldSelector::Index(_) => None,
        })
    }

    pub fn iter(&self) -> core::slice::Iter<'_, FieldSelector> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a FieldsSet {
    type Item = &'a FieldSelector;
    type IntoIter = core::slice::Iter<'a, FieldSelector>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::inline_vec;

    #[rstest]
    #[case::exact(&[1, 2], true)]
    #[case::ancestor(&[1], true)]
    #[case::root(&[], true)]
    #[case::descendant(&[1, 2, 3], true)]
    #[case::sibling(&[1, 3], false)]
    #[case::other_root(&[4], false)]
    fn prefix_matching(#[case] path: &[Tag], #[case] expected: bool) {
        let set = FieldsSet::from_tags_path(inline_vec![1, 2]);
        assert_eq!(set.matches(path), expected);
    }

    #[test]
    fn without_paths_everything_matches() {
        assert!(FieldsSet::from_fields(&[1]).matches(&[7, 7]));
    }

    #[test]
    fn high_field_indexes_are_tracked() {
        let mut set = FieldsSet::new();
        set.push_field(100);
        set.push_field(100);
        set.push_field(3);
        assert_eq!(set.len(), 2);
        assert!(set.contains(100));
        assert!(!set.contains(99));
        assert!(set.contains(3));
    }
}
