//! Schema descriptor: field names, types, offsets and JSON paths.
use alloc::{
    collections::BTreeMap,
    string::{String, ToString},
    vec::Vec,
};

use crate::{error::Error, variant::KeyValueType};

/// Bytes occupied by an array field's `{offset: u32, len: u32}` header.
pub const ARRAY_HEADER_SIZE: usize = 8;

/// Name of field 0, which holds the document's binary tuple.
pub const TUPLE_FIELD_NAME: &str = "-tuple";

/// Field references in a tuple store `field + 1` in 10 bits.
pub const MAX_FIELDS: usize = 1023;

/// Description of one payload field.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadFieldType {
    name: String,
    kind: KeyValueType,
    is_array: bool,
    offset: usize,
    json_paths: Vec<String>,
}

impl PayloadFieldType {
    /// Creates a field whose JSON path is its name.
    #[must_use]
    pub fn new(kind: KeyValueType, name: &str, is_array: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            is_array,
            offset: 0,
            json_paths: alloc::vec![name.into()],
        }
    }

    /// Replaces the JSON paths (dot separated) the field is indexed from.
    #[must_use]
    pub fn with_json_paths(mut self, paths: &[&str]) -> Self {
        self.json_paths = paths.iter().map(ToString::to_string).collect();
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> KeyValueType {
        self.kind
    }

    #[must_use]
    pub fn is_array(&self) -> bool {
        self.is_array
    }

    /// Byte offset of the field's slot (or array header).
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub fn elem_size(&self) -> usize {
        self.kind.elem_size()
    }

    /// Bytes the field occupies in the fixed area.
    #[must_use]
    pub fn size(&self) -> usize {
        if self.is_array {
            ARRAY_HEADER_SIZE
        } else {
            self.elem_size()
        }
    }

    #[must_use]
    pub fn json_paths(&self) -> &[String] {
        &self.json_paths
    }
}

/// Ordered list of fields describing a payload layout.
///
/// Field 0 always exists and holds the document tuple.
///
/// # Examples
///
/// ```
/// use jsonpayload::{KeyValueType, PayloadFieldType, PayloadType};
///
/// let mut t = PayloadType::new("items");
/// t.add(PayloadFieldType::new(KeyValueType::Int, "id", false)).unwrap();
/// t.add(PayloadFieldType::new(KeyValueType::String, "tags", true)).unwrap();
/// assert_eq!(t.num_fields(), 3);
/// assert_eq!(t.field_by_name("tags"), Some(2));
/// assert_eq!(t.field(2).offset(), 8);
/// assert_eq!(t.total_size(), 16);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadType {
    name: String,
    fields: Vec<PayloadFieldType>,
    by_name: BTreeMap<String, usize>,
    str_fields: Vec<usize>,
    total_size: usize,
}

impl PayloadType {
    #[must_use]
    pub fn new(name: &str) -> Self {
        let mut t = Self {
            name: name.into(),
            fields: Vec::new(),
            by_name: BTreeMap::new(),
            str_fields: Vec::new(),
            total_size: 0,
        };
        let mut tuple = PayloadFieldType::new(KeyValueType::Tuple, TUPLE_FIELD_NAME, false);
        tuple.json_paths.clear();
        t.push(tuple);
        t
    }

    fn push(&mut self, mut field: PayloadFieldType) {
        let idx = self.fields.len();
        field.offset = self.total_size;
        self.total_size += field.size();
        if matches!(field.kind, KeyValueType::String | KeyValueType::Tuple) {
            self.str_fields.push(idx);
        }
        self.by_name.insert(field.name.clone(), idx);
        self.fields.push(field);
    }

    /// Appends a field after the existing ones.
    ///
    /// # Errors
    ///
    /// Fails if a field of the same name exists or the schema is full.
    pub fn add(&mut self, field: PayloadFieldType) -> Result<(), Error> {
        if self.by_name.contains_key(&field.name) {
            return Err(Error::DuplicateField(field.name));
        }
        if self.fields.len() >= MAX_FIELDS {
            return Err(Error::TooManyFields(MAX_FIELDS));
        }
        self.push(field);
        Ok(())
    }

    /// Removes a field and recomputes the offsets of the fields after it.
    ///
    /// # Errors
    ///
    /// Fails if no such field exists or it is the tuple field.
    pub fn drop_field(&mut self, name: &str) -> Result<(), Error> {
        let idx = match self.by_name.get(name) {
            Some(&idx) if idx != 0 => idx,
            _ => return Err(Error::UnknownField(name.into())),
        };
        let mut fields = core::mem::take(&mut self.fields);
        fields.remove(idx);
        self.by_name.clear();
        self.str_fields.clear();
        self.total_size = 0;
        for field in fields {
            self.push(field);
        }
        Ok(())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// # Panics
    ///
    /// Panics if `idx` is out of range.
    #[must_use]
    pub fn field(&self, idx: usize) -> &PayloadFieldType {
        &self.fields[idx]
    }

    #[must_use]
    pub fn fields(&self) -> &[PayloadFieldType] {
        &self.fields
    }

    #[must_use]
    pub fn field_by_name(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    #[must_use]
    pub fn field_by_json_path(&self, path: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.json_paths.iter().any(|p| p == path))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Size of the fixed area: every scalar slot and array header.
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Indexes of string and tuple fields.
    #[must_use]
    pub fn str_fields(&self) -> &[usize] {
        &self.str_fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PayloadType {
        let mut t = PayloadType::new("sample");
        for field in [
            PayloadFieldType::new(KeyValueType::Int64, "id", false),
            PayloadFieldType::new(KeyValueType::String, "name", false),
            PayloadFieldType::new(KeyValueType::Double, "scores", true),
            PayloadFieldType::new(KeyValueType::Bool, "flag", false)
                .with_json_paths(&["meta.flag"]),
        ] {
            t.add(field).unwrap();
        }
        t
    }

    #[test]
    fn offsets_are_packed_in_order() {
        let t = sample();
        let offsets: Vec<_> = t.fields().iter().map(PayloadFieldType::offset).collect();
        assert_eq!(offsets, [0, 4, 12, 16, 24]);
        assert_eq!(t.total_size(), 25);
        assert_eq!(t.str_fields(), &[0, 2]);
    }

    #[test]
    fn lookups() {
        let t = sample();
        assert_eq!(t.field_by_name("flag"), Some(4));
        assert_eq!(t.field_by_json_path("meta.flag"), Some(4));
        assert_eq!(t.field_by_json_path("flag"), None);
        assert_eq!(t.field_by_json_path(TUPLE_FIELD_NAME), None);
        assert!(t.contains("scores"));
        assert!(!t.contains("missing"));
    }

    #[test]
    fn duplicate_and_missing_fields_are_rejected() {
        let mut t = sample();
        assert_eq!(
            t.add(PayloadFieldType::new(KeyValueType::Int, "id", false)),
            Err(Error::DuplicateField("id".into()))
        );
        assert_eq!(
            t.drop_field(TUPLE_FIELD_NAME),
            Err(Error::UnknownField(TUPLE_FIELD_NAME.into()))
        );
        assert_eq!(
            t.drop_field("nope"),
            Err(Error::UnknownField("nope".into()))
        );
    }

    #[test]
    fn dropping_recomputes_layout() {
        let mut t = sample();
        t.drop_field("name").unwrap();
        assert_eq!(t.num_fields(), 4);
        assert_eq!(t.field_by_name("scores"), Some(2));
        assert_eq!(t.field(2).offset(), 12);
        assert_eq!(t.field(3).offset(), 20);
        assert_eq!(t.total_size(), 21);
        assert_eq!(t.str_fields(), &[0]);
    }
}
