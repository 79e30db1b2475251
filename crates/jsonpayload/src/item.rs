//! Documents: a schema, its tag names and one payload, handled together.
use alloc::{
    string::{String, ToString},
    sync::Arc,
    vec::Vec,
};

use tracing::debug;

use crate::{
    cjson::{
        decoder::JsonDecoder,
        encoder::{JsonWriter, TupleEncoder},
    },
    error::Error,
    fields_set::FieldsSet,
    options::DecoderOptions,
    payload::{ConstPayload, Payload},
    payload_type::PayloadType,
    payload_value::PayloadValue,
    serializer::WrSerializer,
    tags::TagsMatcher,
    value::{Map, Value},
    variant::{KeyValueType, Variant, VariantArray},
};

/// A document of one schema.
///
/// Decoding JSON fills the indexed fields and stores the rest of the document
/// as a tuple in field 0. [`get_json`](Self::get_json) renders the document
/// back, reading indexed values from their fields.
///
/// # Examples
///
/// ```
/// use jsonpayload::{Item, KeyValueType, PayloadFieldType, PayloadType, Variant};
///
/// let mut t = PayloadType::new("docs");
/// t.add(PayloadFieldType::new(KeyValueType::Int, "id", false)).unwrap();
/// t.add(PayloadFieldType::new(KeyValueType::String, "tags", true)).unwrap();
///
/// let mut item = Item::new(t).unwrap();
/// item.from_json(r#"{"id": 5, "tags": ["a", "b"]}"#).unwrap();
/// assert_eq!(item.field("id").value().unwrap(), Variant::Int(5));
///
/// item.field("id").set(6).unwrap();
/// assert_eq!(item.get_json().unwrap(), r#"{"id":6,"tags":["a","b"]}"#);
/// ```
#[derive(Debug, Clone)]
pub struct Item {
    payload_type: PayloadType,
    tags: TagsMatcher,
    value: PayloadValue,
    options: DecoderOptions,
}

impl Item {
    /// An empty document of `payload_type`.
    ///
    /// # Errors
    ///
    /// Fails if the schema's JSON paths use more names than tags can encode.
    pub fn new(payload_type: PayloadType) -> Result<Self, Error> {
        let tags = TagsMatcher::new(&payload_type)?;
        let value = PayloadValue::new(payload_type.total_size());
        Ok(Self {
            payload_type,
            tags,
            value,
            options: DecoderOptions::default(),
        })
    }

    #[must_use]
    pub fn with_options(mut self, options: DecoderOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn payload_type(&self) -> &PayloadType {
        &self.payload_type
    }

    #[must_use]
    pub fn tags_matcher(&self) -> &TagsMatcher {
        &self.tags
    }

    #[must_use]
    pub fn value(&self) -> &PayloadValue {
        &self.value
    }

    #[must_use]
    pub fn payload(&self) -> ConstPayload<'_> {
        ConstPayload::new(&self.payload_type, &self.value)
    }

    /// Raw access to the payload. Writes through it change field values but
    /// not the tuple, so [`get_json`](Self::get_json) renders only as many
    /// array elements as the document held when it was decoded. Use
    /// [`field`](Self::field) to change the document itself.
    pub fn payload_mut(&mut self) -> Payload<'_> {
        Payload::new(&self.payload_type, &mut self.value)
    }

    /// Whether decoding registered key names not known before.
    #[must_use]
    pub fn is_tags_updated(&self) -> bool {
        self.tags.is_updated()
    }

    /// Replaces the document with the one in `text`.
    ///
    /// # Errors
    ///
    /// Fails on invalid JSON, on a document that is not an object, and on
    /// any decode error. The previous document is kept on failure.
    pub fn from_json(&mut self, text: &str) -> Result<(), Error> {
        self.from_value(&Value::parse(text)?)
    }

    /// Like [`from_json`](Self::from_json), but only indexed fields in
    /// `filter` are written.
    ///
    /// # Errors
    ///
    /// See [`from_json`](Self::from_json).
    pub fn from_json_with_filter(&mut self, text: &str, filter: &FieldsSet) -> Result<(), Error> {
        self.decode(&Value::parse(text)?, Some(filter))
    }

    /// Replaces the document with `doc`.
    ///
    /// # Errors
    ///
    /// See [`from_json`](Self::from_json).
    pub fn from_value(&mut self, doc: &Value) -> Result<(), Error> {
        self.decode(doc, None)
    }

    fn decode(&mut self, doc: &Value, filter: Option<&FieldsSet>) -> Result<(), Error> {
        if !doc.is_object() {
            return Err(Error::ExpectedObject(doc.type_name()));
        }
        let mut value = PayloadValue::new(self.payload_type.total_size());
        let mut tuple = WrSerializer::new();
        let mut pl = Payload::new(&self.payload_type, &mut value);
        let mut decoder = JsonDecoder::new(&mut self.tags).with_options(self.options);
        if let Some(filter) = filter {
            decoder = decoder.with_filter(filter);
        }
        decoder.decode(&mut pl, &mut tuple, doc)?;
        pl.set(0, &[Variant::Tuple(Arc::from(tuple.as_slice()))], false)?;
        value.set_lsn(self.value.lsn());
        self.value = value;
        Ok(())
    }

    /// Renders the document as compact JSON with keys in name order.
    ///
    /// # Errors
    ///
    /// Fails if the stored tuple is malformed.
    pub fn get_json(&self) -> Result<String, Error> {
        let mut out = String::new();
        TupleEncoder::new().encode(&self.payload(), &mut JsonWriter::new(&self.tags, &mut out))?;
        Ok(out)
    }

    /// The stored tuple; empty before a document was decoded.
    #[must_use]
    pub fn tuple(&self) -> Arc<[u8]> {
        self.payload().tuple()
    }

    /// Accessor for the field `name`. A name that is not a schema field is
    /// taken as a JSON path into the document.
    pub fn field(&mut self, name: &str) -> FieldRef<'_> {
        let target = match self.payload_type.field_by_name(name) {
            Some(field) => Target::Field(field),
            None => Target::JsonPath(name.into()),
        };
        FieldRef { item: self, target }
    }

    /// Values at a dot-separated JSON path, indexed or not.
    ///
    /// # Errors
    ///
    /// Fails if the stored tuple is malformed.
    pub fn values_by_json_path(&self, path: &str) -> Result<VariantArray, Error> {
        self.payload()
            .get_by_json_path(path, &self.tags, KeyValueType::Undefined)
    }

    /// Moves the document to `new_type`, decoding its JSON again so that the
    /// tuple references the new field layout.
    ///
    /// Values are carried over through the document: a field value that the
    /// tuple does not reference is not kept.
    ///
    /// # Errors
    ///
    /// Fails if the stored tuple is malformed or the document does not decode
    /// under `new_type`. The item is unchanged on failure.
    pub fn migrate(&mut self, new_type: PayloadType) -> Result<(), Error> {
        let doc = Value::parse(&self.get_json()?)?;
        let mut migrated = Self {
            tags: self.tags.clone(),
            value: PayloadValue::new(new_type.total_size()),
            payload_type: new_type,
            options: self.options,
        };
        migrated.tags.update_payload_type(&migrated.payload_type)?;
        migrated.value.set_lsn(self.value.lsn());
        migrated.from_value(&doc)?;
        debug!(
            from = self.payload_type.name(),
            from_fields = self.payload_type.num_fields(),
            to_fields = migrated.payload_type.num_fields(),
            "migrated item"
        );
        *self = migrated;
        Ok(())
    }

    /// Replaces the values of `field` and rewrites the document so that the
    /// tuple references exactly the new values at the field's first JSON
    /// path. Objects missing along the path are created.
    fn set_field(&mut self, field: usize, values: &[Variant]) -> Result<(), Error> {
        if field == 0 {
            return self.payload_mut().set(field, values, false);
        }
        let f = self.payload_type.field(field);
        let (kind, is_array) = (f.kind(), f.is_array());
        let name = String::from(f.name());
        let path = f.json_paths().first().cloned().unwrap_or_else(|| name.clone());
        let converted = values
            .iter()
            .map(|v| v.clone().convert(kind).map_err(|e| e.in_field(&name)))
            .collect::<Result<Vec<_>, _>>()?;
        let node = if is_array {
            Value::Array(converted.iter().map(json_value).collect())
        } else {
            match converted.as_slice() {
                [] => Value::Null,
                [v] => json_value(v),
                _ => {
                    return Err(Error::ArrayForScalar {
                        field: name,
                        expected: kind,
                    });
                }
            }
        };

        let mut doc = if self.tuple().is_empty() {
            Value::Object(Map::new())
        } else {
            Value::parse(&self.get_json()?)?
        };
        let mut keys: Vec<&str> = path.split('.').collect();
        let leaf = keys.pop().unwrap_or_default();
        let mut cur = &mut doc;
        for key in keys {
            let Value::Object(map) = cur else {
                return Err(Error::NotImplemented("setting a field below a non-object value"));
            };
            cur = map.entry(String::from(key)).or_insert_with(|| Value::Object(Map::new()));
        }
        let Value::Object(map) = cur else {
            return Err(Error::NotImplemented("setting a field below a non-object value"));
        };
        map.insert(String::from(leaf), node);
        self.from_value(&doc)?;

        // Exact values, unless other paths of the field added elements too.
        let mut pl = self.payload_mut();
        if !is_array || pl.array_len(field) == converted.len() {
            pl.set(field, &converted, false)?;
        }
        debug!(field = %name, %path, values = converted.len(), "rewrote document field");
        Ok(())
    }

    #[must_use]
    pub fn lsn(&self) -> i64 {
        self.value.lsn()
    }

    pub fn set_lsn(&self, lsn: i64) {
        self.value.set_lsn(lsn);
    }
}

/// Largest magnitude an `f64` holds exactly as an integer.
const MAX_SAFE_INTEGER: u64 = 1 << 53;

/// JSON form of a field value already converted to the field type. Integers
/// too large for a JSON number become 0 and are written to the payload
/// afterwards.
#[allow(clippy::cast_precision_loss)]
fn json_value(v: &Variant) -> Value {
    match v {
        Variant::Null => Value::Null,
        Variant::Bool(b) => Value::Boolean(*b),
        Variant::Int(i) => Value::Number(f64::from(*i)),
        Variant::Int64(i) if i.unsigned_abs() <= MAX_SAFE_INTEGER => Value::Number(*i as f64),
        Variant::Int64(_) => Value::Number(0.0),
        Variant::Double(d) => Value::Number(*d),
        Variant::String(s) => Value::from(&**s),
        Variant::Tuple(_) => Value::String(v.to_string()),
    }
}

#[derive(Debug, Clone)]
enum Target {
    Field(usize),
    JsonPath(String),
}

/// A field of an [`Item`], or a JSON path inside its document.
#[derive(Debug)]
pub struct FieldRef<'a> {
    item: &'a mut Item,
    target: Target,
}

impl FieldRef<'_> {
    #[must_use]
    pub fn name(&self) -> &str {
        match &self.target {
            Target::Field(field) => self.item.payload_type.field(*field).name(),
            Target::JsonPath(path) => path.as_str(),
        }
    }

    /// # Errors
    ///
    /// Fails if the stored tuple is malformed.
    pub fn values(&self) -> Result<VariantArray, Error> {
        match &self.target {
            Target::Field(field) => Ok(self.item.payload().get(*field)),
            Target::JsonPath(path) => self.item.values_by_json_path(path),
        }
    }

    /// The single value of the field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArrayAccess`] unless there is exactly one
    /// value.
    pub fn value(&self) -> Result<Variant, Error> {
        let mut values = self.values()?;
        if values.len() != 1 {
            return Err(Error::InvalidArrayAccess {
                field: self.name().into(),
                len: values.len(),
            });
        }
        Ok(values.remove(0))
    }

    /// # Errors
    ///
    /// Fails if `value` does not convert to the field type, and with
    /// [`Error::NotImplemented`] for JSON paths.
    pub fn set(&mut self, value: impl Into<Variant>) -> Result<(), Error> {
        self.set_values(&[value.into()])
    }

    /// Replaces the values of the field, in the payload and in the document.
    ///
    /// The document is decoded again, so a filter given to
    /// [`Item::from_json_with_filter`] no longer applies afterwards.
    ///
    /// # Errors
    ///
    /// See [`set`](Self::set). Also fails if a value on the field's JSON path
    /// is not an object.
    pub fn set_values(&mut self, values: &[Variant]) -> Result<(), Error> {
        match self.target {
            Target::Field(field) => self.item.set_field(field, values),
            Target::JsonPath(_) => Err(Error::NotImplemented("setting values by json path")),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::payload_type::PayloadFieldType;

    fn schema() -> PayloadType {
        let mut t = PayloadType::new("docs");
        t.add(PayloadFieldType::new(KeyValueType::Int, "id", false)).unwrap();
        t.add(PayloadFieldType::new(KeyValueType::String, "tags", true)).unwrap();
        t
    }

    fn item(json: &str) -> Item {
        let mut item = Item::new(schema())
            .unwrap()
            .with_options(DecoderOptions {
                panic_on_error: true,
                ..Default::default()
            });
        item.from_json(json).unwrap();
        item
    }

    #[test]
    fn decoded_fields_read_back_and_grow() {
        let mut item = item(r#"{"id": 5, "tags": ["a","b"]}"#);
        assert_eq!(item.field("id").value(), Ok(Variant::Int(5)));
        assert_eq!(item.field("tags").values().unwrap()[..], [Variant::from("a"), Variant::from("b")]);

        let mut pl = item.payload_mut();
        let pos = pl.resize_array(2, 1, true);
        pl.set_at(2, pos, "c".into()).unwrap();
        assert_eq!(pos, 2);
        assert_eq!(
            item.field("tags").values().unwrap()[..],
            [Variant::from("a"), Variant::from("b"), Variant::from("c")]
        );
        // Raw payload writes leave the tuple's two references alone.
        assert_eq!(item.get_json().unwrap(), r#"{"id":5,"tags":["a","b"]}"#);

        let values = item.field("tags").values().unwrap();
        item.field("tags").set_values(&values).unwrap();
        assert_eq!(item.get_json().unwrap(), r#"{"id":5,"tags":["a","b","c"]}"#);
    }

    #[rstest]
    #[case::grown(&["x", "y", "z"], r#"{"id":5,"tags":["x","y","z"]}"#)]
    #[case::shrunk(&["x"], r#"{"id":5,"tags":["x"]}"#)]
    #[case::emptied(&[], r#"{"id":5,"tags":[]}"#)]
    fn set_values_rewrites_document(#[case] tags: &[&str], #[case] json: &str) {
        let mut item = item(r#"{"id": 5, "tags": ["a","b"]}"#);
        let values: Vec<Variant> = tags.iter().map(|&s| Variant::from(s)).collect();
        item.field("tags").set_values(&values).unwrap();
        assert_eq!(item.field("tags").values().unwrap()[..], values[..]);
        assert_eq!(item.get_json().unwrap(), json);
    }

    #[test]
    fn setting_absent_field_adds_it() {
        let mut item = item(r#"{"tags": ["a"]}"#);
        item.field("id").set(9).unwrap();
        assert_eq!(item.get_json().unwrap(), r#"{"id":9,"tags":["a"]}"#);

        let mut fresh = Item::new(schema()).unwrap();
        fresh.field("tags").set_values(&["t".into()]).unwrap();
        assert_eq!(fresh.get_json().unwrap(), r#"{"tags":["t"]}"#);
        assert!(matches!(
            fresh.field("id").set_values(&[1.into(), 2.into()]),
            Err(Error::ArrayForScalar { .. })
        ));
        assert_eq!(fresh.get_json().unwrap(), r#"{"tags":["t"]}"#);
    }

    #[rstest]
    #[case::array("[1]", Error::ExpectedObject("array"))]
    #[case::string(r#""x""#, Error::ExpectedObject("string"))]
    fn documents_must_be_objects(#[case] json: &str, #[case] err: Error) {
        let mut item = Item::new(schema()).unwrap();
        assert_eq!(item.from_json(json), Err(err));
    }

    #[test]
    fn syntax_errors_are_reported() {
        let mut item = Item::new(schema()).unwrap();
        assert!(matches!(item.from_json(r#"{"id": }"#), Err(Error::Json { line: 1, .. })));
    }

    #[test]
    fn failed_decode_keeps_previous_document() {
        let item = item(r#"{"id": 1, "note": "kept"}"#);
        let mut strict = item.clone().with_options(DecoderOptions::default());
        assert!(strict.from_json(r#"{"id": [2]}"#).is_err());
        assert_eq!(strict.get_json().unwrap(), r#"{"id":1,"note":"kept"}"#);
        item.set_lsn(3);
        assert_eq!(item.lsn(), 3);
    }

    #[test]
    fn single_value_access_rejects_arrays() {
        let mut item = item(r#"{"tags": ["a","b"]}"#);
        assert_eq!(
            item.field("tags").value(),
            Err(Error::InvalidArrayAccess {
                field: "tags".into(),
                len: 2
            })
        );
    }

    #[test]
    fn json_paths_read_but_do_not_write() {
        let mut item = item(r#"{"meta": {"score": 2.5, "labels": ["x"]}}"#);
        assert_eq!(item.field("meta.score").value(), Ok(Variant::Double(2.5)));
        assert_eq!(item.values_by_json_path("meta.labels").unwrap()[..], [Variant::from("x")]);
        assert!(item.values_by_json_path("meta.missing").unwrap().is_empty());

        let mut score = item.field("meta.score");
        assert_eq!(score.name(), "meta.score");
        assert_eq!(
            score.set(1.0),
            Err(Error::NotImplemented("setting values by json path"))
        );
    }

    #[test]
    fn set_values_replaces_array() {
        let mut item = item(r#"{"tags": ["a"]}"#);
        item.field("tags").set_values(&["x".into(), "y".into()]).unwrap();
        assert_eq!(item.field("tags").values().unwrap()[..], [Variant::from("x"), Variant::from("y")]);
        assert!(matches!(item.field("id").set("nope"), Err(Error::Field { .. })));
    }

    #[test]
    fn filter_skips_unselected_fields() {
        let mut item = Item::new(schema()).unwrap();
        item.from_json_with_filter(r#"{"id": 1, "tags": ["a"]}"#, &FieldsSet::from_fields(&[2]))
            .unwrap();
        assert_eq!(item.field("id").value(), Ok(Variant::Int(0)));
        assert_eq!(item.field("tags").values().unwrap()[..], [Variant::from("a")]);
        assert_eq!(item.get_json().unwrap(), r#"{"tags":["a"]}"#);
    }

    #[test]
    fn migrate_indexes_new_paths() {
        let mut item = item(r#"{"id": 7, "meta": {"score": 2.5}, "tags": ["a"]}"#);
        item.set_lsn(42);
        let json = item.get_json().unwrap();

        let mut t = schema();
        t.add(
            PayloadFieldType::new(KeyValueType::Double, "score", false).with_json_paths(&["meta.score"]),
        )
        .unwrap();
        item.migrate(t).unwrap();

        assert_eq!(item.field("score").value(), Ok(Variant::Double(2.5)));
        assert_eq!(item.field("id").value(), Ok(Variant::Int(7)));
        assert_eq!(item.get_json().unwrap(), json);
        assert_eq!(item.lsn(), 42);

        let mut dropped = PayloadType::new("docs");
        dropped
            .add(PayloadFieldType::new(KeyValueType::String, "tags", true))
            .unwrap();
        item.migrate(dropped).unwrap();
        assert_eq!(item.payload().dump(), "tags: [a]");
        assert_eq!(item.get_json().unwrap(), json);
        assert_eq!(item.lsn(), 42);
    }
}
