//! JSON to payload decoding.
//!
//! The decoder walks a parsed document once. Values whose path is indexed by
//! the schema are written into payload fields and left in the tuple as
//! references; everything else is copied into the tuple inline.
use alloc::{string::ToString, vec::Vec};
use core::ops::DerefMut;

use tracing::{debug, trace};

use crate::{
    cjson::{
        MAX_ARRAY_LEN,
        builder::{CJsonBuilder, ObjType},
    },
    error::Error,
    fields_set::FieldsSet,
    options::DecoderOptions,
    payload::PayloadIface,
    payload_value::PayloadValue,
    serializer::WrSerializer,
    tags::{Tag, TagsMatcher, TagsPath},
    value::{Map, Value},
    variant::{KeyValueType, Variant},
};

/// Converts a JSON scalar to a value of type `kind`.
///
/// # Errors
///
/// Fails for arrays and objects, and for scalars that do not convert.
pub fn json_to_variant(value: &Value, kind: KeyValueType) -> Result<Variant, Error> {
    let raw = match value {
        Value::Null => Variant::Null,
        Value::Boolean(b) => Variant::Bool(*b),
        Value::Number(n) => Variant::Double(*n),
        Value::String(s) => Variant::from(s.as_str()),
        Value::Array(_) | Value::Object(_) => {
            return Err(Error::Conversion {
                value: value.to_string(),
                to: kind,
            });
        }
    };
    raw.convert(kind)
}

#[allow(clippy::cast_possible_truncation)]
fn integral(n: f64) -> Option<i64> {
    (n % 1.0 == 0.0 && n >= -9.223_372_036_854_775_808e18 && n < 9.223_372_036_854_775_808e18)
        .then_some(n as i64)
}

/// Splits JSON documents into payload fields and a tuple.
///
/// With a filter, only indexed fields the filter contains are written, and
/// non-indexed values are kept only below paths the filter matches. Objects
/// are always kept so that paths inside them still resolve.
///
/// # Examples
///
/// ```
/// use jsonpayload::{
///     JsonDecoder, KeyValueType, Payload, PayloadFieldType, PayloadType, PayloadValue, TagsMatcher, Value,
///     Variant, WrSerializer,
/// };
///
/// let mut t = PayloadType::new("docs");
/// t.add(PayloadFieldType::new(KeyValueType::Int, "id", false)).unwrap();
/// let mut tags = TagsMatcher::new(&t).unwrap();
///
/// let mut value = PayloadValue::new(t.total_size());
/// let mut pl = Payload::new(&t, &mut value);
/// let mut tuple = WrSerializer::new();
/// let doc: Value = r#"{"id": 5, "note": "hi"}"#.parse().unwrap();
/// JsonDecoder::new(&mut tags).decode(&mut pl, &mut tuple, &doc).unwrap();
///
/// assert_eq!(pl.get(1)[..], [Variant::Int(5)]);
/// assert_eq!(tags.name_to_tag("note"), Some(2));
/// ```
#[derive(Debug)]
pub struct JsonDecoder<'a> {
    tags: &'a mut TagsMatcher,
    filter: Option<&'a FieldsSet>,
    options: DecoderOptions,
    path: TagsPath,
}

impl<'a> JsonDecoder<'a> {
    pub fn new(tags: &'a mut TagsMatcher) -> Self {
        Self {
            tags,
            filter: None,
            options: DecoderOptions::default(),
            path: TagsPath::new(),
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: &'a FieldsSet) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: DecoderOptions) -> Self {
        self.options = options;
        self
    }

    /// Decodes `value` into `pl`, writing the tuple to `ser`.
    ///
    /// `ser` is reset first. Key names not yet known are registered in the
    /// tags matcher.
    ///
    /// # Errors
    ///
    /// Fails if an array is given for a scalar field, a value does not
    /// convert to its field type, the document is nested too deeply, or the
    /// tag space is exhausted. On failure the payload may hold part of the
    /// document and should be discarded.
    pub fn decode<V: DerefMut<Target = PayloadValue>>(
        &mut self,
        pl: &mut PayloadIface<'_, V>,
        ser: &mut WrSerializer,
        value: &Value,
    ) -> Result<(), Error> {
        ser.reset();
        self.path.clear();
        let res = {
            let mut root = CJsonBuilder::new(ser, ObjType::Plain);
            self.decode_value(pl, &mut root, value, 0, true, 0)
        };
        match &res {
            Ok(()) => trace!(bytes = ser.len(), "encoded tuple"),
            Err(err) => {
                let path = self.tags.tag_path_to_path(&self.path).unwrap_or_default();
                debug!(%path, %err, "json decode aborted");
                #[cfg(any(test, feature = "fuzzing"))]
                assert!(
                    !self.options.panic_on_error,
                    "json decode failed at '{path}': {err}"
                );
            }
        }
        res
    }

    fn check_depth(&self, depth: usize) -> Result<(), Error> {
        match self.options.max_depth {
            Some(max) if depth >= max => Err(Error::DepthLimit(max)),
            _ => Ok(()),
        }
    }

    fn decode_object<V: DerefMut<Target = PayloadValue>>(
        &mut self,
        pl: &mut PayloadIface<'_, V>,
        builder: &mut CJsonBuilder<'_>,
        map: &Map,
        matched: bool,
        depth: usize,
    ) -> Result<(), Error> {
        for (key, value) in map {
            let tag = self.tags.tag_for(key)?;
            self.path.push(tag);
            let field = self.tags.tags_to_field(&self.path);
            let entry_match = match (self.filter, field) {
                (Some(filter), Some(field)) => filter.contains(field),
                (Some(filter), None) => matched && filter.matches(&self.path),
                (None, _) => matched,
            };
            match field {
                None => self.decode_value(pl, builder, value, tag, entry_match, depth)?,
                Some(field) if entry_match => self.decode_field(pl, builder, value, tag, field)?,
                Some(_) => {}
            }
            self.path.pop();
        }
        Ok(())
    }

    fn decode_field<V: DerefMut<Target = PayloadValue>>(
        &mut self,
        pl: &mut PayloadIface<'_, V>,
        builder: &mut CJsonBuilder<'_>,
        value: &Value,
        tag: Tag,
        field: usize,
    ) -> Result<(), Error> {
        let f = pl.payload_type().field(field);
        match value {
            Value::Array(items) => {
                if !f.is_array() {
                    return Err(Error::ArrayForScalar {
                        field: f.name().into(),
                        expected: f.kind(),
                    });
                }
                if items.len() > MAX_ARRAY_LEN {
                    return Err(Error::ArrayTooLong {
                        len: items.len(),
                        limit: MAX_ARRAY_LEN,
                    });
                }
                let values = items
                    .iter()
                    .map(|item| json_to_variant(item, f.kind()).map_err(|e| e.in_field(f.name())))
                    .collect::<Result<Vec<_>, _>>()?;
                let pos = pl.resize_array(field, values.len(), true);
                for (i, v) in values.into_iter().enumerate() {
                    pl.set_at(field, pos + i, v)?;
                }
                builder.array_ref(tag, field, items.len());
            }
            Value::Null => builder.null(tag),
            _ => {
                let v = json_to_variant(value, f.kind()).map_err(|e| e.in_field(f.name()))?;
                pl.set(field, core::slice::from_ref(&v), true)?;
                builder.ref_scalar(tag, &v, field);
            }
        }
        Ok(())
    }

    fn decode_value<V: DerefMut<Target = PayloadValue>>(
        &mut self,
        pl: &mut PayloadIface<'_, V>,
        builder: &mut CJsonBuilder<'_>,
        value: &Value,
        tag: Tag,
        matched: bool,
        depth: usize,
    ) -> Result<(), Error> {
        if !matched && !value.is_object() {
            return Ok(());
        }
        match value {
            Value::Null => builder.null(tag),
            Value::Boolean(b) => builder.put_bool(tag, *b),
            Value::Number(n) => match integral(*n) {
                Some(i) if !self.options.keep_integral_doubles => builder.put_int(tag, i),
                _ => builder.put_double(tag, *n),
            },
            Value::String(s) => builder.put_str(tag, s),
            Value::Array(items) => {
                self.check_depth(depth)?;
                if items.len() > MAX_ARRAY_LEN {
                    return Err(Error::ArrayTooLong {
                        len: items.len(),
                        limit: MAX_ARRAY_LEN,
                    });
                }
                let mut node = builder.array(tag);
                for item in items {
                    self.decode_value(pl, &mut node, item, 0, matched, depth + 1)?;
                }
            }
            Value::Object(map) => {
                self.check_depth(depth)?;
                let mut node = builder.object(tag);
                self.decode_object(pl, &mut node, map, matched, depth + 1)?;
            }
        }
        Ok(())
    }
}
