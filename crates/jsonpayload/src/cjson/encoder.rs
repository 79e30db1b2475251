//! Tuple to JSON encoding.
//!
//! [`TupleEncoder`] walks a payload's tuple and reports every node to a
//! [`TupleVisitor`], resolving field references against the payload as it
//! goes. [`JsonWriter`] renders the walk as JSON text; [`FieldsExtractor`]
//! collects the values found below one tag path.
use alloc::string::String;
use core::fmt::Write as _;

use crate::{
    cjson::{CArrayTag, CTag, TAG_ARRAY, TAG_BOOL, TAG_DOUBLE, TAG_END, TAG_NULL, TAG_OBJECT, TAG_STRING, TAG_VARINT},
    error::{Error, TupleError},
    fields_set::FieldsSet,
    inline_vec::InlineVec,
    payload::ConstPayload,
    serializer::Serializer,
    tags::{Tag, TagsMatcher, TagsPath},
    value::write_escaped_string,
    variant::{KeyValueType, Variant, VariantArray},
};

/// Receiver of the nodes of a tuple, in document order.
///
/// `tag` is the key name of the node, or `0` for array elements and the
/// root.
pub trait TupleVisitor {
    fn begin_object(&mut self, tag: Tag) -> Result<(), Error>;
    fn end_object(&mut self) -> Result<(), Error>;
    fn begin_array(&mut self, tag: Tag) -> Result<(), Error>;
    fn end_array(&mut self) -> Result<(), Error>;
    fn put(&mut self, tag: Tag, value: &Variant) -> Result<(), Error>;
    fn null(&mut self, tag: Tag) -> Result<(), Error>;
}

/// Walks the tuple of a payload.
///
/// Elements of an array field are handed out in the order the tuple
/// references them, so an encoder must be used for one walk at a time.
///
/// # Examples
///
/// ```
/// use jsonpayload::{Item, JsonWriter, PayloadType, TupleEncoder};
///
/// let mut item = Item::new(PayloadType::new("docs")).unwrap();
/// item.from_json(r#"{"b": [1, 2], "a": "x"}"#).unwrap();
///
/// let mut out = String::new();
/// let mut writer = JsonWriter::new(item.tags_matcher(), &mut out);
/// TupleEncoder::new().encode(&item.payload(), &mut writer).unwrap();
/// assert_eq!(out, r#"{"a":"x","b":[1,2]}"#);
/// ```
#[derive(Debug, Default)]
pub struct TupleEncoder<'f> {
    filter: Option<&'f FieldsSet>,
    counters: InlineVec<usize, 8>,
    path: TagsPath,
}

impl<'f> TupleEncoder<'f> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoder reporting only nodes on or below the tag paths of `filter`,
    /// plus the objects leading to them.
    #[must_use]
    pub fn with_filter(filter: &'f FieldsSet) -> Self {
        Self {
            filter: Some(filter),
            ..Self::default()
        }
    }

    /// Walks the tuple of `pl`. A payload without a tuple reads as an empty
    /// object.
    ///
    /// # Errors
    ///
    /// Fails on a malformed tuple, on a reference the payload cannot
    /// satisfy, or when `visitor` fails.
    pub fn encode<T: TupleVisitor + ?Sized>(&mut self, pl: &ConstPayload<'_>, visitor: &mut T) -> Result<(), Error> {
        self.counters.clear();
        self.counters.resize(pl.num_fields(), 0);
        self.path.clear();

        let tuple = pl.tuple();
        if tuple.is_empty() {
            visitor.begin_object(0)?;
            return visitor.end_object();
        }
        let mut rd = Serializer::new(&tuple);
        let root = CTag::decode(rd.get_varuint()?);
        if root.ty != TAG_OBJECT || root.field.is_some() {
            return Err(TupleError::UnexpectedTag { ty: root.ty, pos: 0 }.into());
        }
        self.encode_node(pl, &mut rd, visitor, root, true)
    }

    fn encode_node<T: TupleVisitor + ?Sized>(
        &mut self,
        pl: &ConstPayload<'_>,
        rd: &mut Serializer<'_>,
        visitor: &mut T,
        tag: CTag,
        visible: bool,
    ) -> Result<(), Error> {
        if tag.name != 0 {
            self.path.push(tag.name);
        }
        let visible = visible && self.filter.is_none_or(|f| f.matches(&self.path));
        let res = self.encode_value(pl, rd, visitor, tag, visible);
        if tag.name != 0 {
            self.path.pop();
        }
        res
    }

    #[allow(clippy::cast_possible_truncation)]
    fn encode_value<T: TupleVisitor + ?Sized>(
        &mut self,
        pl: &ConstPayload<'_>,
        rd: &mut Serializer<'_>,
        visitor: &mut T,
        tag: CTag,
        visible: bool,
    ) -> Result<(), Error> {
        let pos = rd.pos();
        match (tag.ty, tag.field) {
            (TAG_ARRAY, Some(field)) => {
                let count = rd.get_varuint()? as usize;
                if visible {
                    visitor.begin_array(tag.name)?;
                }
                for _ in 0..count {
                    let v = self.next_ref(pl, field)?;
                    if visible {
                        visitor.put(0, &v)?;
                    }
                }
                if visible {
                    visitor.end_array()?;
                }
            }
            (_, Some(field)) => {
                let v = self.next_ref(pl, field)?;
                if visible {
                    visitor.put(tag.name, &v)?;
                }
            }
            (TAG_OBJECT, None) => {
                if visible {
                    visitor.begin_object(tag.name)?;
                }
                loop {
                    let child = CTag::decode(rd.get_varuint()?);
                    if child.ty == TAG_END {
                        break;
                    }
                    self.encode_node(pl, rd, visitor, child, visible)?;
                }
                if visible {
                    visitor.end_object()?;
                }
            }
            (TAG_ARRAY, None) => {
                let header = CArrayTag::decode(rd.get_u32()?);
                if visible {
                    visitor.begin_array(tag.name)?;
                }
                for _ in 0..header.count {
                    let child = if header.ty == TAG_OBJECT {
                        CTag::decode(rd.get_varuint()?)
                    } else {
                        CTag::new(header.ty, 0)
                    };
                    self.encode_node(pl, rd, visitor, child, visible)?;
                }
                if visible {
                    visitor.end_array()?;
                }
            }
            (ty, None) => {
                let v = match ty {
                    TAG_VARINT => Variant::Int64(rd.get_varint()?),
                    TAG_DOUBLE => Variant::Double(rd.get_double()?),
                    TAG_STRING => Variant::from(rd.get_vstring()?),
                    TAG_BOOL => Variant::Bool(rd.get_bool()?),
                    TAG_NULL => Variant::Null,
                    _ => return Err(TupleError::UnexpectedTag { ty, pos }.into()),
                };
                if visible {
                    if v.is_null() {
                        visitor.null(tag.name)?;
                    } else {
                        visitor.put(tag.name, &v)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn next_ref(&mut self, pl: &ConstPayload<'_>, field: usize) -> Result<Variant, Error> {
        if field >= pl.num_fields() {
            return Err(TupleError::UnknownField { field }.into());
        }
        if !pl.payload_type().field(field).is_array() {
            return Ok(pl.get_at(field, 0, true));
        }
        let index = self.counters[field];
        self.counters[field] += 1;
        let len = pl.array_len(field);
        if index >= len {
            return Err(TupleError::RefOutOfRange { field, index, len }.into());
        }
        Ok(pl.get_at(field, index, true))
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    is_array: bool,
    first: bool,
}

/// Renders a tuple walk as compact JSON.
#[derive(Debug)]
pub struct JsonWriter<'a> {
    tags: &'a TagsMatcher,
    out: &'a mut String,
    frames: InlineVec<Frame, 8>,
}

impl<'a> JsonWriter<'a> {
    /// Writer appending to `out`, naming keys through `tags`.
    pub fn new(tags: &'a TagsMatcher, out: &'a mut String) -> Self {
        Self {
            tags,
            out,
            frames: InlineVec::new(),
        }
    }

    fn key(&mut self, tag: Tag) -> Result<(), Error> {
        let Some(frame) = self.frames.last_mut() else {
            return Ok(());
        };
        if !frame.first {
            self.out.push(',');
        }
        frame.first = false;
        if frame.is_array {
            return Ok(());
        }
        let tags = self.tags;
        let name = tags.tag_to_name(tag).ok_or(TupleError::UnknownTag(tag))?;
        self.string(name);
        self.out.push(':');
        Ok(())
    }

    fn string(&mut self, s: &str) {
        self.out.push('"');
        // Writing to a `String` cannot fail.
        let _ = write_escaped_string(s, &mut *self.out);
        self.out.push('"');
    }

    fn open(&mut self, tag: Tag, is_array: bool) -> Result<(), Error> {
        self.key(tag)?;
        self.out.push(if is_array { '[' } else { '{' });
        self.frames.push(Frame { is_array, first: true });
        Ok(())
    }
}

impl TupleVisitor for JsonWriter<'_> {
    fn begin_object(&mut self, tag: Tag) -> Result<(), Error> {
        self.open(tag, false)
    }

    fn end_object(&mut self) -> Result<(), Error> {
        self.frames.pop();
        self.out.push('}');
        Ok(())
    }

    fn begin_array(&mut self, tag: Tag) -> Result<(), Error> {
        self.open(tag, true)
    }

    fn end_array(&mut self) -> Result<(), Error> {
        self.frames.pop();
        self.out.push(']');
        Ok(())
    }

    fn put(&mut self, tag: Tag, value: &Variant) -> Result<(), Error> {
        self.key(tag)?;
        match value {
            Variant::Null => self.out.push_str("null"),
            Variant::Bool(b) => self.out.push_str(if *b { "true" } else { "false" }),
            Variant::Int(v) => {
                let _ = write!(self.out, "{v}");
            }
            Variant::Int64(v) => {
                let _ = write!(self.out, "{v}");
            }
            Variant::Double(v) if v.is_finite() => {
                let _ = write!(self.out, "{v}");
            }
            Variant::Double(_) => self.out.push_str("null"),
            Variant::String(s) => self.string(s),
            Variant::Tuple(b) => self.string(&String::from_utf8_lossy(b)),
        }
        Ok(())
    }

    fn null(&mut self, tag: Tag) -> Result<(), Error> {
        self.put(tag, &Variant::Null)
    }
}

/// Collects the values stored at or below a tag path.
///
/// Values are converted to the expected type unless it is
/// [`KeyValueType::Undefined`]. Nulls are skipped.
#[derive(Debug)]
pub struct FieldsExtractor<'a> {
    values: &'a mut VariantArray,
    target: &'a [Tag],
    expected: KeyValueType,
    path: TagsPath,
    frames: InlineVec<bool, 8>,
}

impl<'a> FieldsExtractor<'a> {
    pub fn new(values: &'a mut VariantArray, target: &'a [Tag], expected: KeyValueType) -> Self {
        Self {
            values,
            target,
            expected,
            path: TagsPath::new(),
            frames: InlineVec::new(),
        }
    }

    fn within(&self, tag: Tag) -> bool {
        let (path, target) = (&self.path[..], self.target);
        if path.len() >= target.len() {
            return path.starts_with(target);
        }
        tag != 0 && path.len() + 1 == target.len() && target.starts_with(path) && target[path.len()] == tag
    }

    fn open(&mut self, tag: Tag) {
        if tag != 0 {
            self.path.push(tag);
        }
        self.frames.push(tag != 0);
    }

    fn close(&mut self) {
        if self.frames.pop() == Some(true) {
            self.path.pop();
        }
    }
}

impl TupleVisitor for FieldsExtractor<'_> {
    fn begin_object(&mut self, tag: Tag) -> Result<(), Error> {
        self.open(tag);
        Ok(())
    }

    fn end_object(&mut self) -> Result<(), Error> {
        self.close();
        Ok(())
    }

    fn begin_array(&mut self, tag: Tag) -> Result<(), Error> {
        self.open(tag);
        Ok(())
    }

    fn end_array(&mut self) -> Result<(), Error> {
        self.close();
        Ok(())
    }

    fn put(&mut self, tag: Tag, value: &Variant) -> Result<(), Error> {
        if self.within(tag) {
            self.values.push(value.clone().convert(self.expected)?);
        }
        Ok(())
    }

    fn null(&mut self, _tag: Tag) -> Result<(), Error> {
        Ok(())
    }
}
