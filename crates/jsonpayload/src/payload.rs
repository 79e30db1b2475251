//! Typed access to the fields of a [`PayloadValue`].
//!
//! [`PayloadIface`] pairs a schema with a buffer handle. Read operations are
//! available over any handle that derefs to a [`PayloadValue`]; writes need a
//! mutable one and always unshare the buffer before touching a byte.
use alloc::{
    string::{String, ToString},
    sync::Arc,
    vec::Vec,
};
use core::{
    cmp::Ordering,
    fmt::Write as _,
    ops::{Deref, DerefMut},
};

use tracing::{debug, trace};

use crate::{
    cjson::encoder::{FieldsExtractor, TupleEncoder},
    collate::CollateOpts,
    error::Error,
    fields_set::{FieldSelector, FieldsSet},
    layout::{self, ArrayHeader},
    payload_type::{PayloadFieldType, PayloadType},
    payload_value::PayloadValue,
    serializer::WrSerializer,
    tags::{Tag, TagsMatcher},
    variant::{KeyValueType, Variant, VariantArray, compare_values, hash_values},
};

/// Stale arena entries tolerated before a write compacts the arena.
const SPARE_STRINGS: usize = 16;

/// Schema-aware view over a payload buffer.
///
/// # Examples
///
/// ```
/// use jsonpayload::{KeyValueType, Payload, PayloadFieldType, PayloadType, PayloadValue, Variant};
///
/// let mut t = PayloadType::new("docs");
/// t.add(PayloadFieldType::new(KeyValueType::Int, "id", false)).unwrap();
/// t.add(PayloadFieldType::new(KeyValueType::String, "tags", true)).unwrap();
///
/// let mut value = PayloadValue::new(t.total_size());
/// let mut pl = Payload::new(&t, &mut value);
/// pl.set(1, &[Variant::Int(5)], false).unwrap();
/// pl.set(2, &["a".into(), "b".into()], false).unwrap();
///
/// let pos = pl.resize_array(2, 1, true);
/// pl.set_at(2, pos, "c".into()).unwrap();
/// assert_eq!(pl.dump(), "id: 5, tags: [a, b, c]");
/// ```
#[derive(Debug)]
pub struct PayloadIface<'t, V> {
    t: &'t PayloadType,
    v: V,
}

/// Mutable accessor.
pub type Payload<'a> = PayloadIface<'a, &'a mut PayloadValue>;
/// Read-only accessor.
pub type ConstPayload<'a> = PayloadIface<'a, &'a PayloadValue>;

/// Which kind of schema change [`PayloadIface::copy_to`] migrates across.
/// Only the capacity reserved for the copy depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaChange {
    /// Fields were added, or changed from scalar to array.
    AddedOrUpdated,
    Removed,
}

/// Extra references to every string held by a payload.
///
/// The strings stay alive while the guard exists, even after the payload is
/// freed or its string storage is compacted.
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct StringRefs {
    strings: Vec<Variant>,
}

impl StringRefs {
    #[must_use]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Variant> {
        self.strings.iter()
    }
}

fn read_u32(bytes: &[u8], pos: usize) -> u32 {
    let mut b = [0; 4];
    b.copy_from_slice(&bytes[pos..pos + 4]);
    u32::from_le_bytes(b)
}

fn read_u64(bytes: &[u8], pos: usize) -> u64 {
    let mut b = [0; 8];
    b.copy_from_slice(&bytes[pos..pos + 8]);
    u64::from_le_bytes(b)
}

fn is_empty_str(v: &Variant) -> bool {
    match v {
        Variant::String(s) => s.is_empty(),
        Variant::Tuple(t) => t.is_empty(),
        _ => true,
    }
}

fn empty_of(kind: KeyValueType) -> Variant {
    match kind {
        KeyValueType::Tuple => Variant::Tuple(Arc::from(&[][..])),
        _ => Variant::String(Arc::from("")),
    }
}

impl<'t, V> PayloadIface<'t, V> {
    pub fn new(t: &'t PayloadType, v: V) -> Self {
        Self { t, v }
    }

    #[must_use]
    pub fn payload_type(&self) -> &'t PayloadType {
        self.t
    }

    #[must_use]
    pub fn num_fields(&self) -> usize {
        self.t.num_fields()
    }
}

impl<'t, V: Deref<Target = PayloadValue>> PayloadIface<'t, V> {
    #[must_use]
    pub fn value(&self) -> &PayloadValue {
        &self.v
    }

    #[must_use]
    pub fn as_const(&self) -> ConstPayload<'_> {
        PayloadIface {
            t: self.t,
            v: &*self.v,
        }
    }

    fn header(&self, f: &PayloadFieldType) -> ArrayHeader {
        ArrayHeader::read(&self.v.as_bytes()[f.offset()..])
    }

    #[allow(clippy::cast_possible_wrap)]
    fn read_slot(&self, kind: KeyValueType, pos: usize, hold: bool) -> Variant {
        let bytes = self.v.as_bytes();
        match kind {
            KeyValueType::Bool => Variant::Bool(bytes[pos] != 0),
            KeyValueType::Int => Variant::Int(read_u32(bytes, pos) as i32),
            KeyValueType::Int64 => Variant::Int64(read_u64(bytes, pos) as i64),
            KeyValueType::Double => Variant::Double(f64::from_bits(read_u64(bytes, pos))),
            KeyValueType::String | KeyValueType::Tuple => {
                match self.v.string(read_u32(bytes, pos)) {
                    Some(s) if hold => s.clone(),
                    Some(s) => s.detached(),
                    None => empty_of(kind),
                }
            }
            KeyValueType::Null | KeyValueType::Undefined => Variant::Null,
        }
    }

    fn collect(&self, field: usize, hold: bool) -> VariantArray {
        let f = self.t.field(field);
        if f.is_array() {
            let h = self.header(f);
            (0..h.len())
                .map(|i| self.read_slot(f.kind(), h.offset() + i * f.elem_size(), hold))
                .collect()
        } else {
            core::iter::once(self.read_slot(f.kind(), f.offset(), hold)).collect()
        }
    }

    /// Values of `field`, with string data copied out of the buffer.
    ///
    /// A scalar field yields exactly one value; an array field one value per
    /// element.
    ///
    /// # Panics
    ///
    /// Panics if `field` is outside the schema.
    #[must_use]
    pub fn get(&self, field: usize) -> VariantArray {
        self.collect(field, false)
    }

    /// Like [`get`](Self::get), but strings share the buffer's storage.
    #[must_use]
    pub fn get_held(&self, field: usize) -> VariantArray {
        self.collect(field, true)
    }

    /// One element of `field`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is not below the array length, or is not 0 for a
    /// scalar field.
    #[must_use]
    pub fn get_at(&self, field: usize, idx: usize, hold: bool) -> Variant {
        let f = self.t.field(field);
        if f.is_array() {
            let h = self.header(f);
            assert!(
                idx < h.len(),
                "field '{}.{}' bound exceeded: idx {idx} >= len {}",
                self.t.name(),
                f.name(),
                h.len()
            );
            self.read_slot(f.kind(), h.offset() + idx * f.elem_size(), hold)
        } else {
            assert!(
                idx == 0,
                "field '{}.{}' is not an array, can't get idx {idx}",
                self.t.name(),
                f.name()
            );
            self.read_slot(f.kind(), f.offset(), hold)
        }
    }

    fn string_slots(&self) -> usize {
        self.t.str_fields().iter().map(|&field| self.array_len(field)).sum()
    }

    /// Number of values [`get`](Self::get) returns for `field`.
    #[must_use]
    pub fn array_len(&self, field: usize) -> usize {
        let f = self.t.field(field);
        if f.is_array() { self.header(f).len() } else { 1 }
    }

    /// # Errors
    ///
    /// Returns [`Error::UnknownField`] if the schema has no such field.
    pub fn get_by_name(&self, name: &str) -> Result<VariantArray, Error> {
        let field = self
            .t
            .field_by_name(name)
            .ok_or_else(|| Error::UnknownField(name.into()))?;
        Ok(self.get(field))
    }

    fn array_headers(&self) -> impl Iterator<Item = (usize, ArrayHeader, usize)> + '_ {
        self.t
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_array())
            .map(|(i, f)| (i, self.header(f), f.elem_size()))
    }

    /// Bytes in use: the fixed area plus every array run.
    #[must_use]
    pub fn real_size(&self) -> usize {
        layout::real_size(self.t.total_size(), self.array_headers().map(|(_, h, s)| (h, s)))
    }

    /// The document tuple stored in field 0; empty if none was stored.
    #[must_use]
    pub fn tuple(&self) -> Arc<[u8]> {
        match self.get_at(0, 0, true) {
            Variant::Tuple(t) => t,
            _ => Arc::from(&[][..]),
        }
    }

    /// Values found at a dot-separated JSON path.
    ///
    /// Paths indexed by the schema read the field directly. Other paths are
    /// looked up in the document tuple; a path naming an unknown key yields
    /// no values. Values are converted to `expected` unless it is
    /// [`KeyValueType::Undefined`].
    ///
    /// # Errors
    ///
    /// Fails on a malformed tuple or a failed conversion.
    pub fn get_by_json_path(
        &self,
        path: &str,
        tags: &TagsMatcher,
        expected: KeyValueType,
    ) -> Result<VariantArray, Error> {
        if let Some(field) = self.t.field_by_json_path(path) {
            return self
                .get(field)
                .into_iter()
                .map(|v| v.convert(expected))
                .collect();
        }
        if self.tuple().is_empty() {
            return Ok(VariantArray::new());
        }
        match tags.path_to_tag_path(path) {
            Some(tags_path) => self.get_by_tags_path(&tags_path, expected),
            None => Ok(VariantArray::new()),
        }
    }

    /// Values found at `path` inside the document tuple.
    ///
    /// # Errors
    ///
    /// Fails on a malformed tuple or a failed conversion.
    pub fn get_by_tags_path(&self, path: &[Tag], expected: KeyValueType) -> Result<VariantArray, Error> {
        let mut values = VariantArray::new();
        let filter = FieldsSet::from_tags_path(path.iter().copied().collect());
        let mut extractor = FieldsExtractor::new(&mut values, path, expected);
        TupleEncoder::with_filter(&filter).encode(&self.as_const(), &mut extractor)?;
        Ok(values)
    }

    fn selected(&self, selector: &FieldSelector) -> Result<VariantArray, Error> {
        match selector {
            FieldSelector::Index(field) => Ok(self.get_held(*field)),
            FieldSelector::JsonPath(path) => self.get_by_tags_path(path, KeyValueType::Undefined),
        }
    }

    /// Writes the values of `fields` in set order.
    ///
    /// Scalar fields write one typed value, array fields a length followed by
    /// the elements. A JSON path must resolve to exactly one value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSingleValue`] when a JSON path does not resolve to
    /// a single value.
    pub fn serialize_fields(
        &self,
        ser: &mut WrSerializer,
        fields: &FieldsSet,
        tags: &TagsMatcher,
    ) -> Result<(), Error> {
        for selector in fields {
            match selector {
                FieldSelector::Index(field) if self.t.field(*field).is_array() => {
                    let values = self.get_held(*field);
                    ser.put_varuint(values.len() as u64);
                    for v in &values {
                        ser.put_variant(v);
                    }
                }
                FieldSelector::Index(field) => ser.put_variant(&self.get_at(*field, 0, true)),
                FieldSelector::JsonPath(path) => {
                    let values = self.get_by_tags_path(path, KeyValueType::Undefined)?;
                    if values.len() != 1 {
                        return Err(Error::NotSingleValue {
                            path: tags.tag_path_to_path(path).unwrap_or_default(),
                            count: values.len(),
                        });
                    }
                    ser.put_variant(&values[0]);
                }
            }
        }
        Ok(())
    }

    /// XOR of the per-field hashes of `fields`.
    ///
    /// XOR is commutative and equal field hashes cancel out, so this is a
    /// bucketing hash only: equal payloads hash equal, but unequal payloads
    /// may collide.
    ///
    /// # Errors
    ///
    /// Fails on a malformed tuple.
    pub fn hash(&self, fields: &FieldsSet) -> Result<u64, Error> {
        fields
            .iter()
            .try_fold(0, |acc, selector| Ok(acc ^ hash_values(&self.selected(selector)?)))
    }

    /// Returns `true` if every field of `fields` holds equal values in both
    /// payloads.
    ///
    /// # Errors
    ///
    /// Fails on a malformed tuple.
    pub fn is_eq<W: Deref<Target = PayloadValue>>(
        &self,
        other: &PayloadIface<'_, W>,
        fields: &FieldsSet,
    ) -> Result<bool, Error> {
        for selector in fields {
            if self.selected(selector)? != other.selected(selector)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Orders two payloads field by field.
    ///
    /// `collate` holds one entry per field of `fields`, or a single entry
    /// shared by all of them; an empty slice compares bytewise. Returns the
    /// ordering and the position in `fields` of the entry that decided it
    /// (`fields.len()` when equal).
    ///
    /// # Errors
    ///
    /// Fails on a malformed tuple.
    ///
    /// # Panics
    ///
    /// Panics if `collate` has several entries but fewer than `fields`.
    pub fn compare<W: Deref<Target = PayloadValue>>(
        &self,
        other: &PayloadIface<'_, W>,
        fields: &FieldsSet,
        collate: &[CollateOpts],
    ) -> Result<(Ordering, usize), Error> {
        let default = CollateOpts::default();
        for (i, selector) in fields.iter().enumerate() {
            let opts = match collate {
                [] => &default,
                [shared] => shared,
                per_field => &per_field[i],
            };
            let ord = compare_values(&self.selected(selector)?, &other.selected(selector)?, opts);
            if ord.is_ne() {
                return Ok((ord, i));
            }
        }
        Ok((Ordering::Equal, fields.len()))
    }

    /// Copies this payload into a fresh buffer laid out for `new_type`.
    ///
    /// Fields are matched by name. Fields only in `new_type` start empty;
    /// fields missing from it are dropped. The document tuple is copied as
    /// is. The LSN carries over.
    ///
    /// # Errors
    ///
    /// Fails if a kept field's values cannot be converted to its new type.
    pub fn copy_to(&self, new_type: &PayloadType, change: SchemaChange) -> Result<PayloadValue, Error> {
        let real_size = self.real_size();
        let capacity = match change {
            SchemaChange::AddedOrUpdated => {
                let grow: usize = new_type
                    .fields()
                    .iter()
                    .map(|f| match self.t.field_by_name(f.name()) {
                        None => f.size(),
                        Some(old) => f.size().saturating_sub(self.t.field(old).size()),
                    })
                    .sum();
                real_size + grow
            }
            SchemaChange::Removed => {
                let reduce: usize = self
                    .t
                    .fields()
                    .iter()
                    .filter(|f| !new_type.contains(f.name()))
                    .map(PayloadFieldType::size)
                    .sum();
                real_size.saturating_sub(reduce)
            }
        };

        let mut value = PayloadValue::from_bytes(new_type.total_size(), None, capacity);
        let mut copy = PayloadIface::new(new_type, &mut value);
        for (idx, f) in self.t.fields().iter().enumerate() {
            if let Some(new_idx) = new_type.field_by_name(f.name()) {
                copy.set(new_idx, &self.get_held(idx), false)?;
            }
        }
        value.set_lsn(self.v.lsn());
        debug!(
            from = self.t.name(),
            from_fields = self.t.num_fields(),
            to_fields = new_type.num_fields(),
            ?change,
            "migrated payload"
        );
        Ok(value)
    }

    /// Takes an extra reference to every string the payload holds.
    pub fn add_ref_strings(&self) -> StringRefs {
        let mut strings = Vec::new();
        for &field in self.t.str_fields() {
            strings.extend(self.get_held(field).into_iter().filter(|v| !is_empty_str(v)));
        }
        StringRefs { strings }
    }

    /// Renders indexed fields as `name: value, name: [a, b]`.
    #[must_use]
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (i, f) in self.t.fields().iter().enumerate().skip(1) {
            if i > 1 {
                out.push_str(", ");
            }
            let _ = write!(out, "{}: ", f.name());
            let values = self.get_held(i);
            if f.is_array() {
                out.push('[');
            }
            for (j, v) in values.iter().enumerate() {
                if j > 0 {
                    out.push_str(", ");
                }
                out.push_str(&v.to_string());
            }
            if f.is_array() {
                out.push(']');
            }
        }
        out
    }
}

impl<V: DerefMut<Target = PayloadValue>> PayloadIface<'_, V> {
    /// Makes the buffer exclusive and at least as large as the fixed area.
    fn make_writable(&mut self) {
        let total = self.t.total_size();
        self.v.clone_if_shared(total);
        let cap = self.v.capacity();
        if cap < total {
            self.v.resize(cap, total);
        }
    }

    fn write_slot(&mut self, kind: KeyValueType, pos: usize, value: &Variant) {
        let id = if is_empty_str(value) {
            0
        } else {
            // A live slot owns its entry, so it can be overwritten in place.
            let current = read_u32(self.v.as_bytes(), pos);
            if self.v.replace_string(current, value.clone()) {
                current
            } else {
                self.v.push_string(value.clone())
            }
        };
        let bytes = self.v.as_bytes_mut();
        match (kind, value) {
            (KeyValueType::Bool, Variant::Bool(b)) => bytes[pos] = u8::from(*b),
            (KeyValueType::Int, Variant::Int(i)) => bytes[pos..pos + 4].copy_from_slice(&i.to_le_bytes()),
            (KeyValueType::Int64, Variant::Int64(i)) => bytes[pos..pos + 8].copy_from_slice(&i.to_le_bytes()),
            (KeyValueType::Double, Variant::Double(d)) => {
                bytes[pos..pos + 8].copy_from_slice(&d.to_bits().to_le_bytes());
            }
            (KeyValueType::String | KeyValueType::Tuple, _) => {
                bytes[pos..pos + 4].copy_from_slice(&id.to_le_bytes());
            }
            _ => bytes[pos..pos + kind.elem_size()].fill(0),
        }
    }

    fn convert_for(&self, field: usize, value: Variant) -> Result<Variant, Error> {
        let f = self.t.field(field);
        value.convert(f.kind()).map_err(|e| e.in_field(f.name()))
    }

    /// Stores `values` into `field`.
    ///
    /// A scalar field takes the single value (no value clears it). An array
    /// field gets the values appended when `append` is set, or replaces its
    /// elements otherwise.
    ///
    /// # Errors
    ///
    /// Fails if a value cannot be converted to the field type, or if several
    /// values are given for a scalar field. The payload is unchanged on error.
    pub fn set(&mut self, field: usize, values: &[Variant], append: bool) -> Result<(), Error> {
        let t = self.t;
        let f = t.field(field);
        let converted = values
            .iter()
            .map(|v| self.convert_for(field, v.clone()))
            .collect::<Result<VariantArray, _>>()?;
        if !f.is_array() {
            if converted.len() > 1 {
                return Err(Error::ArrayForScalar {
                    field: f.name().into(),
                    expected: f.kind(),
                });
            }
            self.make_writable();
            let value = converted.into_iter().next().unwrap_or_default();
            self.write_slot(f.kind(), f.offset(), &value);
            self.compact_strings_if_sparse();
            return Ok(());
        }
        let pos = self.resize_array(field, converted.len(), append);
        let h = self.header(f);
        for (i, v) in converted.iter().enumerate() {
            self.write_slot(f.kind(), h.offset() + (pos + i) * f.elem_size(), v);
        }
        Ok(())
    }

    /// [`set`](Self::set) by field name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownField`] if the schema has no such field, or
    /// any error of [`set`](Self::set).
    pub fn set_by_name(&mut self, name: &str, values: &[Variant], append: bool) -> Result<(), Error> {
        let field = self
            .t
            .field_by_name(name)
            .ok_or_else(|| Error::UnknownField(name.into()))?;
        self.set(field, values, append)
    }

    /// Overwrites element `idx` of an array field.
    ///
    /// # Errors
    ///
    /// Fails if `value` cannot be converted to the field type.
    ///
    /// # Panics
    ///
    /// Panics if `field` is not an array or `idx` is out of bounds.
    pub fn set_at(&mut self, field: usize, idx: usize, value: Variant) -> Result<(), Error> {
        let t = self.t;
        let f = t.field(field);
        assert!(f.is_array(), "field '{}' is not an array", f.name());
        let h = self.header(f);
        assert!(idx < h.len(), "field '{}' bound exceeded: idx {idx} >= len {}", f.name(), h.len());
        let value = self.convert_for(field, value)?;
        self.make_writable();
        self.write_slot(f.kind(), h.offset() + idx * f.elem_size(), &value);
        Ok(())
    }

    /// Makes room for `count` elements in array `field` and returns the index
    /// of the first one.
    ///
    /// With `append` the elements go after the existing ones; otherwise the
    /// existing elements are dropped. New elements read as zero until set.
    /// The runs of other array fields behind the insertion point move along
    /// with their headers.
    ///
    /// # Panics
    ///
    /// Panics if `field` is not an array field.
    pub fn resize_array(&mut self, field: usize, count: usize, append: bool) -> usize {
        let t = self.t;
        let f = t.field(field);
        assert!(f.is_array(), "field '{}' is not an array", f.name());
        self.make_writable();

        let real_size = self.real_size();
        let plan = layout::plan_array_resize(self.header(f), f.elem_size(), count, append, real_size);
        let new_size = real_size + plan.grow - plan.strip;
        if new_size > real_size {
            self.v.resize(real_size, new_size);
        }

        let mut headers: Vec<_> = self.array_headers().filter(|(i, ..)| *i != field).collect();
        layout::shift_offsets(headers.iter_mut().map(|(_, h, _)| h), plan.insert, plan.delta());

        let bytes = self.v.as_bytes_mut();
        bytes.copy_within(plan.insert..real_size, plan.dest());
        let gap = plan.insert - plan.strip;
        bytes[gap..gap + plan.grow].fill(0);
        plan.header.write(&mut bytes[f.offset()..]);
        for (i, h, _) in headers {
            h.write(&mut bytes[t.field(i).offset()..]);
        }
        trace!(
            field = f.name(),
            count,
            append,
            insert = plan.insert,
            delta = plan.delta(),
            "resized array"
        );
        if plan.strip > 0 {
            self.compact_strings_if_sparse();
        }
        plan.first_pos
    }

    /// Compacts the string arena once it holds more than twice as many
    /// entries as there are string slots.
    fn compact_strings_if_sparse(&mut self) {
        let len = self.v.strings_len();
        if len > SPARE_STRINGS && len > 2 * self.string_slots() + SPARE_STRINGS {
            self.release_strings();
        }
    }

    /// Drops string storage no field refers to any more.
    ///
    /// Overwriting a string reuses its entry, but entries of stripped array
    /// elements and of strings replaced by empty ones stay behind until this
    /// runs. Writes call it once stale entries outnumber the live ones.
    /// Returns the number of entries dropped.
    pub fn release_strings(&mut self) -> usize {
        if self.v.strings_len() == 0 {
            return 0;
        }
        self.make_writable();
        let t = self.t;
        let mut slots = Vec::new();
        for &field in t.str_fields() {
            let f = t.field(field);
            if f.is_array() {
                let h = self.header(f);
                slots.extend((0..h.len()).map(|i| h.offset() + i * f.elem_size()));
            } else {
                slots.push(f.offset());
            }
        }

        let old = self.v.replace_strings(Vec::new());
        let mut kept = Vec::with_capacity(slots.len());
        let bytes = self.v.as_bytes_mut();
        for pos in slots {
            let id = read_u32(bytes, pos);
            let Some(s) = id.checked_sub(1).and_then(|i| old.get(i as usize)) else {
                continue;
            };
            kept.push(s.clone());
            let new_id = u32::try_from(kept.len()).unwrap_or(u32::MAX);
            bytes[pos..pos + 4].copy_from_slice(&new_id.to_le_bytes());
        }
        let dropped = old.len() - kept.len().min(old.len());
        self.v.replace_strings(kept);
        debug!(dropped, "compacted string storage");
        dropped
    }
}
