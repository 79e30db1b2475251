//! Byte-level writer and reader for tuples and serialized field values.
//!
//! Integers use LEB128 (`varuint`) and zigzag LEB128 (`varint`); fixed-width
//! values are little-endian. Strings and byte strings carry a `varuint`
//! length prefix.
use alloc::{sync::Arc, vec::Vec};
use core::fmt;

use bstr::BStr;

use crate::{
    error::{Error, TupleError},
    inline_vec::InlineVec,
    variant::{KeyValueType, Variant},
};

const INLINE_CAPACITY: usize = 0x200;

/// Growable output buffer. The first 512 bytes live inline.
#[derive(Default, Clone)]
pub struct WrSerializer {
    buf: InlineVec<u8, INLINE_CAPACITY>,
}

impl WrSerializer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.buf.to_vec()
    }

    pub fn reset(&mut self) {
        self.buf.clear();
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u32(&mut self, v: u32) {
        self.write(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    pub fn put_double(&mut self, v: f64) {
        self.put_u64(v.to_bits());
    }

    pub fn put_bool(&mut self, v: bool) {
        self.put_u8(u8::from(v));
    }

    pub fn put_varuint(&mut self, mut v: u64) {
        while v >= 0x80 {
            #[allow(clippy::cast_possible_truncation)]
            self.put_u8((v as u8) | 0x80);
            v >>= 7;
        }
        #[allow(clippy::cast_possible_truncation)]
        self.put_u8(v as u8);
    }

    #[allow(clippy::cast_sign_loss)]
    pub fn put_varint(&mut self, v: i64) {
        self.put_varuint(((v << 1) ^ (v >> 63)) as u64);
    }

    pub fn put_vbytes(&mut self, v: &[u8]) {
        self.put_varuint(v.len() as u64);
        self.write(v);
    }

    pub fn put_vstring(&mut self, v: &str) {
        self.put_vbytes(v.as_bytes());
    }

    /// Writes a type code followed by the value.
    pub fn put_variant(&mut self, v: &Variant) {
        self.put_varuint(v.value_type().code());
        match v {
            Variant::Null => {}
            Variant::Bool(b) => self.put_bool(*b),
            Variant::Int(i) => self.put_varint((*i).into()),
            Variant::Int64(i) => self.put_varint(*i),
            Variant::Double(d) => self.put_double(*d),
            Variant::String(s) => self.put_vstring(s),
            Variant::Tuple(b) => self.put_vbytes(b),
        }
    }

    /// Overwrites four bytes at `pos` with `v`.
    ///
    /// # Panics
    ///
    /// Panics if `pos + 4` exceeds the written length.
    pub fn patch_u32(&mut self, pos: usize, v: u32) {
        self.buf[pos..pos + 4].copy_from_slice(&v.to_le_bytes());
    }
}

impl fmt::Debug for WrSerializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WrSerializer")
            .field(&BStr::new(self.as_slice()))
            .finish()
    }
}

/// Reader over a byte slice written by [`WrSerializer`].
#[derive(Debug, Clone)]
pub struct Serializer<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Serializer<'a> {
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[must_use]
    pub fn pos(&self) -> usize {
        self.pos
    }

    #[must_use]
    pub fn eof(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], TupleError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or(TupleError::UnexpectedEof { pos: self.pos })?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], TupleError> {
        let mut out = [0; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn get_u8(&mut self) -> Result<u8, TupleError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u32(&mut self) -> Result<u32, TupleError> {
        self.take_array().map(u32::from_le_bytes)
    }

    pub fn get_u64(&mut self) -> Result<u64, TupleError> {
        self.take_array().map(u64::from_le_bytes)
    }

    pub fn get_double(&mut self) -> Result<f64, TupleError> {
        self.get_u64().map(f64::from_bits)
    }

    pub fn get_bool(&mut self) -> Result<bool, TupleError> {
        Ok(self.get_u8()? != 0)
    }

    pub fn get_varuint(&mut self) -> Result<u64, TupleError> {
        let start = self.pos;
        let mut v = 0u64;
        let mut shift = 0;
        loop {
            let byte = self.get_u8()?;
            if shift < 64 {
                v |= u64::from(byte & 0x7f) << shift;
            }
            if byte & 0x80 == 0 {
                return Ok(v);
            }
            shift += 7;
            if shift > 70 {
                return Err(TupleError::UnexpectedEof { pos: start });
            }
        }
    }

    #[allow(clippy::cast_possible_wrap)]
    pub fn get_varint(&mut self) -> Result<i64, TupleError> {
        let v = self.get_varuint()?;
        Ok((v >> 1) as i64 ^ -((v & 1) as i64))
    }

    pub fn get_vbytes(&mut self) -> Result<&'a [u8], TupleError> {
        let len = self.get_varuint()?;
        let len = usize::try_from(len).map_err(|_| TupleError::UnexpectedEof { pos: self.pos })?;
        self.take(len)
    }

    pub fn get_vstring(&mut self) -> Result<&'a str, TupleError> {
        let pos = self.pos;
        let bytes = self.get_vbytes()?;
        core::str::from_utf8(bytes).map_err(|_| TupleError::InvalidUtf8 { pos })
    }

    /// Reads a value written by [`WrSerializer::put_variant`].
    ///
    /// # Errors
    ///
    /// Fails on truncated input or an unknown type code.
    #[allow(clippy::cast_possible_truncation)]
    pub fn get_variant(&mut self) -> Result<Variant, Error> {
        let code = self.get_varuint()?;
        let ty = KeyValueType::from_code(code).ok_or(TupleError::UnknownValueType(code))?;
        Ok(match ty {
            KeyValueType::Null | KeyValueType::Undefined => Variant::Null,
            KeyValueType::Bool => Variant::Bool(self.get_bool()?),
            KeyValueType::Int => Variant::Int(self.get_varint()? as i32),
            KeyValueType::Int64 => Variant::Int64(self.get_varint()?),
            KeyValueType::Double => Variant::Double(self.get_double()?),
            KeyValueType::String => Variant::String(self.get_vstring()?.into()),
            KeyValueType::Tuple => Variant::Tuple(Arc::from(self.get_vbytes()?)),
        })
    }
}
