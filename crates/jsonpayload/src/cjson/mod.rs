//! Compact binary form of a JSON document (the "tuple").
//!
//! Every node starts with a *ctag*, written as a varuint:
//!
//! ```text
//!  bits 0..3    value type (TAG_*)
//!  bits 3..15   key name tag, 0 for anonymous nodes
//!  bits 15..25  indexed field + 1, 0 when the value is stored inline
//! ```
//!
//! A node with a field part carries no value: the value lives in that payload
//! field. Arrays store a `u32` header after the ctag (element count in the low
//! 24 bits, element type in the high 8); with type [`TAG_OBJECT`] every
//! element brings its own ctag. Array references carry a varuint count
//! instead. Objects end with a [`TAG_END`] ctag.
pub mod builder;
pub mod decoder;
pub mod encoder;

use crate::{payload_type::MAX_FIELDS, tags::Tag, variant::Variant};

pub const TAG_VARINT: u8 = 0;
pub const TAG_DOUBLE: u8 = 1;
pub const TAG_STRING: u8 = 2;
pub const TAG_BOOL: u8 = 3;
pub const TAG_NULL: u8 = 4;
pub const TAG_ARRAY: u8 = 5;
pub const TAG_OBJECT: u8 = 6;
pub const TAG_END: u8 = 7;

const TYPE_BITS: u32 = 3;
const NAME_BITS: u32 = 12;
const FIELD_BITS: u32 = 10;

/// Largest element count an array header holds.
pub const MAX_ARRAY_LEN: usize = (1 << 24) - 1;

/// Decoded node header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CTag {
    pub ty: u8,
    pub name: Tag,
    /// Indexed field holding the value.
    pub field: Option<usize>,
}

impl CTag {
    #[must_use]
    pub const fn new(ty: u8, name: Tag) -> Self {
        Self { ty, name, field: None }
    }

    #[must_use]
    pub const fn with_field(ty: u8, name: Tag, field: usize) -> Self {
        Self {
            ty,
            name,
            field: Some(field),
        }
    }

    #[must_use]
    pub const fn end() -> Self {
        Self::new(TAG_END, 0)
    }

    /// # Panics
    ///
    /// Panics in debug builds if a part does not fit its bit width.
    #[must_use]
    pub fn encode(self) -> u64 {
        debug_assert!(u32::from(self.ty) < 1 << TYPE_BITS);
        debug_assert!(u32::from(self.name) < 1 << NAME_BITS);
        let field = self.field.map_or(0, |f| {
            debug_assert!(f < MAX_FIELDS);
            f as u64 + 1
        });
        u64::from(self.ty) | u64::from(self.name) << TYPE_BITS | field << (TYPE_BITS + NAME_BITS)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn decode(v: u64) -> Self {
        let ty = (v & ((1 << TYPE_BITS) - 1)) as u8;
        let name = ((v >> TYPE_BITS) & ((1 << NAME_BITS) - 1)) as Tag;
        let field = ((v >> (TYPE_BITS + NAME_BITS)) & ((1 << FIELD_BITS) - 1)) as usize;
        Self {
            ty,
            name,
            field: field.checked_sub(1),
        }
    }
}

/// Array header: element count and element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CArrayTag {
    pub count: usize,
    pub ty: u8,
}

impl CArrayTag {
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode(self) -> u32 {
        (self.count & MAX_ARRAY_LEN) as u32 | u32::from(self.ty) << 24
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn decode(v: u32) -> Self {
        Self {
            count: (v as usize) & MAX_ARRAY_LEN,
            ty: (v >> 24) as u8,
        }
    }
}

/// Tag type that stores `v`.
#[must_use]
pub fn tag_type_of(v: &Variant) -> u8 {
    match v {
        Variant::Null => TAG_NULL,
        Variant::Bool(_) => TAG_BOOL,
        Variant::Int(_) | Variant::Int64(_) => TAG_VARINT,
        Variant::Double(_) => TAG_DOUBLE,
        Variant::String(_) | Variant::Tuple(_) => TAG_STRING,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(CTag::new(TAG_OBJECT, 0), 6)]
    #[case(CTag::new(TAG_STRING, 1), 0b1010)]
    #[case(CTag::with_field(TAG_ARRAY, 2, 0), 5 | 2 << 3 | 1 << 15)]
    #[case(CTag::with_field(TAG_VARINT, 4095, 1022), 4095 << 3 | 1023 << 15)]
    fn ctag_layout(#[case] tag: CTag, #[case] raw: u64) {
        assert_eq!(tag.encode(), raw);
        assert_eq!(CTag::decode(raw), tag);
    }

    #[test]
    fn array_tag_packs_count_and_type() {
        let tag = CArrayTag {
            count: 3,
            ty: TAG_OBJECT,
        };
        assert_eq!(tag.encode(), 0x0600_0003);
        assert_eq!(CArrayTag::decode(0x0600_0003), tag);
    }
}
