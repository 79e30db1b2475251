//! Typed values stored in payload fields.
use alloc::{
    string::{String, ToString},
    sync::Arc,
};
use core::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

use ahash::RandomState;
use bstr::BStr;

use crate::{
    collate::{CollateOpts, collate_compare},
    error::Error,
    inline_vec::InlineVec,
};

/// Type of a payload field or of a [`Variant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyValueType {
    Int64,
    Double,
    String,
    Bool,
    Null,
    Int,
    Undefined,
    Tuple,
}

impl KeyValueType {
    /// Size in bytes of one stored element of this type.
    ///
    /// String-like values store a 4-byte handle into the buffer's string
    /// storage.
    #[must_use]
    pub const fn elem_size(self) -> usize {
        match self {
            Self::Bool => 1,
            Self::Int | Self::String | Self::Tuple => 4,
            Self::Int64 | Self::Double => 8,
            Self::Null | Self::Undefined => 0,
        }
    }

    /// Wire code used by [`WrSerializer::put_variant`](crate::WrSerializer::put_variant).
    #[must_use]
    pub const fn code(self) -> u64 {
        match self {
            Self::Int64 => 0,
            Self::Double => 1,
            Self::String => 2,
            Self::Bool => 3,
            Self::Null => 4,
            Self::Int => 8,
            Self::Undefined => 9,
            Self::Tuple => 11,
        }
    }

    #[must_use]
    pub const fn from_code(code: u64) -> Option<Self> {
        Some(match code {
            0 => Self::Int64,
            1 => Self::Double,
            2 => Self::String,
            3 => Self::Bool,
            4 => Self::Null,
            8 => Self::Int,
            9 => Self::Undefined,
            11 => Self::Tuple,
            _ => return None,
        })
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Int64 => "int64",
            Self::Double => "double",
            Self::String => "string",
            Self::Bool => "bool",
            Self::Null => "null",
            Self::Int => "int",
            Self::Undefined => "undefined",
            Self::Tuple => "tuple",
        }
    }
}

impl fmt::Display for KeyValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single typed value.
///
/// Strings and tuples are reference counted, so cloning a `Variant` never
/// copies string data.
#[derive(Clone, PartialEq, Default)]
pub enum Variant {
    #[default]
    Null,
    Bool(bool),
    Int(i32),
    Int64(i64),
    Double(f64),
    String(Arc<str>),
    /// Raw binary tuple of a document.
    Tuple(Arc<[u8]>),
}

/// Values of one field. Scalar fields produce exactly one element.
pub type VariantArray = InlineVec<Variant, 2>;

impl Variant {
    #[must_use]
    pub fn value_type(&self) -> KeyValueType {
        match self {
            Self::Null => KeyValueType::Null,
            Self::Bool(_) => KeyValueType::Bool,
            Self::Int(_) => KeyValueType::Int,
            Self::Int64(_) => KeyValueType::Int64,
            Self::Double(_) => KeyValueType::Double,
            Self::String(_) => KeyValueType::String,
            Self::Tuple(_) => KeyValueType::Tuple,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(&**s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Int(v) => Some(v.into()),
            Self::Int64(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Int(v) => Some(v.into()),
            Self::Int64(v) => Some(v as f64),
            Self::Double(v) => Some(v),
            _ => None,
        }
    }

    /// Returns a copy whose string data no longer shares storage with `self`.
    #[must_use]
    pub fn detached(&self) -> Self {
        match self {
            Self::String(s) => Self::String(Arc::from(&**s)),
            Self::Tuple(b) => Self::Tuple(Arc::from(&**b)),
            v => v.clone(),
        }
    }

    /// Converts the value to type `to`.
    ///
    /// Numbers convert between each other when they fit the target range
    /// (doubles are truncated toward zero), strings are parsed, and numbers
    /// and booleans format to strings. `Null` stays `Null`, and converting to
    /// [`KeyValueType::Undefined`] returns the value unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conversion`] if the value cannot be represented as
    /// `to`.
    ///
    /// # Examples
    ///
    /// ```
    /// use jsonpayload::{KeyValueType, Variant};
    ///
    /// let v = Variant::String("42".into()).convert(KeyValueType::Int).unwrap();
    /// assert_eq!(v, Variant::Int(42));
    /// assert!(Variant::Int64(1 << 40).convert(KeyValueType::Int).is_err());
    /// ```
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn convert(self, to: KeyValueType) -> Result<Self, Error> {
        let from = self.value_type();
        if from == to || to == KeyValueType::Undefined || from == KeyValueType::Null {
            return Ok(self);
        }
        let fail = |v: &Self| Error::Conversion {
            value: v.to_string(),
            to,
        };
        let converted = match (&self, to) {
            (Self::Bool(_), KeyValueType::String) => Some(Self::String(self.to_string().into())),
            (Self::Bool(b), _) => Self::Int64(i64::from(*b)).convert(to).ok(),
            (Self::Int(_) | Self::Int64(_), KeyValueType::Int) => {
                self.as_i64().and_then(|v| i32::try_from(v).ok()).map(Self::Int)
            }
            (Self::Int(_) | Self::Int64(_), KeyValueType::Int64) => self.as_i64().map(Self::Int64),
            (Self::Int(_) | Self::Int64(_) | Self::Double(_), KeyValueType::Double) => {
                self.as_f64().map(Self::Double)
            }
            (Self::Double(d), KeyValueType::Int) => (d.is_finite()
                && *d > f64::from(i32::MIN) - 1.0
                && *d < f64::from(i32::MAX) + 1.0)
                .then(|| Self::Int(*d as i32)),
            (Self::Double(d), KeyValueType::Int64) => {
                (d.is_finite() && *d >= -9.223_372_036_854_775_808e18 && *d < 9.223_372_036_854_775_808e18)
                    .then(|| Self::Int64(*d as i64))
            }
            (Self::Int(_) | Self::Int64(_) | Self::Double(_), KeyValueType::Bool) => {
                self.as_f64().map(|v| Self::Bool(v != 0.0))
            }
            (Self::Int(_) | Self::Int64(_) | Self::Double(_), KeyValueType::String) => {
                Some(Self::String(self.to_string().into()))
            }
            (Self::String(s), KeyValueType::Int) => s.trim().parse().ok().map(Self::Int),
            (Self::String(s), KeyValueType::Int64) => s.trim().parse().ok().map(Self::Int64),
            (Self::String(s), KeyValueType::Double) => s.trim().parse().ok().map(Self::Double),
            (Self::String(s), KeyValueType::Bool) => parse_bool(s).map(Self::Bool),
            (Self::String(s), KeyValueType::Tuple) => Some(Self::Tuple(Arc::from(s.as_bytes()))),
            (Self::Tuple(b), KeyValueType::String) => core::str::from_utf8(b).ok().map(|s| Self::String(s.into())),
            (_, KeyValueType::Null) => Some(Self::Null),
            _ => None,
        };
        converted.ok_or_else(|| fail(&self))
    }

    /// Orders two values. Strings use `opts`; numbers compare by value across
    /// integer and floating types; values of unrelated types order by type.
    #[must_use]
    pub fn compare(&self, other: &Self, opts: &CollateOpts) -> Ordering {
        match (self, other) {
            (Self::String(a), Self::String(b)) => collate_compare(a, b, opts),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Tuple(a), Self::Tuple(b)) => a.cmp(b),
            (Self::Null, Self::Null) => Ordering::Equal,
            _ => match (self.as_i64(), other.as_i64()) {
                (Some(a), Some(b)) => a.cmp(&b),
                _ => match (self.as_f64(), other.as_f64()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
                    _ => self.rank().cmp(&other.rank()),
                },
            },
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) | Self::Int64(_) | Self::Double(_) => 2,
            Self::String(_) => 3,
            Self::Tuple(_) => 4,
        }
    }

    /// Deterministic 64-bit content hash.
    #[must_use]
    pub fn hash_value(&self) -> u64 {
        hasher().hash_one(self)
    }
}

fn hasher() -> RandomState {
    RandomState::with_seeds(
        0x243f_6a88_85a3_08d3,
        0x1319_8a2e_0370_7344,
        0xa409_3822_299f_31d0,
        0x082e_fa98_ec4e_6c89,
    )
}

fn parse_bool(s: &str) -> Option<bool> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("true") || s == "1" {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") || s == "0" {
        Some(false)
    } else {
        None
    }
}

/// Hash of all values of one field: the element count XOR each element's hash.
///
/// XOR makes the result independent of element order, and pairs of equal
/// elements cancel out. Collisions are possible; equality must be checked
/// separately.
#[must_use]
pub fn hash_values(values: &[Variant]) -> u64 {
    values
        .iter()
        .fold(values.len() as u64, |acc, v| acc ^ v.hash_value())
}

/// Compares element-wise up to the shorter length, then by length.
#[must_use]
pub fn compare_values(a: &[Variant], b: &[Variant], opts: &CollateOpts) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.compare(y, opts))
        .find(|ord| ord.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

/// Bits of `v` with both zeros folded together and every NaN folded into
/// one, so values that compare equal hash equal.
fn canonical_bits(v: f64) -> u64 {
    if v == 0.0 {
        0
    } else if v.is_nan() {
        f64::NAN.to_bits()
    } else {
        v.to_bits()
    }
}

impl Hash for Variant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(v) => v.hash(state),
            Self::Int(v) => v.hash(state),
            Self::Int64(v) => v.hash(state),
            Self::Double(v) => canonical_bits(*v).hash(state),
            Self::String(v) => v.hash(state),
            Self::Tuple(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
            Self::Tuple(v) => write!(f, "{}", BStr::new(&**v)),
        }
    }
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Self::Int(v) => f.debug_tuple("Int").field(v).finish(),
            Self::Int64(v) => f.debug_tuple("Int64").field(v).finish(),
            Self::Double(v) => f.debug_tuple("Double").field(v).finish(),
            Self::String(v) => f.debug_tuple("String").field(v).finish(),
            Self::Tuple(v) => f.debug_tuple("Tuple").field(&BStr::new(&**v)).finish(),
        }
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Variant {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for Variant {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Self::String(v.into())
    }
}

impl From<String> for Variant {
    fn from(v: String) -> Self {
        Self::String(v.into())
    }
}
