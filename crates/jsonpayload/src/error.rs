use alloc::{boxed::Box, string::String};

use thiserror::Error;

use crate::variant::KeyValueType;

/// Errors raised while decoding documents and operating on payloads.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("error parsing json field '{field}' - got array, expected scalar {expected}")]
    ArrayForScalar { field: String, expected: KeyValueType },

    #[error("can't convert '{value}' to {to}")]
    Conversion { value: String, to: KeyValueType },

    #[error("error parsing json field '{field}': {source}")]
    Field {
        field: String,
        #[source]
        source: Box<Error>,
    },

    #[error("PK error - field should present, and not array (json path {path:?} has {count} values)")]
    NotSingleValue { path: String, count: usize },

    #[error("{msg} at line {line} column {column}")]
    Json {
        msg: String,
        line: usize,
        column: usize,
    },

    #[error("malformed tuple: {0}")]
    Tuple(#[from] TupleError),

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("field '{0}' already exists")]
    DuplicateField(String),

    #[error("too many fields (limit {0})")]
    TooManyFields(usize),

    #[error("too many tag names (limit {0})")]
    TagsOverflow(usize),

    #[error("json nesting depth exceeds {0}")]
    DepthLimit(usize),

    #[error("array of {len} elements is too long (limit {limit})")]
    ArrayTooLong { len: usize, limit: usize },

    #[error("invalid array access: field '{field}' holds {len} values")]
    InvalidArrayAccess { field: String, len: usize },

    #[error("expected a json object, got {0}")]
    ExpectedObject(&'static str),

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
}

impl Error {
    pub(crate) fn in_field(self, field: &str) -> Self {
        match self {
            Self::Field { .. } | Self::ArrayForScalar { .. } => self,
            source => Self::Field {
                field: field.into(),
                source: Box::new(source),
            },
        }
    }
}

/// Failures while reading a binary tuple.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TupleError {
    #[error("unexpected end of input at byte {pos}")]
    UnexpectedEof { pos: usize },

    #[error("invalid utf-8 in string at byte {pos}")]
    InvalidUtf8 { pos: usize },

    #[error("unknown value type code {0}")]
    UnknownValueType(u64),

    #[error("unexpected tag type {ty} at byte {pos}")]
    UnexpectedTag { ty: u8, pos: usize },

    #[error("unknown tag {0}")]
    UnknownTag(u16),

    #[error("reference to field {field} outside the payload schema")]
    UnknownField { field: usize },

    #[error("reference to element {index} of field {field} holding {len} elements")]
    RefOutOfRange {
        field: usize,
        index: usize,
        len: usize,
    },
}
