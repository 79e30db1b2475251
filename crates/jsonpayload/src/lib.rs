//! Schema-typed document payloads.
//!
//! A document of a [`PayloadType`] is split in two when it is decoded from
//! JSON: values at indexed paths go to fixed-offset fields of a
//! copy-on-write [`PayloadValue`], and the rest of the document is kept as a
//! compact tagged tuple (see [`cjson`]) that refers back to those fields.
//! [`PayloadIface`] reads and writes fields, resizes arrays in place,
//! compares, hashes and migrates payloads between schemas; [`Item`] bundles
//! the pieces behind a document-level API.

#![no_std]
#![allow(missing_docs)]
extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod cjson;
pub mod collate;
pub mod error;
pub mod fields_set;
pub mod inline_vec;
pub mod item;
pub mod layout;
pub mod options;
pub mod payload;
pub mod payload_type;
pub mod payload_value;
pub mod serializer;
pub mod tags;
pub mod value;
pub mod variant;

#[cfg(test)]
mod tests;

pub use cjson::{
    builder::{CJsonBuilder, ObjType},
    decoder::JsonDecoder,
    encoder::{FieldsExtractor, JsonWriter, TupleEncoder, TupleVisitor},
};
pub use collate::{CollateMode, CollateOpts};
pub use error::{Error, TupleError};
pub use fields_set::{FieldSelector, FieldsSet};
pub use inline_vec::InlineVec;
pub use item::{FieldRef, Item};
pub use options::DecoderOptions;
pub use payload::{ConstPayload, Payload, PayloadIface, SchemaChange, StringRefs};
pub use payload_type::{PayloadFieldType, PayloadType};
pub use payload_value::PayloadValue;
pub use serializer::{Serializer, WrSerializer};
pub use tags::{Tag, TagsMatcher, TagsPath};
pub use value::{Map, Value};
pub use variant::{KeyValueType, Variant, VariantArray};
