use crate::{
    cjson::{CArrayTag, CTag, TAG_ARRAY, TAG_BOOL, TAG_DOUBLE, TAG_NULL, TAG_OBJECT, TAG_STRING, TAG_VARINT, tag_type_of},
    serializer::WrSerializer,
    tags::Tag,
    variant::Variant,
};

/// Kind of container a [`CJsonBuilder`] writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjType {
    /// Top level: nothing to open or close.
    Plain,
    Object,
    Array,
}

/// Streaming tuple writer.
///
/// [`object`](Self::object) and [`array`](Self::array) return a child
/// builder borrowing this one; dropping the child closes the container.
///
/// # Examples
///
/// ```
/// use jsonpayload::{CJsonBuilder, ObjType, WrSerializer};
///
/// let mut ser = WrSerializer::new();
/// {
///     let mut root = CJsonBuilder::new(&mut ser, ObjType::Plain);
///     let mut obj = root.object(0);
///     obj.put_int(1, 5);
///     let mut arr = obj.array(2);
///     arr.put_str(0, "a");
///     arr.put_bool(0, true);
/// }
/// assert_eq!(ser.len(), 14);
/// ```
#[derive(Debug)]
pub struct CJsonBuilder<'a> {
    ser: &'a mut WrSerializer,
    ty: ObjType,
    count_pos: usize,
    count: usize,
}

impl<'a> CJsonBuilder<'a> {
    pub fn new(ser: &'a mut WrSerializer, ty: ObjType) -> Self {
        Self {
            ser,
            ty,
            count_pos: 0,
            count: 0,
        }
    }

    fn tag(&mut self, tag: CTag) {
        if self.ty == ObjType::Array {
            self.count += 1;
        }
        self.ser.put_varuint(tag.encode());
    }

    /// Opens a nested object.
    pub fn object(&mut self, tag: Tag) -> CJsonBuilder<'_> {
        self.tag(CTag::new(TAG_OBJECT, tag));
        CJsonBuilder::new(&mut *self.ser, ObjType::Object)
    }

    /// Opens a nested array whose elements carry their own tags.
    pub fn array(&mut self, tag: Tag) -> CJsonBuilder<'_> {
        self.tag(CTag::new(TAG_ARRAY, tag));
        let count_pos = self.ser.len();
        self.ser.put_u32(
            CArrayTag {
                count: 0,
                ty: TAG_OBJECT,
            }
            .encode(),
        );
        CJsonBuilder {
            ser: &mut *self.ser,
            ty: ObjType::Array,
            count_pos,
            count: 0,
        }
    }

    pub fn put_int(&mut self, tag: Tag, v: i64) {
        self.tag(CTag::new(TAG_VARINT, tag));
        self.ser.put_varint(v);
    }

    pub fn put_double(&mut self, tag: Tag, v: f64) {
        self.tag(CTag::new(TAG_DOUBLE, tag));
        self.ser.put_double(v);
    }

    pub fn put_str(&mut self, tag: Tag, v: &str) {
        self.tag(CTag::new(TAG_STRING, tag));
        self.ser.put_vstring(v);
    }

    pub fn put_bool(&mut self, tag: Tag, v: bool) {
        self.tag(CTag::new(TAG_BOOL, tag));
        self.ser.put_bool(v);
    }

    pub fn null(&mut self, tag: Tag) {
        self.tag(CTag::new(TAG_NULL, tag));
    }

    /// Writes `v` inline.
    pub fn put(&mut self, tag: Tag, v: &Variant) {
        match v {
            Variant::Null => self.null(tag),
            Variant::Bool(b) => self.put_bool(tag, *b),
            Variant::Int(i) => self.put_int(tag, (*i).into()),
            Variant::Int64(i) => self.put_int(tag, *i),
            Variant::Double(d) => self.put_double(tag, *d),
            Variant::String(s) => self.put_str(tag, s),
            Variant::Tuple(b) => {
                self.tag(CTag::new(TAG_STRING, tag));
                self.ser.put_vbytes(b);
            }
        }
    }

    /// Records that the value of `tag` lives in payload field `field`.
    pub fn ref_scalar(&mut self, tag: Tag, v: &Variant, field: usize) {
        self.tag(CTag::with_field(tag_type_of(v), tag, field));
    }

    /// Records that the `count` elements of `tag` live in array field
    /// `field`.
    pub fn array_ref(&mut self, tag: Tag, field: usize, count: usize) {
        self.tag(CTag::with_field(TAG_ARRAY, tag, field));
        self.ser.put_varuint(count as u64);
    }
}

impl Drop for CJsonBuilder<'_> {
    fn drop(&mut self) {
        match self.ty {
            ObjType::Plain => {}
            ObjType::Object => self.ser.put_varuint(CTag::end().encode()),
            ObjType::Array => {
                let tag = CArrayTag {
                    count: self.count,
                    ty: TAG_OBJECT,
                };
                self.ser.patch_u32(self.count_pos, tag.encode());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cjson::TAG_END, serializer::Serializer};

    fn ctag(rd: &mut Serializer<'_>) -> CTag {
        CTag::decode(rd.get_varuint().unwrap())
    }

    #[test]
    fn containers_close_on_drop() {
        let mut ser = WrSerializer::new();
        {
            let mut root = CJsonBuilder::new(&mut ser, ObjType::Plain);
            let mut obj = root.object(0);
            {
                let mut arr = obj.array(3);
                arr.put_int(0, -1);
                arr.null(0);
                arr.object(0).put_double(4, 0.5);
            }
            obj.ref_scalar(5, &Variant::from("x"), 2);
            obj.array_ref(6, 3, 2);
        }

        let mut rd = Serializer::new(ser.as_slice());
        assert_eq!(ctag(&mut rd), CTag::new(TAG_OBJECT, 0));
        assert_eq!(ctag(&mut rd), CTag::new(TAG_ARRAY, 3));
        assert_eq!(
            CArrayTag::decode(rd.get_u32().unwrap()),
            CArrayTag {
                count: 3,
                ty: TAG_OBJECT
            }
        );
        assert_eq!(ctag(&mut rd), CTag::new(TAG_VARINT, 0));
        assert_eq!(rd.get_varint(), Ok(-1));
        assert_eq!(ctag(&mut rd), CTag::new(TAG_NULL, 0));
        assert_eq!(ctag(&mut rd), CTag::new(TAG_OBJECT, 0));
        assert_eq!(ctag(&mut rd), CTag::new(TAG_DOUBLE, 4));
        assert_eq!(rd.get_double(), Ok(0.5));
        assert_eq!(ctag(&mut rd), CTag::end());
        assert_eq!(ctag(&mut rd), CTag::with_field(TAG_STRING, 5, 2));
        assert_eq!(ctag(&mut rd), CTag::with_field(TAG_ARRAY, 6, 3));
        assert_eq!(rd.get_varuint(), Ok(2));
        assert_eq!(ctag(&mut rd).ty, TAG_END);
        assert!(rd.eof());
    }
}
