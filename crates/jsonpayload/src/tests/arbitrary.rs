use alloc::{string::String, vec::Vec};

use quickcheck::{Arbitrary, Gen};

use crate::{
    KeyValueType, PayloadFieldType, PayloadType, Variant,
    value::{Map, Value},
};

/// Numbers that print and parse back exactly.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct JsonNumber(pub f64);

impl Arbitrary for JsonNumber {
    fn arbitrary(g: &mut Gen) -> Self {
        Self(f64::from(i32::arbitrary(g)) / 4.0)
    }
}

const KEYS: &[&str] = &["id", "tags", "meta", "score", "a", "b", ""];

fn key(g: &mut Gen) -> String {
    if bool::arbitrary(g) {
        String::from(*g.choose(KEYS).unwrap_or(&"a"))
    } else {
        String::arbitrary(g)
    }
}

fn scalar(g: &mut Gen) -> Value {
    match usize::arbitrary(g) % 4 {
        0 => Value::Null,
        1 => Value::Boolean(bool::arbitrary(g)),
        2 => Value::Number(JsonNumber::arbitrary(g).0),
        _ => Value::String(String::arbitrary(g)),
    }
}

fn gen_val(g: &mut Gen, depth: usize) -> Value {
    if depth == 0 {
        return scalar(g);
    }
    match usize::arbitrary(g) % 6 {
        0..=3 => scalar(g),
        4 => {
            let len = usize::arbitrary(g) % 4;
            Value::Array((0..len).map(|_| gen_val(g, depth - 1)).collect())
        }
        _ => Value::Object(gen_map(g, depth - 1)),
    }
}

fn gen_map(g: &mut Gen, depth: usize) -> Map {
    let len = usize::arbitrary(g) % 4;
    (0..len).map(|_| (key(g), gen_val(g, depth))).collect()
}

impl Arbitrary for Value {
    fn arbitrary(g: &mut Gen) -> Self {
        let depth = usize::arbitrary(g) % 3;
        gen_val(g, depth)
    }
}

/// A JSON object whose indexed keys mostly hold values of the indexed
/// types of [`schema`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Document(pub Value);

impl Arbitrary for Document {
    fn arbitrary(g: &mut Gen) -> Self {
        let mut map = gen_map(g, 2);
        if bool::arbitrary(g) {
            let id = match usize::arbitrary(g) % 4 {
                0 => Value::Null,
                _ => Value::Number(f64::from(i16::arbitrary(g))),
            };
            map.insert("id".into(), id);
        }
        if bool::arbitrary(g) {
            let len = usize::arbitrary(g) % 5;
            let tags = (0..len).map(|_| Value::String(String::arbitrary(g))).collect();
            map.insert("tags".into(), Value::Array(tags));
        }
        if bool::arbitrary(g) {
            let mut meta = Map::new();
            meta.insert("score".into(), Value::Number(JsonNumber::arbitrary(g).0));
            map.insert("meta".into(), Value::Object(meta));
        }
        Self(Value::Object(map))
    }
}

/// `[-tuple, id: int, tags: string[], score: double @ meta.score, nums: int64[]]`
pub(crate) fn schema() -> PayloadType {
    let mut t = PayloadType::new("docs");
    for f in [
        PayloadFieldType::new(KeyValueType::Int, "id", false),
        PayloadFieldType::new(KeyValueType::String, "tags", true),
        PayloadFieldType::new(KeyValueType::Double, "score", false).with_json_paths(&["meta.score"]),
        PayloadFieldType::new(KeyValueType::Int64, "nums", true),
    ] {
        t.add(f).unwrap();
    }
    t
}

/// One write against the fields of [`schema`].
#[derive(Debug, Clone)]
pub(crate) enum Op {
    SetId(i32),
    SetTags { values: Vec<String>, append: bool },
    SetNums { values: Vec<i64>, append: bool },
    SetScore(JsonNumber),
    Resize { field: usize, count: usize, append: bool },
}

impl Arbitrary for Op {
    fn arbitrary(g: &mut Gen) -> Self {
        match usize::arbitrary(g) % 5 {
            0 => Op::SetId(i32::arbitrary(g)),
            1 => Op::SetTags {
                values: Vec::arbitrary(g),
                append: bool::arbitrary(g),
            },
            2 => Op::SetNums {
                values: Vec::arbitrary(g),
                append: bool::arbitrary(g),
            },
            3 => Op::SetScore(JsonNumber::arbitrary(g)),
            _ => Op::Resize {
                field: if bool::arbitrary(g) { 2 } else { 4 },
                count: usize::arbitrary(g) % 6,
                append: bool::arbitrary(g),
            },
        }
    }
}

impl Op {
    /// Applies the write through `pl` and to `model`, which holds the
    /// expected values of every field.
    pub(crate) fn apply(&self, pl: &mut crate::Payload<'_>, model: &mut [Vec<Variant>]) {
        fn store(model: &mut Vec<Variant>, values: Vec<Variant>, append: bool) {
            if !append {
                model.clear();
            }
            model.extend(values);
        }

        match self {
            Op::SetId(id) => {
                pl.set(1, &[Variant::Int(*id)], false).unwrap();
                model[1] = alloc::vec![Variant::Int(*id)];
            }
            Op::SetTags { values, append } => {
                let values: Vec<Variant> = values.iter().map(|s| Variant::from(s.as_str())).collect();
                pl.set(2, &values, *append).unwrap();
                store(&mut model[2], values, *append);
            }
            Op::SetNums { values, append } => {
                let values: Vec<Variant> = values.iter().map(|&n| Variant::Int64(n)).collect();
                pl.set(4, &values, *append).unwrap();
                store(&mut model[4], values, *append);
            }
            Op::SetScore(n) => {
                pl.set(3, &[Variant::Double(n.0)], false).unwrap();
                model[3] = alloc::vec![Variant::Double(n.0)];
            }
            Op::Resize { field, count, append } => {
                pl.resize_array(*field, *count, *append);
                let zero = match field {
                    2 => Variant::from(""),
                    _ => Variant::Int64(0),
                };
                store(&mut model[*field], alloc::vec![zero; *count], *append);
            }
        }
    }
}

/// Values of every field but the tuple.
pub(crate) fn snapshot(pl: &crate::ConstPayload<'_>) -> Vec<Vec<Variant>> {
    (0..pl.num_fields())
        .map(|f| if f == 0 { Vec::new() } else { pl.get(f).into_iter().collect() })
        .collect()
}
