#![no_main]
use arbitrary::{Arbitrary, Unstructured};
use jsonpayload::{DecoderOptions, FieldsSet, Item, KeyValueType, PayloadFieldType, PayloadType};
use libfuzzer_sys::fuzz_target;
use serde_json::{Map, Value};

#[derive(Debug)]
struct ArbitraryValue(Value);

impl<'a> Arbitrary<'a> for ArbitraryValue {
    fn arbitrary(u: &mut Unstructured<'_>) -> arbitrary::Result<Self> {
        let value = match u.choose_index(21)? {
            0 => Value::Null,
            1 => Value::Bool(u.arbitrary()?),
            2 => {
                let n: f64 = u.arbitrary()?;
                Value::Number(serde_json::Number::from_f64(n).ok_or(arbitrary::Error::IncorrectFormat)?)
            }
            3 => Value::from(u.arbitrary::<i32>()?),
            4..=9 => Value::String(u.arbitrary()?),
            10 => Value::String((*u.choose(&["id", "tags", "offer", "price", "nums"])?).to_owned()),
            11..=15 => {
                let elems: Vec<ArbitraryValue> = u.arbitrary()?;
                Value::Array(elems.into_iter().map(|v| v.0).collect())
            }
            _ => {
                let m: Vec<(ArbitraryKey, ArbitraryValue)> = u.arbitrary()?;
                Value::Object(Map::from_iter(m.into_iter().map(|(k, v)| (k.0, v.0))))
            }
        };
        Ok(ArbitraryValue(value))
    }
}

/// Object keys, biased towards the indexed ones.
#[derive(Debug)]
struct ArbitraryKey(String);

impl<'a> Arbitrary<'a> for ArbitraryKey {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        if u.ratio(1u8, 2u8)? {
            Ok(Self((*u.choose(&["id", "tags", "offer", "price", "nums", ""])?).to_owned()))
        } else {
            Ok(Self(u.arbitrary()?))
        }
    }
}

fn schema() -> PayloadType {
    let mut t = PayloadType::new("fuzz");
    for f in [
        PayloadFieldType::new(KeyValueType::Int, "id", false),
        PayloadFieldType::new(KeyValueType::String, "tags", true),
        PayloadFieldType::new(KeyValueType::Double, "price", false).with_json_paths(&["offer.price"]),
        PayloadFieldType::new(KeyValueType::Int64, "nums", true),
    ] {
        t.add(f).unwrap();
    }
    t
}

fn decode(data: &[u8]) {
    let Some((&flags, rest)) = data.split_first() else {
        return;
    };
    let options = DecoderOptions {
        max_depth: (flags & 1 != 0).then_some(8),
        keep_integral_doubles: flags & 2 != 0,
        ..Default::default()
    };
    let mut item = Item::new(schema()).unwrap().with_options(options);

    // Raw text must never panic, whatever it holds.
    let _ = item.from_json(&String::from_utf8_lossy(rest));

    let Ok(doc) = ArbitraryValue::arbitrary(&mut Unstructured::new(rest)) else {
        return;
    };
    let text = doc.0.to_string();
    let decoded = if flags & 4 != 0 {
        let filter = FieldsSet::from_fields(&[1, 3]);
        item.from_json_with_filter(&text, &filter)
    } else {
        item.from_json(&text)
    };
    if decoded.is_err() {
        return;
    }

    let json = item.get_json().expect("decoded tuple renders");
    let mut again = item.clone();
    again.from_json(&json).expect("rendered json decodes");
    assert_eq!(again.get_json().expect("decoded tuple renders"), json);
    assert_eq!(again.payload().dump(), item.payload().dump());
}

fuzz_target!(|data: &[u8]| decode(data));
