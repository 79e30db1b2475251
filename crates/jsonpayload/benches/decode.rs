//! Benchmark – `jsonpayload::Item` decode and encode
#![allow(missing_docs)]

use std::{fmt::Write, time::Duration};

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use jsonpayload::{FieldsSet, Item, KeyValueType, PayloadFieldType, PayloadType};

fn schema() -> PayloadType {
    let mut t = PayloadType::new("products");
    t.add(PayloadFieldType::new(KeyValueType::Int, "id", false)).unwrap();
    t.add(PayloadFieldType::new(KeyValueType::String, "tags", true)).unwrap();
    t.add(PayloadFieldType::new(KeyValueType::Double, "price", false).with_json_paths(&["offer.price"]))
        .unwrap();
    t.add(PayloadFieldType::new(KeyValueType::Int64, "nums", true)).unwrap();
    t
}

/// A deterministic document with `n` tags, `n` numbers and `n` unindexed
/// sub-objects.
fn make_document(n: usize) -> String {
    let mut s = String::from(r#"{"id":42,"offer":{"price":9.75,"currency":"EUR"},"tags":["#);
    for i in 0..n {
        if i > 0 {
            s.push(',');
        }
        write!(s, r#""tag{i}""#).unwrap();
    }
    s.push_str(r#"],"nums":["#);
    for i in 0..n {
        if i > 0 {
            s.push(',');
        }
        write!(s, "{}", i * 7).unwrap();
    }
    s.push_str(r#"],"parts":["#);
    for i in 0..n {
        if i > 0 {
            s.push(',');
        }
        write!(s, r#"{{"name":"part{i}","weight":{}.5,"ok":true}}"#, i % 10).unwrap();
    }
    s.push_str("]}");
    s
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("item_codec");

    for &n in &[10usize, 100, 1_000] {
        let doc = make_document(n);
        let mut item = Item::new(schema()).unwrap();
        item.from_json(&doc).unwrap();

        group.bench_with_input(BenchmarkId::new("from_json", n), &doc, |b, doc| {
            b.iter(|| item.from_json(black_box(doc)).unwrap());
        });

        let mut filter = FieldsSet::from_fields(&[1]);
        filter.push_tags_path(item.tags_matcher().path_to_tag_path("parts.name").unwrap());
        group.bench_with_input(BenchmarkId::new("from_json_filtered", n), &doc, |b, doc| {
            b.iter(|| item.from_json_with_filter(black_box(doc), &filter).unwrap());
        });

        item.from_json(&doc).unwrap();
        group.bench_with_input(BenchmarkId::new("get_json", n), &item, |b, item| {
            b.iter(|| black_box(item.get_json().unwrap()));
        });
    }
    group.finish();
}

fn bench_copy_on_write(c: &mut Criterion) {
    let mut item = Item::new(schema()).unwrap();
    item.from_json(&make_document(1_000)).unwrap();

    c.bench_function("clone_then_write", |b| {
        b.iter(|| {
            let mut copy = item.clone();
            copy.field("id").set(black_box(7)).unwrap();
            black_box(copy);
        });
    });
}

fn criterion() -> Criterion {
    let mut c = Criterion::default();
    if cfg!(feature = "bench-fast") {
        c = c
            .warm_up_time(Duration::from_millis(10))
            .measurement_time(Duration::from_millis(100))
            .sample_size(10);
    } else {
        c = c
            .warm_up_time(Duration::from_secs(3))
            .measurement_time(Duration::from_secs(5));
    }
    c
}

criterion_group! { name = benches; config = criterion(); targets = bench_codec, bench_copy_on_write }
criterion_main!(benches);
