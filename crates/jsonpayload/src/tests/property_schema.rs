use alloc::vec::Vec;

use quickcheck::QuickCheck;

use super::{
    arbitrary::{Op, schema, snapshot},
    quickcheck_tests,
};
use crate::{
    ConstPayload, FieldsSet, KeyValueType, Payload, PayloadFieldType, PayloadType, PayloadValue, SchemaChange,
    Variant,
};

fn filled(ops: &[Op]) -> (PayloadType, PayloadValue) {
    let t = schema();
    let mut value = PayloadValue::new(t.total_size());
    let mut model = snapshot(&ConstPayload::new(&t, &value));
    for op in ops {
        op.apply(&mut Payload::new(&t, &mut value), &mut model);
    }
    (t, value)
}

/// Property: adding an array field keeps every value and starts the new
/// field empty.
#[test]
fn migration_adds_empty_field() {
    #[allow(clippy::needless_pass_by_value)]
    fn prop(ops: Vec<Op>) -> bool {
        let (t, value) = filled(&ops);
        let mut wider = t.clone();
        wider
            .add(PayloadFieldType::new(KeyValueType::String, "labels", true))
            .unwrap();

        let old = ConstPayload::new(&t, &value);
        let Ok(copy) = old.copy_to(&wider, SchemaChange::AddedOrUpdated) else {
            return false;
        };
        let new = ConstPayload::new(&wider, &copy);
        let mut expected = snapshot(&old);
        expected.push(Vec::new());
        snapshot(&new) == expected && copy.lsn() == value.lsn()
    }

    QuickCheck::new()
        .tests(quickcheck_tests())
        .quickcheck(prop as fn(Vec<Op>) -> bool);
}

/// Property: dropping a field keeps the values of every other field.
#[test]
fn migration_drops_one_field() {
    #[allow(clippy::needless_pass_by_value)]
    fn prop(ops: Vec<Op>, drop: usize) -> bool {
        let (t, value) = filled(&ops);
        let dropped = 2 + drop % (t.num_fields() - 2);
        let mut narrower = t.clone();
        narrower.drop_field(t.field(dropped).name()).unwrap();

        let old = ConstPayload::new(&t, &value);
        let Ok(copy) = old.copy_to(&narrower, SchemaChange::Removed) else {
            return false;
        };
        let new = ConstPayload::new(&narrower, &copy);
        let mut expected = snapshot(&old);
        expected.remove(dropped);
        snapshot(&new) == expected
    }

    QuickCheck::new()
        .tests(quickcheck_tests())
        .quickcheck(prop as fn(Vec<Op>, usize) -> bool);
}

/// Property: payloads with equal values hash equal and compare equal; a
/// change to a selected field breaks equality.
#[test]
fn hash_agrees_with_equality() {
    #[allow(clippy::needless_pass_by_value)]
    fn prop(ops: Vec<Op>, id: i32) -> bool {
        let (t, a) = filled(&ops);
        let (_, b) = filled(&ops);
        let fields = FieldsSet::from_fields(&[1, 2, 3, 4]);
        let (pa, pb) = (ConstPayload::new(&t, &a), ConstPayload::new(&t, &b));
        if pa.hash(&fields) != pb.hash(&fields) || pa.is_eq(&pb, &fields) != Ok(true) {
            return false;
        }

        let mut c = b.clone();
        let mut pc = Payload::new(&t, &mut c);
        let current = pc.get(1);
        pc.set(1, &[Variant::Int(id)], false).unwrap();
        let changed = current[..] != [Variant::Int(id)];
        pa.is_eq(&pc, &fields) == Ok(!changed)
    }

    QuickCheck::new()
        .tests(quickcheck_tests())
        .quickcheck(prop as fn(Vec<Op>, i32) -> bool);
}

/// Property: payloads that differ only in the sign of a zero score are equal
/// and hash equal.
#[test]
fn signed_zero_hashes_like_zero() {
    #[allow(clippy::needless_pass_by_value)]
    fn prop(ops: Vec<Op>, negative: bool) -> bool {
        let (t, mut a) = filled(&ops);
        let mut b = a.clone();
        Payload::new(&t, &mut a)
            .set(3, &[Variant::Double(0.0)], false)
            .unwrap();
        let zero = if negative { -0.0 } else { 0.0 };
        Payload::new(&t, &mut b)
            .set(3, &[Variant::Double(zero)], false)
            .unwrap();

        let fields = FieldsSet::from_fields(&[1, 2, 3, 4]);
        let (pa, pb) = (ConstPayload::new(&t, &a), ConstPayload::new(&t, &b));
        pa.is_eq(&pb, &fields) == Ok(true) && pa.hash(&fields) == pb.hash(&fields)
    }

    QuickCheck::new()
        .tests(quickcheck_tests())
        .quickcheck(prop as fn(Vec<Op>, bool) -> bool);
}
