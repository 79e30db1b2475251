use alloc::vec::Vec;

use quickcheck::QuickCheck;

use super::{
    arbitrary::{Op, schema, snapshot},
    quickcheck_tests,
};
use crate::{ConstPayload, Payload, PayloadValue};

/// Property: writes through a clone never show through the original handle.
#[test]
fn clone_then_write_leaves_original_unchanged() {
    #[allow(clippy::needless_pass_by_value)]
    fn prop(setup: Vec<Op>, writes: Vec<Op>) -> bool {
        let t = schema();
        let mut original = PayloadValue::new(t.total_size());
        let mut model = snapshot(&ConstPayload::new(&t, &original));
        for op in &setup {
            op.apply(&mut Payload::new(&t, &mut original), &mut model);
        }
        let before = snapshot(&ConstPayload::new(&t, &original));

        let mut copy = original.clone();
        if !copy.ptr_eq(&original) || original.ref_count() != 2 {
            return false;
        }
        let mut scratch = model.clone();
        for op in &writes {
            op.apply(&mut Payload::new(&t, &mut copy), &mut scratch);
        }

        let unchanged = snapshot(&ConstPayload::new(&t, &original)) == before;
        let copy_ok = snapshot(&ConstPayload::new(&t, &copy)) == scratch;
        let detached = writes.is_empty() || !copy.ptr_eq(&original);
        unchanged && copy_ok && detached && before == model
    }

    QuickCheck::new()
        .tests(quickcheck_tests())
        .quickcheck(prop as fn(Vec<Op>, Vec<Op>) -> bool);
}

#[test]
fn set_lsn_is_visible_through_every_handle() {
    let t = schema();
    let a = PayloadValue::new(t.total_size());
    let b = a.clone();
    assert_eq!(a.lsn(), -1);
    b.set_lsn(10);
    assert_eq!(a.lsn(), 10);

    let mut c = b.clone();
    Payload::new(&t, &mut c).set(1, &[7.into()], false).unwrap();
    c.set_lsn(11);
    assert_eq!((a.lsn(), c.lsn()), (10, 11));
}
