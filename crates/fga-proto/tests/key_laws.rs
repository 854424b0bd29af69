//! Property coverage for `CacheKey`'s determinism: the same seven fields
//! always fingerprint to the same key, and changing any one field changes
//! the fingerprint (bounded by the 2⁻¹²⁸ collision chance this accepts).

use fga_proto::CacheKey;
use proptest::prelude::*;

fn arb_field() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_:-]{0,24}"
}

proptest! {
    #[test]
    fn same_fields_always_fingerprint_identically(
        store in arb_field(), obj_type in arb_field(), obj_id in arb_field(),
        subj_type in arb_field(), subj_id in arb_field(), relation in arb_field(),
    ) {
        let a = CacheKey::new(&store, None, &obj_type, &obj_id, &subj_type, &subj_id, &relation);
        let b = CacheKey::new(&store, None, &obj_type, &obj_id, &subj_type, &subj_id, &relation);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn changing_the_relation_field_changes_the_fingerprint(
        store in arb_field(), obj_type in arb_field(), obj_id in arb_field(),
        subj_type in arb_field(), subj_id in arb_field(),
        relation_a in "[a-z]{1,8}", relation_b in "[a-z]{1,8}",
    ) {
        prop_assume!(relation_a != relation_b);
        let a = CacheKey::new(&store, None, &obj_type, &obj_id, &subj_type, &subj_id, &relation_a);
        let b = CacheKey::new(&store, None, &obj_type, &obj_id, &subj_type, &subj_id, &relation_b);
        prop_assert_ne!(a, b);
    }
}
