//! Property-based tests for the wire model.
//!
//! 1. Any finite progress value on the wire decodes into `0..=100`.
//! 2. Random bytes never cause a panic in `decode`.
//! 3. An assignee list never holds the same user twice, whatever the input.
//! 4. `from_ratio` stays within range and is monotonic in `completed`.

#![allow(clippy::expect_used)]

use proptest::prelude::*;
use taskboard_proto::codec;
use taskboard_proto::member::UserId;
use taskboard_proto::task::{Assignee, AssigneeList, MemberSummary, Progress, Task};

/// Strategy for a small pool of user ids, so duplicates are likely.
fn arb_user_id() -> impl Strategy<Value = UserId> {
    (0u8..6).prop_map(|n| UserId::new(format!("u{n}")))
}

/// Strategy for either wire form of an assignee.
fn arb_assignee() -> impl Strategy<Value = Assignee> {
    prop_oneof![
        arb_user_id().prop_map(Assignee::Id),
        (arb_user_id(), proptest::option::of("[a-z]{1,8}")).prop_map(|(id, name)| {
            Assignee::Member(MemberSummary {
                id,
                name,
                email: None,
            })
        }),
    ]
}

proptest! {
    #[test]
    fn progress_decodes_within_range(raw in -1.0e9f64..1.0e9) {
        let progress: Progress = serde_json::from_value(serde_json::json!(raw))
            .expect("finite numbers decode");
        prop_assert!(progress.value() <= 100);
    }

    #[test]
    fn progress_in_range_is_rounded(raw in 0.0f64..=100.0) {
        let progress: Progress = serde_json::from_value(serde_json::json!(raw))
            .expect("finite numbers decode");
        let diff = (f64::from(progress.value()) - raw).abs();
        prop_assert!(diff <= 0.5, "{raw} decoded to {progress}");
    }

    #[test]
    fn random_bytes_never_panic_on_decode(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = codec::decode::<Task>(&data);
        let _ = codec::decode::<Vec<Task>>(&data);
        let _ = codec::decode::<AssigneeList>(&data);
    }

    #[test]
    fn assignee_list_holds_unique_users(entries in prop::collection::vec(arb_assignee(), 0..16)) {
        let bytes = codec::encode(&entries).expect("assignees serialize");
        let list: AssigneeList = codec::decode(&bytes).expect("assignees deserialize");

        let ids: Vec<&UserId> = list.ids().collect();
        for (i, id) in ids.iter().enumerate() {
            prop_assert!(!ids[i + 1..].contains(id), "duplicate {id}");
        }
        for entry in &entries {
            prop_assert!(list.contains(entry.user_id()));
        }
    }

    #[test]
    fn insert_then_remove_leaves_user_absent(
        users in prop::collection::vec(arb_user_id(), 0..12),
        target in arb_user_id(),
    ) {
        let mut list: AssigneeList = users.into_iter().collect();
        let before = list.len();
        let inserted = list.insert(target.clone());
        prop_assert_eq!(list.len(), before + usize::from(inserted));
        prop_assert!(list.remove(&target));
        prop_assert!(!list.contains(&target));
    }

    #[test]
    fn from_ratio_is_bounded_and_monotonic(
        total in 0usize..200,
        a in 0usize..200,
        b in 0usize..200,
    ) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let low = Progress::from_ratio(lo, total);
        let high = Progress::from_ratio(hi, total);
        prop_assert!(high.value() <= 100);
        prop_assert!(low <= high);
        if total == 0 {
            prop_assert_eq!(high, Progress::ZERO);
        }
    }
}
