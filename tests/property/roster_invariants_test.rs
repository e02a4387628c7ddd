// tests/property/roster_invariants_test.rs

//! Property-based tests for the client roster
//! Tests that rotation stays fair and the cursor stays valid under churn

use chatrelay::core::roster::ClientRoster;
use proptest::prelude::*;
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Clone)]
enum RosterOp {
    Add(u64),
    Remove(u64),
    Next,
}

fn roster_op() -> impl Strategy<Value = RosterOp> {
    prop_oneof![
        3 => (0u64..12).prop_map(RosterOp::Add),
        2 => (0u64..12).prop_map(RosterOp::Remove),
        4 => Just(RosterOp::Next),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        max_shrink_iters: 1000,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_roster_membership_and_cursor(ops in prop::collection::vec(roster_op(), 1..150)) {
        let roster = ClientRoster::new(Duration::from_millis(100)).unwrap();
        let mut members: HashSet<u64> = HashSet::new();

        for op in ops {
            match op {
                RosterOp::Add(id) => {
                    prop_assert_eq!(roster.add(id, &format!("u{id}")), members.insert(id));
                }
                RosterOp::Remove(id) => {
                    prop_assert_eq!(roster.remove(id), members.remove(&id));
                }
                RosterOp::Next => {
                    let current = roster.current();
                    match roster.next() {
                        Some(node) => {
                            prop_assert_eq!(Some(node.connection_id), current);
                            prop_assert!(members.contains(&node.connection_id));
                        }
                        None => prop_assert!(members.is_empty()),
                    }
                }
            }

            prop_assert_eq!(roster.len(), members.len());
            match roster.current() {
                Some(id) => prop_assert!(members.contains(&id)),
                None => prop_assert!(members.is_empty()),
            }
        }
    }

    #[test]
    fn test_roster_full_cycle_visits_each_member_once(
        ids in prop::collection::hash_set(0u64..1000, 1..20),
        warmup in 0usize..30
    ) {
        let roster = ClientRoster::new(Duration::from_millis(100)).unwrap();
        for id in &ids {
            roster.add(*id, "member");
        }
        for _ in 0..warmup {
            roster.next();
        }

        let cycle: Vec<u64> = (0..ids.len())
            .map(|_| roster.next().unwrap().connection_id)
            .collect();
        let visited: HashSet<u64> = cycle.iter().copied().collect();
        prop_assert_eq!(visited.len(), ids.len());
        prop_assert_eq!(visited, ids);
    }
}
