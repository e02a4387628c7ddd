// tests/property/cache_invariants_test.rs

//! Property-based tests for the message cache
//! Tests that arbitrary operation sequences keep the cache bounded and consistent

use chatrelay::core::message_cache::MessageCache;
use proptest::prelude::*;
use std::collections::HashSet;

#[derive(Debug, Clone)]
enum CacheOp {
    Insert(u8, i64),
    Lookup(u8, i64),
    Touch(u8, i64),
    Clear,
}

fn cache_op() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        6 => (0u8..6, 0i64..20).prop_map(|(s, t)| CacheOp::Insert(s, t)),
        3 => (0u8..6, 0i64..20).prop_map(|(s, t)| CacheOp::Lookup(s, t)),
        2 => (0u8..6, 0i64..20).prop_map(|(s, t)| CacheOp::Touch(s, t)),
        1 => Just(CacheOp::Clear),
    ]
}

fn sender(s: u8) -> String {
    format!("user{s}")
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        max_shrink_iters: 1000,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_cache_stays_within_capacity(
        capacity in 1usize..8,
        ops in prop::collection::vec(cache_op(), 1..200)
    ) {
        let cache = MessageCache::new(capacity).unwrap();
        let mut lookups: u64 = 0;

        for op in ops {
            match op {
                CacheOp::Insert(s, t) => {
                    let id = MessageCache::make_id(&sender(s), t);
                    let was_cached = cache.peek(&id).is_some();
                    let inserted = cache.insert(&sender(s), "payload", t);
                    // Insert succeeds exactly when the id is not already cached.
                    prop_assert_eq!(inserted, !was_cached);
                    prop_assert!(cache.peek(&id).is_some());
                }
                CacheOp::Lookup(s, t) => {
                    let id = MessageCache::make_id(&sender(s), t);
                    let expected = cache.peek(&id).map(|e| e.content);
                    prop_assert_eq!(cache.lookup(&id), expected);
                    lookups += 1;
                }
                CacheOp::Touch(s, t) => {
                    cache.update_access(&MessageCache::make_id(&sender(s), t));
                }
                CacheOp::Clear => {
                    cache.clear();
                    lookups = 0;
                    prop_assert!(cache.is_empty());
                }
            }
            prop_assert!(cache.len() <= capacity);
            prop_assert_eq!(cache.hits() + cache.misses(), lookups);
            let rate = cache.get_hit_rate();
            prop_assert!((0.0..=100.0).contains(&rate));
        }
    }

    #[test]
    fn test_cache_keeps_most_recent_distinct_inserts(
        capacity in 1usize..10,
        count in 1usize..40
    ) {
        // Without any access refresh, the survivors are the newest `capacity` inserts.
        let cache = MessageCache::new(capacity).unwrap();
        for t in 0..count as i64 {
            cache.insert("u", "x", t);
        }

        let survivors: HashSet<i64> = (0..count as i64)
            .filter(|t| cache.peek(&MessageCache::make_id("u", *t)).is_some())
            .collect();
        let first_kept = count.saturating_sub(capacity) as i64;
        let expected: HashSet<i64> = (first_kept..count as i64).collect();
        prop_assert_eq!(survivors, expected);
        prop_assert_eq!(cache.evictions(), count.saturating_sub(capacity) as u64);
    }
}
