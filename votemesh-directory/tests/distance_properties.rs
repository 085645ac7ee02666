//! Property-based tests for the XOR distance metric.
//!
//! These verify the metric laws `find_node` correctness rests on:
//! - Symmetry: d(a, b) == d(b, a)
//! - Identity: d(a, b) == 0 exactly when a == b
//! - XOR relation: d(a, b) ^ d(b, c) == d(a, c)
//! - Unidirectionality: for a fixed target, distinct ids have distinct
//!   distances, so proximity ordering has no ties
//!
//! Additionally, we verify that `find_closest` agrees with a brute-force
//! sort of the same candidates.

use proptest::prelude::*;
use uuid::Uuid;
use votemesh_directory::{Distance, RoutingTable};
use votemesh_types::NodeId;

// =============================================================================
// HELPER STRATEGIES
// =============================================================================

fn id(value: u128) -> NodeId {
    NodeId::from_uuid(Uuid::from_u128(value))
}

fn id_strategy() -> impl Strategy<Value = NodeId> {
    any::<u128>().prop_map(id)
}

// =============================================================================
// METRIC LAW PROPERTY TESTS
// =============================================================================

mod metric_properties {
    use super::*;

    proptest! {
        /// Symmetry: the distance between two ids does not depend on
        /// which end measures it
        #[test]
        fn distance_is_symmetric(a in id_strategy(), b in id_strategy()) {
            prop_assert_eq!(Distance::between(&a, &b), Distance::between(&b, &a));
        }

        /// Identity: zero distance exactly characterizes equal ids
        #[test]
        fn zero_distance_only_for_identical_ids(a in id_strategy(), b in id_strategy()) {
            prop_assert_eq!(Distance::between(&a, &b) == Distance::ZERO, a == b);
        }

        /// XOR relation: distances along a path compose by XOR, which is
        /// what makes iterative lookups converge
        #[test]
        fn distances_compose_by_xor(
            a in id_strategy(),
            b in id_strategy(),
            c in id_strategy(),
        ) {
            let ab = Distance::between(&a, &b).raw();
            let bc = Distance::between(&b, &c).raw();
            prop_assert_eq!(ab ^ bc, Distance::between(&a, &c).raw());
        }

        /// Unidirectionality: distinct ids are never equidistant from a
        /// target, so proximity sorting has a unique answer
        #[test]
        fn distinct_ids_have_distinct_distances(
            target in id_strategy(),
            a in id_strategy(),
            b in id_strategy(),
        ) {
            prop_assume!(a != b);
            prop_assert_ne!(
                Distance::between(&target, &a),
                Distance::between(&target, &b)
            );
        }
    }
}

// =============================================================================
// LOOKUP PROPERTY TESTS
// =============================================================================

mod lookup_properties {
    use super::*;

    proptest! {
        /// `find_closest` returns exactly the k nearest live entries, in
        /// increasing distance order, matching a brute-force recount
        #[test]
        fn find_closest_matches_brute_force(
            peers in prop::collection::hash_set(any::<u128>(), 0..40),
            target in any::<u128>(),
            k in 0usize..25,
        ) {
            let local = id(u128::MAX / 2);
            let target = id(target);
            let now = 1_000u64;

            let mut table = RoutingTable::new(local, 60_000);
            for &peer in &peers {
                table.record_at(id(peer), now);
            }

            let found = table.find_closest_at(&target, k, now);

            let mut expected: Vec<NodeId> = peers
                .iter()
                .map(|&peer| id(peer))
                .filter(|peer| *peer != local)
                .collect();
            expected.sort_by_key(|peer| Distance::between(peer, &target));
            expected.truncate(k);

            let found_ids: Vec<NodeId> =
                found.iter().map(|entry| entry.node_id).collect();
            prop_assert_eq!(found_ids, expected);

            for pair in found.windows(2) {
                prop_assert!(
                    Distance::between(&pair[0].node_id, &target)
                        < Distance::between(&pair[1].node_id, &target)
                );
            }
        }
    }
}
