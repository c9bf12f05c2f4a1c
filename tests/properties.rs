use std::collections::BTreeMap;

use itertools::Itertools;
use phylonet::{generate_tree_with_rng, newick::parse_newick, tree::Tree};
use proptest::prelude::*;
use rand::{rngs::StdRng, SeedableRng};

const EPSILON: f64 = 1e-9;

fn random_tree(seed: u64, n_leaves: usize, brlens: bool) -> Tree {
    generate_tree_with_rng(n_leaves, brlens, &mut StdRng::seed_from_u64(seed)).unwrap()
}

// Distances between every pair of leaves, keyed by their labels
fn tip_distances(tree: &Tree) -> BTreeMap<(String, String), f64> {
    let leaves = tree.get_leaves().unwrap();
    leaves
        .iter()
        .tuple_combinations()
        .map(|(a, b)| {
            let label_a = tree.get(a).unwrap().label.clone().unwrap();
            let label_b = tree.get(b).unwrap().label.clone().unwrap();
            let (dist, _) = tree.get_distance(a, b).unwrap();
            let key = if label_a < label_b {
                (label_a, label_b)
            } else {
                (label_b, label_a)
            };
            (key, dist.unwrap())
        })
        .collect()
}

fn sorted_labels(tree: &Tree) -> Vec<String> {
    tree.get_leaf_labels()
        .unwrap()
        .into_iter()
        .flatten()
        .sorted()
        .collect()
}

proptest! {
    #[test]
    fn youngest_node_has_age_zero(seed in any::<u64>(), n_leaves in 1_usize..60) {
        let tree = random_tree(seed, n_leaves, true);
        let heights = tree
            .get_node_list()
            .unwrap()
            .iter()
            .map(|id| tree.get(id).unwrap().height())
            .collect_vec();

        prop_assert!(heights.iter().all(|h| *h >= 0.0));
        prop_assert_eq!(heights.iter().copied().fold(f64::INFINITY, f64::min), 0.0);
    }

    #[test]
    fn ladderise_is_idempotent(seed in any::<u64>(), n_leaves in 1_usize..60) {
        let mut tree = random_tree(seed, n_leaves, false);
        tree.ladderise().unwrap();
        let once = tree.to_newick().unwrap();
        tree.ladderise().unwrap();

        prop_assert_eq!(once, tree.to_newick().unwrap());
    }

    #[test]
    fn newick_round_trip(seed in any::<u64>(), n_leaves in 1_usize..60, brlens in any::<bool>()) {
        let tree = random_tree(seed, n_leaves, brlens);
        let newick = tree.to_newick().unwrap();
        let parsed = parse_newick(&newick).unwrap();

        prop_assert_eq!(parsed.to_newick().unwrap(), newick);
        prop_assert_eq!(parsed.size().unwrap(), tree.size().unwrap());
    }

    #[test]
    fn reroot_keeps_tree_measures(
        seed in any::<u64>(),
        n_leaves in 2_usize..40,
        pick in any::<prop::sample::Index>(),
        prop in 0.0_f64..=1.0,
    ) {
        let mut tree = random_tree(seed, n_leaves, true);
        let length = tree.length().unwrap();
        let labels = sorted_labels(&tree);
        let distances = tip_distances(&tree);

        let leaves = tree.get_leaves().unwrap();
        let leaf = leaves[pick.index(leaves.len())];
        tree.reroot(&leaf, Some(prop)).unwrap();

        prop_assert!((tree.length().unwrap() - length).abs() < EPSILON);
        prop_assert_eq!(sorted_labels(&tree), labels);

        let rerooted = tip_distances(&tree);
        prop_assert_eq!(rerooted.len(), distances.len());
        for (pair, dist) in distances {
            prop_assert!((rerooted[&pair] - dist).abs() < EPSILON, "{:?}", pair);
        }
    }
}
