use std::collections::VecDeque;

use rand::prelude::*;

use tree::{Node, Tree, TreeError};

pub mod newick;
pub mod nexus;
pub mod tree;

/// Genereates a random binary tree of a given size. Branch lengths are uniformly distributed
/// ```
/// use phylonet::generate_tree;
///
/// let tree = generate_tree(20, true).unwrap();
/// assert_eq!(tree.n_leaves().unwrap(), 20);
/// assert!(tree.is_time_tree());
/// ```
pub fn generate_tree(n_leaves: usize, brlens: bool) -> Result<Tree, TreeError> {
    generate_tree_with_rng(n_leaves, brlens, &mut thread_rng())
}

/// Genereates a random binary tree of a given size using a specific random number generator.
/// ```
/// use phylonet::generate_tree_with_rng;
/// use rand::{rngs::StdRng, SeedableRng};
///
/// let first = generate_tree_with_rng(10, true, &mut StdRng::seed_from_u64(42)).unwrap();
/// let second = generate_tree_with_rng(10, true, &mut StdRng::seed_from_u64(42)).unwrap();
/// assert_eq!(first.to_newick().unwrap(), second.to_newick().unwrap());
/// ```
pub fn generate_tree_with_rng<R: Rng>(
    n_leaves: usize,
    brlens: bool,
    rng: &mut R,
) -> Result<Tree, TreeError> {
    if n_leaves == 0 {
        return Err(TreeError::IsEmpty);
    }

    let mut tree = Tree::new();
    let root = tree.add(Node::new());

    let mut next_deq = VecDeque::new();
    next_deq.push_back(root);

    for _ in 0..(n_leaves - 1) {
        let parent_id = if rng.gen_bool(0.5) {
            next_deq.pop_front()
        } else {
            next_deq.pop_back()
        }
        .ok_or(TreeError::IsEmpty)?;

        for _ in 0..2 {
            let mut child = Node::new();
            if brlens {
                child.branch_length = Some(rng.gen());
            }
            next_deq.push_back(tree.add_child(child, parent_id)?);
        }
    }

    for (i, id) in next_deq.iter().enumerate() {
        tree.get_mut(id)?.set_label(format!("Tip_{i}"));
    }
    tree.compute_node_ages()?;

    Ok(tree)
}

/// Generates a caterpillar tree by adding children to the last node addesd to the tree
/// until we reach the desired numebr of leaves. Branch lengths are uniformly distributed
/// ```
/// use phylonet::generate_caterpillar;
///
/// let tree = generate_caterpillar(4, false).unwrap();
/// assert_eq!(tree.to_newick().unwrap(), "(Tip_1,(Tip_2,(Tip_3,Tip_4)));");
/// ```
pub fn generate_caterpillar(n_leaves: usize, brlens: bool) -> Result<Tree, TreeError> {
    if n_leaves == 0 {
        return Err(TreeError::IsEmpty);
    }

    let mut tree = Tree::new();
    let mut rng = thread_rng();
    let mut length = || -> Option<f64> { brlens.then(|| rng.gen()) };

    let mut parent = tree.add(Node::new());
    for i in 1..n_leaves {
        let parent_bkp = parent;
        let mut first = Node::new_labelled(&format!("Tip_{i}"));
        first.branch_length = length();
        if i == n_leaves - 1 {
            // Adding tips
            let mut second = Node::new_labelled(&format!("Tip_{}", i + 1));
            second.branch_length = length();
            tree.add_child(first, parent)?;
            tree.add_child(second, parent)?;
        } else {
            // Adding tip then the next parent node
            let mut next = Node::new();
            next.branch_length = length();
            tree.add_child(first, parent_bkp)?;
            parent = tree.add_child(next, parent_bkp)?;
        }
    }
    if n_leaves == 1 {
        tree.get_mut(&parent)?.set_label("Tip_1".to_string());
    }
    tree.compute_node_ages()?;

    Ok(tree)
}
