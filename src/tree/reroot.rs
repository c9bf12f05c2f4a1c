use std::collections::{BTreeSet, HashSet};

use tracing::{debug, trace};

use super::node::Node;
use super::tree_impl::{HybridEdgeMap, Tree, TreeError};
use super::{EdgeLength, HybridId, NodeId};

/// State shared by the recursive edge reversal
struct ReversalWalk<'a> {
    /// Hybrid groups as they were before any change
    snapshot: &'a HybridEdgeMap,
    seen: HashSet<NodeId>,
    used_hybrid_ids: BTreeSet<HybridId>,
}

impl<'a> ReversalWalk<'a> {
    fn new(snapshot: &'a HybridEdgeMap, seen: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            snapshot,
            seen: seen.into_iter().collect(),
            used_hybrid_ids: snapshot.keys().copied().collect(),
        }
    }

    /// Lowest hybrid id, starting at 1, that was neither present
    /// in the tree nor handed out earlier in the walk
    fn mint_hybrid_id(&mut self) -> HybridId {
        let mut candidate = 1;
        while self.used_hybrid_ids.contains(&candidate) {
            candidate += 1;
        }
        self.used_hybrid_ids.insert(candidate);
        candidate
    }

    /// Destinations of the group `node` is the source of
    fn destinations_of(&self, node: &Node) -> Option<Vec<NodeId>> {
        let group = self.snapshot.get(&node.hybrid_id?)?;
        (group.source == Some(node.id)).then(|| group.destinations.clone())
    }
}

/// Methods to change the root of a [`Tree`].
///
/// ----
/// ----
impl Tree {
    // ####################
    // # REROOT THE TREE  #
    // ####################

    /// Reroots the tree or network on the branch above `edge_base`.
    ///
    /// A new root is created on the branch, `prop` gives the fraction of the
    /// branch length kept between the new root and `edge_base` (0.5 when
    /// `None`, `NaN` or outside of `[0, 1]`). Every edge between the new
    /// root and the old one is reversed. Reticulations met along the way
    /// are reversed as well, and an edge closing a cycle becomes a new
    /// hybrid leaf. If the old root ends up with a single child it is
    /// removed. Node ids are reassigned in preorder and ages are recomputed,
    /// hybrid leaves are then moved to the height of their source.
    ///
    /// On error the tree is left untouched.
    ///
    /// ```
    /// use phylonet::tree::Tree;
    ///
    /// let mut tree = Tree::from_newick("((A:1,B:1):1,C:2):0.0;").unwrap();
    /// let a = tree.get_by_label("A").unwrap().id;
    /// tree.reroot(&a, None).unwrap();
    ///
    /// assert_eq!(tree.to_newick().unwrap(), "(A:0.5,(B:1,C:3):0.5):0.0;");
    /// assert_eq!(tree.length().unwrap(), 5.0);
    /// ```
    pub fn reroot(&mut self, edge_base: &NodeId, prop: Option<f64>) -> Result<(), TreeError> {
        let mut rerooted = self.clone();
        rerooted.reroot_in_place(*edge_base, prop)?;
        *self = rerooted;

        Ok(())
    }

    fn reroot_in_place(&mut self, edge_base: NodeId, prop: Option<f64>) -> Result<(), TreeError> {
        let snapshot = self.get_hybrid_edges()?;
        let old_root = self.get_root()?;
        let old_parent = self.get(&edge_base)?.get_parent()?;
        if !self.contains(&edge_base)? {
            return Err(TreeError::NodeNotFound(edge_base));
        }
        let prop = prop.filter(|p| (0.0..=1.0).contains(p)).unwrap_or(0.5);

        self.remove_child(old_parent, edge_base)?;
        let new_root = self.add(Node::new());
        self.root = Some(new_root);
        self.attach_child(new_root, edge_base)?;

        let carried = match self.nodes[edge_base].branch_length {
            Some(length) => {
                let kept = length * prop;
                self.nodes[edge_base].branch_length = Some(kept);
                Some(length - kept)
            }
            None => None,
        };

        let mut walk = ReversalWalk::new(&snapshot, [new_root, edge_base]);
        self.reverse_edges(&mut walk, old_parent, new_root, carried)?;

        self.splice_out(old_root)?;
        self.reassign_ids()?;
        self.compute_node_ages()?;
        self.align_hybrid_leaves()?;

        let nodes = self.size()?;
        debug!(edge_base, prop, nodes, "rerooted tree");

        Ok(())
    }

    /// Hangs `node` under `attach_to` with the `carried` length, then keeps
    /// going toward the old root with the length `node` had before.
    fn reverse_edges(
        &mut self,
        walk: &mut ReversalWalk,
        node: NodeId,
        attach_to: NodeId,
        carried: Option<EdgeLength>,
    ) -> Result<(), TreeError> {
        if !walk.seen.insert(node) {
            return self.close_cycle(walk, node, attach_to, carried);
        }

        let old_parent = self.get(&node)?.parent;
        let old_length = self.nodes[node].branch_length;

        self.attach_child(attach_to, node)?;
        self.nodes[node].branch_length = carried;
        trace!(node, attach_to, ?carried, "reversed edge");

        if let Some(destinations) = walk.destinations_of(&self.nodes[node]) {
            for destination in destinations {
                let parent = self.get(&destination)?.get_parent()?;
                let length = self.nodes[destination].branch_length;
                self.remove_child(parent, destination)?;
                self.reverse_edges(walk, parent, node, length)?;
            }
            self.nodes[node].hybrid_id = None;
        }

        match old_parent {
            Some(parent) => self.reverse_edges(walk, parent, node, old_length),
            None => Ok(()),
        }
    }

    /// Replaces an edge to an already placed node by a hybrid leaf
    fn close_cycle(
        &mut self,
        walk: &mut ReversalWalk,
        node: NodeId,
        attach_to: NodeId,
        carried: Option<EdgeLength>,
    ) -> Result<(), TreeError> {
        let hybrid_id = match self.get(&node)?.hybrid_id {
            Some(hybrid_id) => hybrid_id,
            None => {
                let hybrid_id = walk.mint_hybrid_id();
                self.nodes[node].set_hybrid_id(hybrid_id);
                debug!(node, hybrid_id, "new hybrid id");
                hybrid_id
            }
        };

        let mut leaf = Node::new();
        leaf.set_hybrid_id(hybrid_id);
        leaf.branch_length = carried;
        self.add_child(leaf, attach_to)?;

        Ok(())
    }

    /// Removes a non hybrid node with a single child,
    /// the child inherits its position and branch length.
    fn splice_out(&mut self, id: NodeId) -> Result<(), TreeError> {
        let node = self.get(&id)?;
        if node.children.len() != 1 || node.is_hybrid() {
            return Ok(());
        }
        let child = node.children[0];
        let parent = node.get_parent()?;

        let length = match (node.branch_length, self.nodes[child].branch_length) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
        };

        self.nodes[parent].replace_child(&id, child)?;
        self.nodes[child].parent = Some(parent);
        self.nodes[child].branch_length = length;

        let node = &mut self.nodes[id];
        node.parent = None;
        node.children.clear();
        self.clear_caches();

        debug!(node = id, child, "spliced out old root");

        Ok(())
    }

    /// Sets hybrid leaves to the same height as their source
    fn align_hybrid_leaves(&mut self) -> Result<(), TreeError> {
        let groups = self.get_hybrid_edges()?;
        let mut changed = false;

        for group in groups.values() {
            let Some(source) = group.source else {
                continue;
            };
            let source_height = self.defined_height(&source)?;
            for destination in group.destinations.iter() {
                let height = self.defined_height(destination)?;
                let length = self.get(destination)?.get_branch_length()?;
                self.nodes[*destination].branch_length = Some(length + height - source_height);
                changed = true;
            }
        }

        if changed {
            self.clear_caches();
            self.compute_node_ages()?;
        }

        Ok(())
    }

    fn defined_height(&self, id: &NodeId) -> Result<f64, TreeError> {
        let height = self.get(id)?.height();
        if height.is_nan() {
            Err(TreeError::UndefinedHeight(*id))
        } else {
            Ok(height)
        }
    }
}
