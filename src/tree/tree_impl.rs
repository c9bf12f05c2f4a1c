use accurate::sum::Sum2;
use accurate::traits::*;
use itertools::Itertools;
use ptree::{print_tree, TreeBuilder};
use std::iter::zip;
use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap, HashSet},
    fs,
    path::Path,
};

use thiserror::Error;
use tracing::debug;

use super::node::{Node, NodeError};
use super::{EdgeLength, HybridId, NodeId};

use crate::newick::{self, NewickParseError};

/// Errors that can occur when reading, writing and manipulating [`Tree`] structs.
#[derive(Error, Debug)]
pub enum TreeError {
    /// The tree is empty and we are trying to do something that require at least one node
    #[error("This tree is empty.")]
    IsEmpty,
    /// No root node was found in the tree and we are trying to do something
    /// that requires a root node
    #[error("No root node found")]
    RootNotFound,
    /// The root handed to the tree still has a parent
    #[error("Root node {0} has a parent")]
    RootHasParent(NodeId),
    /// Some branches of the tree have no length
    #[error("The tree must have all branch lengths.")]
    MissingBranchLengths,
    /// The requested node with index [`NodeId`] does not exist in the tree
    #[error("There is no node with index: {0}")]
    NodeNotFound(NodeId),
    /// A node can be reached through more than one path from the root
    #[error("Node {0} is reachable through more than one path")]
    NodeRevisited(NodeId),
    /// A child does not point back to the node listing it as a child
    #[error("Node {child} is a child of {parent} but its parent is {found:?}")]
    InconsistentParent {
        /// Id of the child node
        child: NodeId,
        /// Id of the node listing the child
        parent: NodeId,
        /// Parent recorded in the child
        found: Option<NodeId>,
    },
    /// Two internal nodes share the same hybrid id
    #[error("Hybrid group #{0} has more than one source node")]
    DuplicateHybridSource(HybridId),
    /// A hybrid source has no matching destination
    #[error("Hybrid group #{0} has no destination, hybrid nodes must come in groups of 2 or more")]
    IncompleteHybridGroup(HybridId),
    /// A node height is undefined where a defined height is required
    #[error("Height of node {0} is undefined")]
    UndefinedHeight(NodeId),
    /// There was a [`std::io::Error`] when writing the tree to a file
    #[error("Error writing tree to file")]
    IoError(#[from] std::io::Error),
    /// There was a [`NodeError`] when operating on a node
    #[error("Could not operate on Node")]
    NodeError(#[from] NodeError),
}

/// Nodes sharing a hybrid id: the internal source node and the leaf
/// destination nodes that represent additional incoming edges.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HybridGroup {
    /// Internal node the reticulation points to, `None` for leaf-only groups
    pub source: Option<NodeId>,
    /// Leaf nodes, in preorder
    pub destinations: Vec<NodeId>,
}

/// Hybrid groups indexed by their hybrid id
pub type HybridEdgeMap = BTreeMap<HybridId, HybridGroup>;

/// A Phylogenetic tree or network
#[derive(Debug, Clone)]
pub struct Tree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) root: Option<NodeId>,
    is_time_tree: bool,
    node_list: RefCell<Option<Vec<NodeId>>>,
    leaves: RefCell<Option<Vec<NodeId>>>,
    label_index: RefCell<Option<HashMap<String, NodeId>>>,
    hybrid_edges: RefCell<Option<HybridEdgeMap>>,
}

// Returns the cached value, initializing it first if needed
fn cached<T: Clone>(
    cell: &RefCell<Option<T>>,
    init: impl FnOnce() -> Result<T, TreeError>,
) -> Result<T, TreeError> {
    if let Some(value) = cell.borrow().as_ref() {
        return Ok(value.clone());
    }
    let value = init()?;
    *cell.borrow_mut() = Some(value.clone());
    Ok(value)
}

/// Base methods to add and get [`Node`] objects to and from the [`Tree`].
///
/// ----
/// ----
impl Tree {
    /// Create a new empty Tree object
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            is_time_tree: false,
            node_list: RefCell::new(None),
            leaves: RefCell::new(None),
            label_index: RefCell::new(None),
            hybrid_edges: RefCell::new(None),
        }
    }

    /// Build a tree from an arena of nodes, as done by format readers.
    ///
    /// Node ids are set to their position in `nodes`. Parent/children links
    /// are checked for consistency and node ages are computed.
    /// ```
    /// use phylonet::tree::{Node, Tree};
    ///
    /// let mut root = Node::new();
    /// root.children = vec![1, 2];
    /// let mut a = Node::with_length(Some("A"), 1.0);
    /// a.parent = Some(0);
    /// let mut b = Node::with_length(Some("B"), 2.0);
    /// b.parent = Some(0);
    ///
    /// let tree = Tree::from_nodes(vec![root, a, b], 0).unwrap();
    /// assert_eq!(tree.to_newick().unwrap(), "(A:1,B:2):0.0;");
    /// assert!(tree.is_time_tree());
    /// ```
    pub fn from_nodes(nodes: Vec<Node>, root: NodeId) -> Result<Self, TreeError> {
        let mut tree = Self::new();
        tree.nodes = nodes;
        for (idx, node) in tree.nodes.iter_mut().enumerate() {
            node.set_id(idx);
        }

        let root_node = tree.get(&root)?;
        if root_node.parent.is_some() {
            return Err(TreeError::RootHasParent(root));
        }
        tree.root = Some(root);

        // Traversal fails on dangling ids and on nodes reached twice
        for id in tree.preorder(&root)? {
            for child in tree.nodes[id].children.iter() {
                let found = tree.get(child)?.parent;
                if found != Some(id) {
                    return Err(TreeError::InconsistentParent {
                        child: *child,
                        parent: id,
                        found,
                    });
                }
            }
        }

        tree.compute_node_ages()?;

        Ok(tree)
    }

    // ############################
    // # ADDING AND GETTING NODES #
    // ############################

    /// Add a new node to the tree, the first node added becomes the root.
    pub fn add(&mut self, node: Node) -> NodeId {
        let idx = self.nodes.len();
        let mut node = node;
        node.id = idx;
        self.nodes.push(node);

        if self.root.is_none() {
            self.root = Some(idx);
        }
        self.clear_caches();

        idx
    }

    /// Add a new child to one of the tree's nodes.
    ///
    /// # Example
    /// ```
    /// use phylonet::tree::{Tree, Node};
    ///
    /// // Create the tree and add a root node
    /// let mut tree = Tree::new();
    /// let root_id = tree.add(Node::new());
    ///
    /// // Add children to the root
    /// let left = tree.add_child(Node::new_labelled("A"), root_id).unwrap();
    /// let right = tree.add_child(Node::with_length(Some("B"), 0.1), root_id).unwrap();
    ///
    /// assert_eq!(tree.get(&root_id).unwrap().children, vec![left, right]);
    /// assert_eq!(tree.get(&right).unwrap().parent, Some(root_id));
    /// assert_eq!(tree.get(&right).unwrap().branch_length, Some(0.1));
    /// ```
    pub fn add_child(&mut self, node: Node, parent: NodeId) -> Result<NodeId, TreeError> {
        self.get(&parent)?;

        let mut node = node;
        node.parent = Some(parent);

        let id = self.add(node);
        self.nodes[parent].add_child(id);

        Ok(id)
    }

    /// Attach an existing node as the last child of `parent`.
    /// If the node already has a parent it is detached from it first.
    pub fn attach_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.get(&parent)?;
        if let Some(old_parent) = self.get(&child)?.parent {
            self.remove_child(old_parent, child)?;
        }

        self.nodes[child].parent = Some(parent);
        self.nodes[parent].add_child(child);
        self.clear_caches();

        Ok(())
    }

    /// Remove a child from a node, the child keeps its own subtree but is
    /// no longer reachable from the root.
    /// ```
    /// use phylonet::tree::Tree;
    ///
    /// let mut tree = Tree::from_newick("((A,B)C,D)E;").unwrap();
    /// let c = tree.search_nodes(|n| n.label.as_deref() == Some("C")).unwrap()[0];
    /// let root = tree.get_root().unwrap();
    ///
    /// tree.remove_child(root, c).unwrap();
    ///
    /// assert_eq!(tree.get(&c).unwrap().parent, None);
    /// assert_eq!(tree.to_newick().unwrap(), "(D)E;");
    /// ```
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.get(&child)?;
        self.get_mut(&parent)?.remove_child(&child)?;
        self.nodes[child].parent = None;
        self.clear_caches();

        Ok(())
    }

    /// Get a reference to a specific Node of the tree
    pub fn get(&self, id: &NodeId) -> Result<&Node, TreeError> {
        self.nodes.get(*id).ok_or(TreeError::NodeNotFound(*id))
    }

    /// Get a mutable reference to a specific Node of the tree.
    /// Derived views are invalidated since the node may be modified.
    pub fn get_mut(&mut self, id: &NodeId) -> Result<&mut Node, TreeError> {
        self.clear_caches();
        self.nodes.get_mut(*id).ok_or(TreeError::NodeNotFound(*id))
    }

    /// Get a reference to a leaf by label. Leaves without a label are
    /// indexed by their id.
    /// ```
    /// use phylonet::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A,B)C,);").unwrap();
    ///
    /// assert_eq!(tree.get_by_label("A").unwrap().id, 2);
    /// assert_eq!(tree.get_by_label("4").unwrap().label, None);
    /// // Internal nodes are not indexed
    /// assert!(tree.get_by_label("C").is_none());
    /// ```
    pub fn get_by_label(&self, label: &str) -> Option<&Node> {
        let index = self.get_label_map().ok()?;
        index.get(label).and_then(|id| self.nodes.get(*id))
    }

    /// Search nodes reachable from the root with a closure.
    /// ```
    /// use phylonet::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A,B)C,(A,D)E)F;").unwrap();
    /// let found = tree.search_nodes(|node| node.label == Some("A".into())).unwrap();
    ///
    /// assert_eq!(found, vec![2, 5]);
    /// ```
    pub fn search_nodes(&self, cond: impl Fn(&Node) -> bool) -> Result<Vec<NodeId>, TreeError> {
        Ok(self
            .get_node_list()?
            .into_iter()
            .filter(|id| cond(&self.nodes[*id]))
            .collect())
    }

    /// Gets the root node.
    pub fn get_root(&self) -> Result<NodeId, TreeError> {
        self.root.ok_or(TreeError::RootNotFound)
    }

    /// Returns the number of nodes reachable from the root
    pub fn size(&self) -> Result<usize, TreeError> {
        Ok(self.get_node_list()?.len())
    }

    /// Returns the number of leaves in the tree
    pub fn n_leaves(&self) -> Result<usize, TreeError> {
        Ok(self.get_leaves()?.len())
    }

    /// Checks if the branch lengths of the tree support age semantics,
    /// see [`Tree::compute_node_ages`]
    pub fn is_time_tree(&self) -> bool {
        self.is_time_tree
    }
}

/// Methods to traverse the [`Tree`] and access cached derived views.
///
/// ----
/// ----
impl Tree {
    // ###################
    // # TREE TRAVERSALS #
    // ###################

    /// Visits every node of the subtree rooted at `root` in preorder
    /// (parent before children, children left to right) and collects the
    /// `Some` outputs of `f` in visit order.
    /// ```
    /// use phylonet::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A,(C,E)D)B,((H)I)G)F;").unwrap();
    /// let internal: Vec<_> = tree
    ///     .preorder_filter_map(&tree.get_root().unwrap(), |node| {
    ///         if node.is_leaf() { None } else { node.label.clone() }
    ///     })
    ///     .unwrap();
    ///
    /// assert_eq!(internal, vec!["F", "B", "D", "G", "I"])
    /// ```
    pub fn preorder_filter_map<T>(
        &self,
        root: &NodeId,
        mut f: impl FnMut(&Node) -> Option<T>,
    ) -> Result<Vec<T>, TreeError> {
        let mut output = vec![];
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![*root];

        while let Some(id) = stack.pop() {
            let node = self.get(&id)?;
            if visited[id] {
                return Err(TreeError::NodeRevisited(id));
            }
            visited[id] = true;

            if let Some(value) = f(node) {
                output.push(value);
            }
            stack.extend(node.children.iter().rev());
        }

        Ok(output)
    }

    /// Returns a vector containing node ids in the same order as the
    /// [preorder](https://en.wikipedia.org/wiki/Tree_traversal#Pre-order,_NLR) tree traversal
    /// ```
    /// use phylonet::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A,(C,E)D)B,((H)I)G)F;").unwrap();
    /// let preorder: Vec<_> = tree.preorder(&tree.get_root().unwrap())
    ///     .unwrap()
    ///     .iter()
    ///     .map(|id| tree.get(id).unwrap().label.clone())
    ///     .flatten()
    ///     .collect();
    ///
    /// assert_eq!(preorder, vec!["F", "B", "A", "D", "C", "E", "G", "I", "H"])
    /// ```
    pub fn preorder(&self, root: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        self.preorder_filter_map(root, |node| Some(node.id))
    }

    /// Returns a vector containing node ids in the same order as the
    /// [postorder](https://en.wikipedia.org/wiki/Tree_traversal#Post-order,_LRN ) tree traversal
    pub fn postorder(&self, root: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        let mut indices = vec![];
        for child in self.get(root)?.children.iter() {
            indices.extend(self.postorder(child)?)
        }
        indices.push(*root);

        Ok(indices)
    }

    // ################
    // # DERIVED VIEWS #
    // ################

    /// Ids of all nodes reachable from the root, in preorder
    pub fn get_node_list(&self) -> Result<Vec<NodeId>, TreeError> {
        cached(&self.node_list, || self.preorder(&self.get_root()?))
    }

    /// Returns a [`Vec`] containing the ids of the leaves of the tree, in preorder
    /// ```
    /// use phylonet::tree::{Tree, Node};
    ///
    /// let mut tree = Tree::new();
    /// let root_idx = tree.add(Node::new());
    /// let left = tree.add_child(Node::new(), root_idx).unwrap();
    /// let right = tree.add_child(Node::new(), root_idx).unwrap();
    ///
    /// assert_eq!(tree.get_leaves().unwrap(), vec![left, right]);
    /// ```
    pub fn get_leaves(&self) -> Result<Vec<NodeId>, TreeError> {
        cached(&self.leaves, || {
            let root = self.get_root()?;
            self.preorder_filter_map(&root, |node| node.is_leaf().then_some(node.id))
        })
    }

    /// Returns the labels of the leaves of the tree, in preorder
    pub fn get_leaf_labels(&self) -> Result<Vec<Option<String>>, TreeError> {
        Ok(self
            .get_leaves()?
            .iter()
            .map(|id| self.nodes[*id].label.clone())
            .collect())
    }

    /// Map from leaf label (or stringified id for unlabelled leaves) to leaf id
    pub fn get_label_map(&self) -> Result<HashMap<String, NodeId>, TreeError> {
        cached(&self.label_index, || {
            Ok(self
                .get_leaves()?
                .into_iter()
                .map(|id| {
                    let node = &self.nodes[id];
                    let key = node.label.clone().unwrap_or_else(|| id.to_string());
                    (key, id)
                })
                .collect())
        })
    }

    /// Groups hybrid nodes by hybrid id.
    ///
    /// Internal hybrid nodes are the source of their group and hybrid
    /// leaves are its destinations. Groups made only of leaves are kept
    /// as they are, with no source.
    /// ```
    /// use phylonet::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A,(B)#1)C,(#1,D)E,(#2,#2))F;").unwrap();
    /// let groups = tree.get_hybrid_edges().unwrap();
    ///
    /// assert_eq!(groups[&1].source, Some(3));
    /// assert_eq!(groups[&1].destinations, vec![6]);
    /// assert_eq!(groups[&2].source, None);
    /// assert_eq!(groups[&2].destinations, vec![9, 10]);
    /// ```
    pub fn get_hybrid_edges(&self) -> Result<HybridEdgeMap, TreeError> {
        cached(&self.hybrid_edges, || {
            let root = self.get_root()?;
            let hybrids = self.preorder_filter_map(&root, |node| {
                node.hybrid_id.map(|h| (node.id, h, node.is_leaf()))
            })?;

            let mut groups = HybridEdgeMap::new();
            for (id, hybrid_id, is_leaf) in hybrids {
                let group = groups.entry(hybrid_id).or_default();
                if is_leaf {
                    group.destinations.push(id);
                } else if group.source.is_some() {
                    return Err(TreeError::DuplicateHybridSource(hybrid_id));
                } else {
                    group.source = Some(id);
                }
            }

            for (hybrid_id, group) in groups.iter() {
                if group.source.is_some() && group.destinations.is_empty() {
                    return Err(TreeError::IncompleteHybridGroup(*hybrid_id));
                }
            }

            Ok(groups)
        })
    }

    /// Discards every derived view, they are recomputed on next access
    pub fn clear_caches(&mut self) {
        self.node_list.replace(None);
        self.leaves.replace(None);
        self.label_index.replace(None);
        self.hybrid_edges.replace(None);
    }
}

/// Methods that compute characteristics and measures to describe the [`Tree`]
///
/// ----
/// ----
impl Tree {
    // #######################################
    // # GETTING CHARACTERISTICS OF THE TREE #
    // #######################################

    /// Computes the height (time before present) and root to tip distance of
    /// every node.
    ///
    /// The root is at height 0 and every other node sits its branch length
    /// below its parent, missing branch lengths give `NaN` heights. Heights
    /// are then shifted so the lowest node is at height 0.
    /// ```
    /// use phylonet::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A:1,B:2):1,C:1);").unwrap();
    /// let heights: Vec<_> = tree.get_node_list()
    ///     .unwrap()
    ///     .iter()
    ///     .map(|id| tree.get(id).unwrap().height())
    ///     .collect();
    ///
    /// assert_eq!(heights, vec![3.0, 2.0, 1.0, 0.0, 2.0]);
    /// assert!(tree.is_time_tree());
    /// ```
    pub fn compute_node_ages(&mut self) -> Result<(), TreeError> {
        let root = self.get_root()?;
        let order = self.preorder(&root)?;

        for id in order.iter() {
            let (height, rtt_dist) = match self.nodes[*id].parent {
                Some(parent) if *id != root => {
                    let parent = &self.nodes[parent];
                    let length = self.nodes[*id].branch_length;
                    (
                        length.map_or(f64::NAN, |l| parent.height - l),
                        parent.rtt_dist + length.unwrap_or(0.0),
                    )
                }
                _ => (0.0, 0.0),
            };
            let node = &mut self.nodes[*id];
            node.height = height;
            node.rtt_dist = rtt_dist;
        }

        let has_undefined = order.iter().any(|id| self.nodes[*id].height.is_nan());
        // Undefined heights stay NaN and are left out of the shift
        let min_height = order
            .iter()
            .map(|id| self.nodes[*id].height)
            .filter(|h| !h.is_nan())
            .fold(f64::INFINITY, f64::min);

        self.is_time_tree =
            !has_undefined && (order.len() > 1 || self.nodes[root].branch_length.is_some());

        if min_height.is_finite() {
            for id in order.iter() {
                self.nodes[*id].height -= min_height;
            }
        }

        Ok(())
    }

    /// Returns the length of the tree
    /// (i.e. the sum of branch lengths, the root's own length excluded)
    /// ```
    /// use phylonet::tree::Tree;
    ///
    /// let tree = Tree::from_newick("(A:0.1,B:0.2,(C:0.3,D:0.4)E:0.5)F:7;").unwrap();
    /// assert!((tree.length().unwrap() - 1.5).abs() < 1e-12);
    /// ```
    pub fn length(&self) -> Result<EdgeLength, TreeError> {
        let root = self.get_root()?;
        let mut total = Sum2::zero();
        for id in self.get_node_list()? {
            if id == root {
                continue;
            }
            match self.nodes[id].branch_length {
                Some(length) => total += length,
                None => return Err(TreeError::MissingBranchLengths),
            }
        }

        Ok(total.sum())
    }

    /// Checks that the node is reachable from the root
    pub(crate) fn contains(&self, id: &NodeId) -> Result<bool, TreeError> {
        let mut current = *id;
        loop {
            match self.get(&current)?.parent {
                Some(parent) => current = parent,
                None => return Ok(Some(current) == self.root),
            }
        }
    }
}

/// Methods to find paths and common ancestors in a [`Tree`].
///
/// ----
/// ----
impl Tree {
    // ##########################
    // # FIND PATHS IN THE TREE #
    // ##########################

    /// Returns the path from the root to the node
    /// ```
    /// use phylonet::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A,(C,E)D)B,((H)I)G)F;").unwrap();
    /// let path: Vec<_> = tree.get_path_from_root(&5)
    ///     .unwrap()
    ///     .iter()
    ///     .map(|id| tree.get(id).unwrap().label.clone())
    ///     .flatten()
    ///     .collect();
    ///
    /// assert_eq!(path, vec!["F", "B", "D", "E"])
    /// ```
    pub fn get_path_from_root(&self, node: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        let mut path = vec![];
        let mut current_node = *node;
        loop {
            path.push(current_node);
            match self.get(&current_node)?.parent {
                Some(parent) => current_node = parent,
                None => break,
            }
        }

        Ok(path.into_iter().rev().collect())
    }

    /// Gets the most recent common ancestor of a set of nodes.
    ///
    /// With no nodes there is no ancestor, with a single node its parent
    /// is returned (or the node itself if it is the root). Otherwise every
    /// node climbs toward the root one level per round and the first
    /// ancestor reached by all of them is returned.
    /// ```
    /// use phylonet::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A,(C,E)D)B,((H)I)G)F;").unwrap();
    /// let a = tree.get_by_label("A").unwrap().id;
    /// let c = tree.get_by_label("C").unwrap().id;
    /// let h = tree.get_by_label("H").unwrap().id;
    ///
    /// let b = tree.get_mrca(&[a, c]).unwrap().unwrap();
    /// assert_eq!(tree.get(&b).unwrap().label, Some("B".to_owned()));
    /// assert_eq!(tree.get_mrca(&[a, c, h]).unwrap(), Some(0));
    /// assert_eq!(tree.get_mrca(&[]).unwrap(), None);
    /// ```
    pub fn get_mrca(&self, nodes: &[NodeId]) -> Result<Option<NodeId>, TreeError> {
        let targets = nodes.iter().copied().unique().collect_vec();
        for id in targets.iter() {
            self.get(id)?;
        }

        match targets.len() {
            0 => Ok(None),
            1 => Ok(Some(self.nodes[targets[0]].parent.unwrap_or(targets[0]))),
            n => {
                let mut visits: HashMap<NodeId, usize> = HashMap::new();
                let mut frontier = targets;

                while !frontier.is_empty() {
                    let mut next = Vec::with_capacity(frontier.len());
                    for id in frontier {
                        let count = visits.entry(id).or_insert(0);
                        *count += 1;
                        if *count == n {
                            return Ok(Some(id));
                        }
                        if let Some(parent) = self.nodes[id].parent {
                            next.push(parent);
                        }
                    }
                    frontier = next;
                }

                Ok(None)
            }
        }
    }

    /// Gets the distance between 2 nodes, returns the sum of branch lengths (if all
    /// branches in the path have lengths) and the number of edges in the path.
    /// ```
    /// use phylonet::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A,(C,E)D)B,((H)I)G)F;").unwrap();
    /// let (sum_edge_lengths, num_edges) = tree.get_distance(
    ///     &tree.get_by_label("A").unwrap().id,
    ///     &tree.get_by_label("H").unwrap().id,
    /// ).unwrap();
    ///
    /// assert_eq!(num_edges, 5);
    /// assert!(sum_edge_lengths.is_none());
    /// ```
    pub fn get_distance(
        &self,
        source: &NodeId,
        target: &NodeId,
    ) -> Result<(Option<f64>, usize), TreeError> {
        let mut dist = 0.0;
        let mut branches = 0;
        let mut all_dists = true;

        if source == target {
            return Ok((Some(0.0), 0));
        }

        let root_to_source = self.get_path_from_root(source)?;
        let root_to_target = self.get_path_from_root(target)?;

        let cursor = zip(root_to_source.iter(), root_to_target.iter())
            .enumerate()
            .filter(|(_, (s, t))| s != t)
            .map(|(idx, _)| idx)
            .next()
            .unwrap_or_else(|| {
                // One node is a child of the other
                root_to_source.len().min(root_to_target.len())
            });

        for list in [root_to_source, root_to_target] {
            for node in list.iter().skip(cursor) {
                if let Some(d) = self.get(node)?.branch_length {
                    dist += d;
                } else {
                    all_dists = false;
                }
                branches += 1;
            }
        }

        if all_dists {
            Ok((Some(dist), branches))
        } else {
            Ok((None, branches))
        }
    }
}

/// Methods to manipulate and alter the [`Tree`] object.
///
/// ----
/// ----
impl Tree {
    // ##################
    // # ALTER THE TREE #
    // ##################

    /// Sort children of every node by ascending number of leaves in their
    /// subtree. The sort is stable.
    ///
    /// ```
    ///use phylonet::tree::Tree;
    ///
    ///let mut tree = Tree::from_newick("(A,(((D,(E,F)),C),B));").unwrap();
    ///tree.ladderise().unwrap();
    ///
    ///assert_eq!("(A,(B,(C,(D,(E,F)))));", tree.to_newick().unwrap());
    ///
    /// ```
    pub fn ladderise(&mut self) -> Result<(), TreeError> {
        let root = self.get_root()?;
        let order = self.preorder(&root)?;

        let mut tip_counts = vec![0_usize; self.nodes.len()];
        // Go from tips to root
        for id in order.iter().rev() {
            let node = &self.nodes[*id];
            tip_counts[*id] = if node.is_leaf() {
                1
            } else {
                node.children.iter().map(|c| tip_counts[*c]).sum()
            };
        }

        for id in order.iter() {
            self.nodes[*id]
                .children
                .sort_by_key(|child| tip_counts[*child]);
        }
        self.clear_caches();

        Ok(())
    }

    // Copies the subtree rooted at `root` into a fresh arena, in preorder
    fn copy_subtree(&self, root: &NodeId) -> Result<Vec<Node>, TreeError> {
        let order = self.preorder(root)?;
        let mut new_ids = vec![None; self.nodes.len()];
        for (new_id, old_id) in order.iter().enumerate() {
            new_ids[*old_id] = Some(new_id);
        }

        Ok(order
            .iter()
            .enumerate()
            .map(|(new_id, old_id)| {
                let mut node = self.nodes[*old_id].clone();
                node.id = new_id;
                node.parent = if new_id == 0 {
                    None
                } else {
                    node.parent.and_then(|p| new_ids[p])
                };
                node.children = node.children.iter().filter_map(|c| new_ids[*c]).collect();
                node
            })
            .collect())
    }

    /// Returns the clade rooted at `root` as a new [`Tree`].
    ///
    /// Node ids of the new tree follow its preorder. Hybrid sources whose
    /// destinations are all outside the clade are no longer hybrids.
    /// ```
    /// use phylonet::tree::Tree;
    ///
    /// let tree = Tree::from_newick("(A:1,(B:1,C:2)D:1):0.0;").unwrap();
    /// let d = tree.search_nodes(|n| n.label.as_deref() == Some("D")).unwrap()[0];
    /// let clade = tree.get_subtree(&d).unwrap();
    ///
    /// assert_eq!(clade.to_newick().unwrap(), "(B:1,C:2)D:1;");
    /// assert_eq!(clade.size().unwrap(), 3);
    /// ```
    pub fn get_subtree(&self, root: &NodeId) -> Result<Self, TreeError> {
        let mut nodes = self.copy_subtree(root)?;

        let destination_ids: HashSet<HybridId> = nodes
            .iter()
            .filter(|n| n.is_leaf())
            .filter_map(|n| n.hybrid_id)
            .collect();
        for node in nodes.iter_mut().filter(|n| !n.is_leaf()) {
            if node
                .hybrid_id
                .is_some_and(|h| !destination_ids.contains(&h))
            {
                node.hybrid_id = None;
            }
        }

        Self::from_nodes(nodes, 0)
    }

    /// Renumbers nodes following the preorder traversal from the root.
    /// Nodes that are no longer reachable from the root are dropped, so
    /// previously obtained [`NodeId`] values must not be reused.
    pub fn reassign_ids(&mut self) -> Result<(), TreeError> {
        let root = self.get_root()?;
        self.nodes = self.copy_subtree(&root)?;
        self.root = Some(0);
        self.clear_caches();

        Ok(())
    }
}

/// Methods to read and write [`Tree`] objects to and from files or [`String`] objects.
///
/// ----
/// ----
impl Tree {
    // ########################
    // # READ AND WRITE TREES #
    // ########################

    /// Writes the tree as an extended newick formatted string
    /// # Example
    /// ```
    /// use phylonet::tree::Tree;
    ///
    /// let newick = "((A:1,(B:0.5)#1:0.5):1,(C:1,#1:0.5):1):0.0;";
    /// let tree = Tree::from_newick(newick).unwrap();
    ///
    /// assert_eq!(tree.to_newick().unwrap(), newick);
    /// ```
    pub fn to_newick(&self) -> Result<String, TreeError> {
        newick::write_newick(self)
    }

    /// Read an extended newick formatted string and build a [`Tree`] struct from it.
    /// # Example
    /// ```
    /// use phylonet::tree::Tree;
    ///
    /// let newick = "(A:0.1,B:0.2,(C:0.3,D:0.4)E:0.5)F;";
    /// let tree = Tree::from_newick(newick).unwrap();
    ///
    /// assert_eq!(tree.size().unwrap(), 6);
    /// assert_eq!(tree.n_leaves().unwrap(), 4);
    /// ```
    pub fn from_newick(newick: &str) -> Result<Self, NewickParseError> {
        newick::parse_newick(newick)
    }

    /// Writes the tree to a newick file
    pub fn to_file(&self, path: &Path) -> Result<(), TreeError> {
        fs::write(path, self.to_newick()?)?;
        Ok(())
    }

    /// Creates a tree from a newick file
    pub fn from_file(path: &Path) -> Result<Self, NewickParseError> {
        let newick_string = fs::read_to_string(path)?;
        Self::from_newick(&newick_string)
    }

    /// Recursive function that adds node representation to a printable tree builder
    fn print_nodes(
        &self,
        root_idx: &NodeId,
        output_tree: &mut TreeBuilder,
        debug: bool,
    ) -> Result<(), TreeError> {
        let root = self.get(root_idx)?;
        let label = if debug {
            format!("{root:?}")
        } else {
            format!("{root}")
        };

        if root.children.is_empty() {
            output_tree.add_empty_child(label);
        } else {
            output_tree.begin_child(label);
            for child_idx in root.children.iter() {
                self.print_nodes(child_idx, output_tree, debug)?;
            }
            output_tree.end_child();
        }

        Ok(())
    }

    fn print_impl(&self, debug: bool) -> Result<(), TreeError> {
        let root = self.get_root()?;
        let root_node = self.get(&root)?;
        let mut builder = if debug {
            TreeBuilder::new(format!("{root_node:?}"))
        } else {
            TreeBuilder::new(format!("{root_node}"))
        };
        for child_idx in root_node.children.iter() {
            self.print_nodes(child_idx, &mut builder, debug)?;
        }
        let tree = builder.build();
        print_tree(&tree)?;
        let nodes = self.size()?;
        debug!(nodes, "printed tree");
        Ok(())
    }

    /// Print a debug view of the tree to the console
    pub fn print_debug(&self) -> Result<(), TreeError> {
        self.print_impl(true)
    }

    /// Print the tree to the console
    pub fn print(&self) -> Result<(), TreeError> {
        self.print_impl(false)
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    /// Generates example tree from the tree traversal wikipedia page
    /// https://en.wikipedia.org/wiki/Tree_traversal#Depth-first_search
    /// The difference is that I is the left child of G since this tree structure
    /// cannot represent a right child only.
    fn build_simple_tree() -> Result<Tree, TreeError> {
        let mut tree = Tree::new();
        tree.add(Node::new_labelled("F")); // 0
        tree.add_child(Node::new_labelled("B"), 0)?; // 1
        tree.add_child(Node::new_labelled("G"), 0)?; // 2
        tree.add_child(Node::new_labelled("A"), 1)?; // 3
        tree.add_child(Node::new_labelled("D"), 1)?; // 4
        tree.add_child(Node::new_labelled("I"), 2)?; // 5
        tree.add_child(Node::new_labelled("C"), 4)?; // 6
        tree.add_child(Node::new_labelled("E"), 4)?; // 7
        tree.add_child(Node::new_labelled("H"), 5)?; // 8

        Ok(tree)
    }

    /// Generates example tree from the newick format wikipedia page
    /// https://en.wikipedia.org/wiki/Newick_format#Examples
    fn build_tree_with_lengths() -> Result<Tree, TreeError> {
        let mut tree = Tree::new();
        tree.add(Node::new_labelled("F")); // 0
        tree.add_child(Node::with_length(Some("A"), 0.1), 0)?; // 1
        tree.add_child(Node::with_length(Some("B"), 0.2), 0)?; // 2
        tree.add_child(Node::with_length(Some("E"), 0.5), 0)?; // 3
        tree.add_child(Node::with_length(Some("C"), 0.3), 3)?; // 4
        tree.add_child(Node::with_length(Some("D"), 0.4), 3)?; // 5
        tree.compute_node_ages()?;

        Ok(tree)
    }

    fn get_values(indices: &[usize], tree: &Tree) -> Vec<Option<String>> {
        indices
            .iter()
            .map(|idx| tree.get(idx).unwrap().label.clone())
            .collect()
    }

    #[test]
    fn test_leaves() {
        let mut tree = Tree::new();
        tree.add(Node::new_labelled("root"));
        assert_eq!(tree.get_leaves().unwrap(), vec![0]);

        tree.add_child(Node::with_length(Some("A"), 0.1), 0).unwrap(); // 1
        tree.add_child(Node::with_length(Some("B"), 0.2), 0).unwrap(); // 2
        tree.add_child(Node::with_length(Some("E"), 0.5), 0).unwrap(); // 3

        assert_eq!(tree.get_leaves().unwrap(), vec![1, 2, 3]);

        tree.add_child(Node::with_length(Some("C"), 0.3), 3).unwrap(); // 4
        tree.add_child(Node::with_length(Some("D"), 0.4), 3).unwrap(); // 5

        assert_eq!(tree.get_leaves().unwrap(), vec![1, 2, 4, 5]);
    }

    #[test]
    fn traversals() {
        let tree = build_simple_tree().unwrap();
        let root = tree.get_root().unwrap();

        let pre: Vec<_> = get_values(&tree.preorder(&root).unwrap(), &tree)
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(pre, vec!["F", "B", "A", "D", "C", "E", "G", "I", "H"]);

        let post: Vec<_> = get_values(&tree.postorder(&root).unwrap(), &tree)
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(post, vec!["A", "C", "E", "D", "B", "H", "I", "G", "F"]);
    }

    #[test]
    fn caches_follow_structural_changes() {
        let mut tree = build_simple_tree().unwrap();
        assert_eq!(tree.n_leaves().unwrap(), 4);
        assert!(tree.get_by_label("H").is_some());

        // Detach the G subtree
        tree.remove_child(0, 2).unwrap();
        assert_eq!(tree.n_leaves().unwrap(), 3);
        assert_eq!(tree.size().unwrap(), 6);
        assert!(tree.get_by_label("H").is_none());

        // Reattach it under A
        tree.attach_child(3, 2).unwrap();
        assert_eq!(tree.get_leaves().unwrap(), vec![8, 6, 7]);
        assert_eq!(tree.get(&2).unwrap().parent, Some(3));
    }

    #[test]
    fn attach_moves_node() {
        let mut tree = build_simple_tree().unwrap();
        // Move C from D to G
        tree.attach_child(2, 6).unwrap();
        assert_eq!(tree.get(&4).unwrap().children, vec![7]);
        assert_eq!(tree.get(&2).unwrap().children, vec![5, 6]);
        assert_eq!(tree.get(&6).unwrap().parent, Some(2));
    }

    #[test]
    fn label_map_uses_ids_for_unlabelled_leaves() {
        let tree = Tree::from_newick("((A,),(,B));").unwrap();
        let map = tree.get_label_map().unwrap();

        let mut keys: Vec<_> = map.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["3", "5", "A", "B"]);
        assert_eq!(map["5"], 5);
    }

    #[test]
    fn ages_of_time_tree() {
        let tree = build_tree_with_lengths().unwrap();
        let heights: Vec<_> = (0..6).map(|i| tree.get(&i).unwrap().height()).collect();
        let expected = [0.9, 0.8, 0.7, 0.4, 0.1, 0.0];
        for (h, e) in zip(heights, expected) {
            assert!((h - e).abs() < 1e-12, "{h} != {e}");
        }
        assert!(tree.is_time_tree());

        let rtt: Vec<_> = (0..6).map(|i| tree.get(&i).unwrap().rtt_dist()).collect();
        let expected = [0.0, 0.1, 0.2, 0.5, 0.8, 0.9];
        for (d, e) in zip(rtt, expected) {
            assert!((d - e).abs() < 1e-12, "{d} != {e}");
        }
    }

    #[test]
    fn ages_with_missing_lengths() {
        let tree = Tree::from_newick("((A:1,B:2),C:1);").unwrap();
        assert!(!tree.is_time_tree());

        let root = tree.get(&0).unwrap();
        let c = tree.get_by_label("C").unwrap();
        let a = tree.get_by_label("A").unwrap();
        // Root and C are the only nodes with a defined path, heights are
        // shifted by the lowest defined one so they stay finite
        assert_eq!(root.height(), 1.0);
        assert_eq!(c.height(), 0.0);
        assert!(a.height().is_nan());
        // Undefined lengths count as 0 for root to tip distances
        assert_eq!(a.rtt_dist(), 1.0);
    }

    #[test]
    fn single_node_time_tree() {
        assert!(!Tree::from_newick("A;").unwrap().is_time_tree());
        assert!(Tree::from_newick("A:0.5;").unwrap().is_time_tree());
    }

    #[test]
    fn mrca() {
        let tree = build_simple_tree().unwrap();
        let test_cases = vec![
            (vec![3, 7], Some(1)),    // (A,E) -> B
            (vec![6, 8], Some(0)),    // (C,H) -> F
            (vec![3, 3], Some(1)),    // (A,A) -> parent of A
            (vec![8, 5], Some(5)),    // (H,I) -> I
            (vec![4, 7], Some(4)),    // (D,E) -> D
            (vec![6, 7, 3], Some(1)), // (C,E,A) -> B
            (vec![0], Some(0)),       // root -> root
            (vec![], None),
        ];
        for (nodes, ancestor) in test_cases {
            assert_eq!(tree.get_mrca(&nodes).unwrap(), ancestor, "{nodes:?}");
        }
    }

    #[test]
    fn mrca_of_leaves_is_root() {
        let tree = Tree::from_newick("((A,B),(C,(D,E)));").unwrap();
        let leaves = tree.get_leaves().unwrap();
        assert_eq!(tree.get_mrca(&leaves).unwrap(), Some(0));

        let single = tree.get_by_label("D").unwrap();
        assert_eq!(tree.get_mrca(&[single.id]).unwrap(), single.parent);
    }

    #[test]
    fn mrca_of_disconnected_nodes() {
        let mut tree = build_simple_tree().unwrap();
        let orphan = tree.add(Node::new_labelled("orphan"));
        assert_eq!(tree.get_mrca(&[3, orphan]).unwrap(), None);
        assert!(matches!(
            tree.get_mrca(&[3, 42]),
            Err(TreeError::NodeNotFound(42))
        ));
    }

    #[test]
    fn ladderise_is_stable() {
        let mut tree = Tree::from_newick("((C,D),A,(E,F),B);").unwrap();
        tree.ladderise().unwrap();
        assert_eq!(tree.to_newick().unwrap(), "(A,B,(C,D),(E,F));");
    }

    #[test]
    fn ladderise_twice() {
        let mut tree = Tree::from_newick("(((A,B),(C,(D,E))),F,(G,H));").unwrap();
        tree.ladderise().unwrap();
        let once = tree.to_newick().unwrap();
        tree.ladderise().unwrap();
        assert_eq!(once, tree.to_newick().unwrap());
        assert_eq!(once, "(F,(G,H),((A,B),(C,(D,E))));");
    }

    #[test]
    fn hybrid_groups() {
        let tree = Tree::from_newick("((A,(B)#1)C,(#1,D)E,#3);").unwrap();
        let groups = tree.get_hybrid_edges().unwrap();

        assert_eq!(
            groups[&1],
            HybridGroup {
                source: Some(3),
                destinations: vec![6]
            }
        );
        // Leaf only groups are kept as they are
        assert_eq!(
            groups[&3],
            HybridGroup {
                source: None,
                destinations: vec![8]
            }
        );
    }

    #[test]
    fn invalid_hybrid_groups() {
        let tree = Tree::from_newick("((A)#1,(B)#1,#1);").unwrap();
        assert!(matches!(
            tree.get_hybrid_edges(),
            Err(TreeError::DuplicateHybridSource(1))
        ));

        let tree = Tree::from_newick("((A)#2,B);").unwrap();
        assert!(matches!(
            tree.get_hybrid_edges(),
            Err(TreeError::IncompleteHybridGroup(2))
        ));
    }

    #[test]
    fn subtree_is_independent() {
        let tree = Tree::from_newick("((A:1,(B:1)#1:1)C:1,(#1:2,D:1)E:1);").unwrap();
        let c = tree.search_nodes(|n| n.label.as_deref() == Some("C")).unwrap()[0];
        let clade = tree.get_subtree(&c).unwrap();

        // The source lost its destination
        assert_eq!(clade.to_newick().unwrap(), "(A:1,(B:1):1)C:1;");
        assert!(clade.get_hybrid_edges().unwrap().is_empty());
        assert_eq!(clade.get(&0).unwrap().parent, None);
        assert_eq!(clade.get(&0).unwrap().height(), 2.0);

        // The original tree is untouched
        assert_eq!(tree.size().unwrap(), 8);
        assert_eq!(tree.get_hybrid_edges().unwrap().len(), 1);
    }

    #[test]
    fn reassign_ids_drops_detached_nodes() {
        let mut tree = build_simple_tree().unwrap();
        tree.remove_child(1, 4).unwrap(); // Detach D
        tree.reassign_ids().unwrap();

        assert_eq!(tree.size().unwrap(), 6);
        assert_eq!(tree.nodes.len(), 6);
        let labels: Vec<_> = get_values(&tree.get_node_list().unwrap(), &tree)
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(labels, vec!["F", "B", "A", "G", "I", "H"]);
        assert_eq!(tree.get_node_list().unwrap(), (0..6).collect_vec());
    }

    #[test]
    fn from_nodes_checks_links() {
        let mut root = Node::new();
        root.children = vec![1];
        let child = Node::new_labelled("A");

        assert!(matches!(
            Tree::from_nodes(vec![root.clone(), child.clone()], 0),
            Err(TreeError::InconsistentParent {
                child: 1,
                parent: 0,
                found: None
            })
        ));

        let mut looping = child;
        looping.parent = Some(0);
        looping.children = vec![0];
        root.parent = None;
        assert!(Tree::from_nodes(vec![root, looping], 0).is_err());
    }

    #[test]
    fn total_length() {
        let tree = build_tree_with_lengths().unwrap();
        assert!((tree.length().unwrap() - 1.5).abs() < 1e-12);

        let tree = build_simple_tree().unwrap();
        assert!(matches!(
            tree.length(),
            Err(TreeError::MissingBranchLengths)
        ));
    }

    #[test]
    fn distances() {
        let tree = build_tree_with_lengths().unwrap();
        let test_cases = vec![
            ((1, 2), (0.3, 2)), // (A,B)
            ((1, 4), (0.9, 3)), // (A,C)
            ((4, 5), (0.7, 2)), // (C,D)
            ((3, 5), (0.4, 1)), // (E,D)
        ];
        for ((source, target), (dist, branches)) in test_cases {
            let (d, b) = tree.get_distance(&source, &target).unwrap();
            assert!((d.unwrap() - dist).abs() < 1e-12);
            assert_eq!(b, branches);
        }
    }

    #[test]
    fn counts_report_broken_trees() {
        let tree = Tree::new();
        assert!(matches!(tree.size(), Err(TreeError::RootNotFound)));
        assert!(matches!(tree.n_leaves(), Err(TreeError::RootNotFound)));
        assert!(matches!(
            tree.search_nodes(|_| true),
            Err(TreeError::RootNotFound)
        ));

        let mut tree = build_simple_tree().unwrap();
        tree.get_mut(&0).unwrap().children.push(1);
        assert!(matches!(tree.size(), Err(TreeError::NodeRevisited(_))));
        assert!(matches!(tree.n_leaves(), Err(TreeError::NodeRevisited(_))));
    }

    #[test]
    fn reachability() {
        let mut tree = build_simple_tree().unwrap();
        assert!(tree.contains(&8).unwrap());
        tree.remove_child(0, 2).unwrap();
        assert!(!tree.contains(&8).unwrap());
    }
}
