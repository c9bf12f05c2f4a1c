use std::{
    collections::BTreeMap,
    fmt::{Debug, Display},
};

use thiserror::Error;

use super::{AnnotationValue, EdgeLength, HybridId, NodeId};

/// Errors that can occur when manipulating [`Node`] structs.
#[derive(Error, Debug)]
pub enum NodeError {
    /// We are trying to access the an unexisting child of the node
    #[error("Node {parent} does not have child {child}.")]
    HasNoChild {
        /// Id of the parent the parent node
        parent: NodeId,
        /// Id of the inexistant child node
        child: NodeId,
    },
    /// We are trying to access the parent of a parentless node
    #[error("Node {0} does not have a parent")]
    HasNoParent(NodeId),
    /// We are trying to read a branch length that is missing
    #[error("Node {0} does not have a branch length")]
    MissingBranchLength(NodeId),
}

#[derive(Clone)]
/// A node of a phylogenetic tree or network
pub struct Node {
    /// Index of the node
    pub id: NodeId,
    /// Label of the node
    pub label: Option<String>,
    /// Index of the parent node
    pub parent: Option<NodeId>,
    /// Indices of child nodes
    pub children: Vec<NodeId>,
    /// Length of the branch between the parent and this node
    pub branch_length: Option<EdgeLength>,
    /// Reticulation group this node belongs to
    pub hybrid_id: Option<HybridId>,
    /// NHX style annotations attached to the node
    pub annotation: BTreeMap<String, AnnotationValue>,
    /// Time before present, see [`Tree::compute_node_ages`](super::Tree::compute_node_ages)
    pub(crate) height: f64,
    /// Sum of branch lengths from the root
    pub(crate) rtt_dist: f64,
}

impl Node {
    /// Creates a new Node
    pub fn new() -> Self {
        Self {
            id: 0,
            label: None,
            parent: None,
            children: vec![],
            branch_length: None,
            hybrid_id: None,
            annotation: BTreeMap::new(),
            height: f64::NAN,
            rtt_dist: 0.0,
        }
    }

    /// Creates a new labelled Node
    pub fn new_labelled(label: &str) -> Self {
        Self {
            label: Some(String::from(label)),
            ..Self::new()
        }
    }

    /// Creates a new labelled Node with a branch length
    pub fn with_length(label: Option<&str>, branch_length: EdgeLength) -> Self {
        Self {
            label: label.map(String::from),
            branch_length: Some(branch_length),
            ..Self::new()
        }
    }

    /// Sets the internal Node label
    pub fn set_label(&mut self, label: String) {
        self.label = Some(label);
    }

    /// Sets the internal Node id
    pub fn set_id(&mut self, id: NodeId) {
        self.id = id;
    }

    /// Sets the hybrid id of the node, making it a hybrid node
    pub fn set_hybrid_id(&mut self, hybrid_id: HybridId) {
        self.hybrid_id = Some(hybrid_id);
    }

    /// Adds a child id to the node.
    ///
    /// This only updates the children of `self`, use
    /// [`Tree::add_child`](super::Tree::add_child) to keep both
    /// directions of the link consistent.
    /// ```
    /// use phylonet::tree::Node;
    ///
    /// let mut parent = Node::new();
    /// parent.add_child(1);
    /// parent.add_child(2);
    ///
    /// assert_eq!(parent.children, vec![1, 2]);
    /// assert!(!parent.is_leaf());
    /// ```
    pub fn add_child(&mut self, child: NodeId) {
        self.children.push(child);
    }

    /// Removes the child from the node
    pub fn remove_child(&mut self, child: &NodeId) -> Result<(), NodeError> {
        let vec_index = match self.children.iter().position(|node_id| node_id == child) {
            Some(idx) => idx,
            None => {
                return Err(NodeError::HasNoChild {
                    parent: self.id,
                    child: *child,
                })
            }
        };

        self.children.remove(vec_index);

        Ok(())
    }

    /// Replaces a child with another one at the same position
    pub(crate) fn replace_child(&mut self, old: &NodeId, new: NodeId) -> Result<(), NodeError> {
        match self.children.iter_mut().find(|node_id| *node_id == old) {
            Some(slot) => {
                *slot = new;
                Ok(())
            }
            None => Err(NodeError::HasNoChild {
                parent: self.id,
                child: *old,
            }),
        }
    }

    /// Gets the parent id, failing if the node is parentless
    pub fn get_parent(&self) -> Result<NodeId, NodeError> {
        self.parent.ok_or(NodeError::HasNoParent(self.id))
    }

    /// Gets the branch length, failing if it is undefined
    pub fn get_branch_length(&self) -> Result<EdgeLength, NodeError> {
        self.branch_length
            .ok_or(NodeError::MissingBranchLength(self.id))
    }

    /// Height of the node (time before present).
    /// `NaN` if a branch length is missing on the path from the root.
    pub fn height(&self) -> f64 {
        self.height
    }

    /// Root to tip distance, missing branch lengths count as 0.
    pub fn rtt_dist(&self) -> f64 {
        self.rtt_dist
    }

    /// Check if the node is a leaf node
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Check if the node is a root node
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Check if the node belongs to a reticulation group
    pub fn is_hybrid(&self) -> bool {
        self.hybrid_id.is_some()
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        match (self.parent, other.parent) {
            (None, None) | (Some(_), Some(_)) => {}
            _ => return false,
        }

        let branch_lengths_equal = match (self.branch_length, other.branch_length) {
            (None, None) => true,
            (Some(l1), Some(l2)) => (l1 - l2).abs() < f64::EPSILON,
            _ => false,
        };

        self.label == other.label
            && self.hybrid_id == other.hybrid_id
            && self.children.len() == other.children.len()
            && branch_lengths_equal
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = self.label.as_deref().unwrap_or_default();
        match (self.branch_length, self.hybrid_id) {
            (Some(l), Some(h)) => write!(f, "({l:.3}) {label}#{h}"),
            (Some(l), None) => write!(f, "({l:.3}) {label}"),
            (None, Some(h)) => write!(f, "{label}#{h}"),
            (None, None) => write!(f, "{label}"),
        }
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({:?}) {:?} Id[{}] Parent[{:?}] Hybrid[{:?}] Height[{}] Annotation[{:?}] Children({:?})",
            self.branch_length,
            self.label,
            self.id,
            self.parent,
            self.hybrid_id,
            self.height,
            self.annotation,
            self.children,
        )
    }
}
