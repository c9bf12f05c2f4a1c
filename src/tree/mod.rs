//! Build and manipulate phylogenetic trees and networks.
//!
//! This module defines the essential structs to represent phylogenetic trees:
//!  - The [`Node`] struct that represents a node of a phylogenetic tree or network.
//!  - The [`Tree`] struct that holds the arena of [`Node`] objects and the
//!    structural algorithms (ages, MRCA, ladderisation, rerooting).
//!  - The [`AnnotationValue`] enum holding NHX-style metadata attached to nodes.
//!

mod annotation;
mod node;
mod reroot;
mod tree_impl;

pub use self::annotation::AnnotationValue;
pub use self::node::{Node, NodeError};
pub use self::tree_impl::{HybridEdgeMap, HybridGroup, Tree, TreeError};

/// A type that represents Identifiers of [`Node`] objects
/// within phylogenetic [`Tree`] object.
pub type NodeId = usize;

/// A type that represents branch lengths between [`Node`] objects
/// within phylogenetic [`Tree`] object.
pub type EdgeLength = f64;

/// A type that represents the identifier of a reticulation group,
/// i.e. the `#n` marker shared by hybrid [`Node`] objects.
pub type HybridId = usize;
