//! Read and write phylogenetic trees and networks in extended Newick.
//!
//! The grammar supports:
//!  - labels, bare or quoted (`'...'` or `"..."`, quotes doubled to escape them)
//!  - branch lengths, extra `:`-delimited values are read and discarded
//!  - reticulation markers `#n` (an alphabetic type prefix like `#H1` is dropped)
//!  - annotation blocks `[&key=value,key={v1,v2}]`
//!  - a `[&R]` or `[&U]` rooting prefix
//!  - plain `[...]` comments, which are ignored
//!
//! ```
//! use phylonet::newick::parse_newick;
//!
//! let tree = parse_newick("[&R] ((A:1,(B:0.5)#H1:0.5):1,(C:1,#H1:0.5):1);").unwrap();
//!
//! assert_eq!(tree.n_leaves().unwrap(), 4);
//! assert_eq!(tree.get_hybrid_edges().unwrap().len(), 1);
//! ```

mod lexer;
mod parser;
mod writer;

use thiserror::Error;
use tracing::warn;

use crate::tree::{Tree, TreeError};

pub use self::lexer::{tokenize, Token, TokenKind};
pub use self::writer::write_newick;

/// Number of characters shown on each side of a parsing error
pub const CONTEXT_WINDOW: usize = 20;

/// Reasons for leaving a tree out of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The tree is marked `[&U]` but only rooted trees were requested
    Unrooted,
}

/// Errors that can occur when parsing newick strings.
#[derive(Error, Debug)]
pub enum NewickParseError {
    /// A character that cannot start any token
    #[error("Unexpected character {character:?} at offset {offset}")]
    UnexpectedCharacter {
        /// The offending character
        character: char,
        /// Byte offset in the source
        offset: usize,
    },
    /// A token that is not allowed at this position
    #[error("Unexpected token {token:?} at offset {offset}: {context}")]
    UnexpectedToken {
        /// Text of the token
        token: String,
        /// Byte offset in the source
        offset: usize,
        /// Source text around the token
        context: String,
    },
    /// The input ended in the middle of a tree
    #[error("Unexpected end of input at offset {offset}: {context}")]
    UnexpectedEnd {
        /// Byte offset in the source
        offset: usize,
        /// Source text before the end
        context: String,
    },
    /// A comma follows the root node
    #[error("Multiple root nodes at offset {offset}: {context}")]
    MultipleRoots {
        /// Byte offset in the source
        offset: usize,
        /// Source text around the comma
        context: String,
    },
    /// A branch length could not be read as a number
    #[error("Could not parse branch length {value:?} at offset {offset}: {context}")]
    InvalidBranchLength {
        /// Text of the branch length
        value: String,
        /// Byte offset in the source
        offset: usize,
        /// Source text around the branch length
        context: String,
    },
    /// A hybrid marker could not be read as a non-negative integer
    #[error("Could not parse hybrid id {value:?} at offset {offset}: {context}")]
    InvalidHybridId {
        /// Text after the `#`
        value: String,
        /// Byte offset in the source
        offset: usize,
        /// Source text around the marker
        context: String,
    },
    /// The tree was parsed but must be left out, see [`ParseOptions`]
    #[error("Tree skipped: {0:?}")]
    Skip(SkipReason),
    /// There was a [`TreeError`] when building a tree from the newick string
    #[error("Problem with building the tree.")]
    TreeError(#[from] TreeError),
    /// There was a [`std::io::Error`] when reading a newick file
    #[error("Problem reading file")]
    IoError(#[from] std::io::Error),
}

impl NewickParseError {
    /// Check if the error only signals that the tree must be skipped
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip(_))
    }
}

/// Options used when reading trees
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Skip trees explicitly marked as unrooted with `[&U]`
    pub require_rooted: bool,
}

/// Source text around a byte offset
pub(crate) fn context(source: &str, offset: usize) -> String {
    let offset = offset.min(source.len());
    let mut start = offset.saturating_sub(CONTEXT_WINDOW);
    while !source.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (offset + CONTEXT_WINDOW).min(source.len());
    while !source.is_char_boundary(end) {
        end += 1;
    }

    source[start..end].to_string()
}

/// Parses a single extended newick tree.
///
/// ```
/// use phylonet::newick::{parse_newick, NewickParseError};
///
/// assert!(parse_newick("(A,B);").is_ok());
/// assert!(matches!(
///     parse_newick("(A,B),C;"),
///     Err(NewickParseError::MultipleRoots { offset: 5, .. })
/// ));
/// ```
pub fn parse_newick(source: &str) -> Result<Tree, NewickParseError> {
    parse_newick_with(source, &ParseOptions::default())
}

/// Parses a single extended newick tree with custom options,
/// returns [`NewickParseError::Skip`] if the tree must be left out.
pub fn parse_newick_with(source: &str, options: &ParseOptions) -> Result<Tree, NewickParseError> {
    let tokens = tokenize(source)?;
    let mut parser = parser::Parser::new(source, tokens);
    let tree = parser.parse_tree(options)?;
    parser.expect_end()?;

    Ok(tree)
}

/// Parses every `;` terminated tree of the input. Trees that must be
/// skipped according to `options` are left out of the result.
///
/// ```
/// use phylonet::newick::{parse_newick_trees, ParseOptions};
///
/// let source = "(A,B);\n[&U](C,D);\n[&R]((E,F),G);";
/// let options = ParseOptions { require_rooted: true };
/// let trees = parse_newick_trees(source, &options).unwrap();
///
/// assert_eq!(trees.len(), 2);
/// assert_eq!(trees[1].n_leaves().unwrap(), 3);
/// ```
pub fn parse_newick_trees(
    source: &str,
    options: &ParseOptions,
) -> Result<Vec<Tree>, NewickParseError> {
    let tokens = tokenize(source)?;
    let mut parser = parser::Parser::new(source, tokens);
    let mut trees = vec![];

    loop {
        parser.skip_empty_trees();
        if parser.is_done() {
            break;
        }
        match parser.parse_tree(options) {
            Ok(tree) => trees.push(tree),
            Err(NewickParseError::Skip(reason)) => {
                warn!(?reason, index = trees.len(), "skipping tree")
            }
            Err(e) => return Err(e),
        }
    }

    Ok(trees)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_window() {
        let source = "0123456789".repeat(5);
        assert_eq!(context(&source, 25), &source[5..45]);
        assert_eq!(context(&source, 3), &source[0..23]);
        assert_eq!(context(&source, 50), &source[30..50]);

        // Offsets land on char boundaries
        let source = "(é,ü);";
        assert_eq!(context(source, 2), source);
    }

    #[test]
    fn skip_signal() {
        let options = ParseOptions {
            require_rooted: true,
        };
        let err = parse_newick_with("[&U](A,B);", &options).unwrap_err();
        assert!(err.is_skip());

        // Unrooted trees are read by default
        assert!(parse_newick("[&U](A,B);").is_ok());
        assert!(parse_newick_with("[&R](A,B);", &options).is_ok());
    }

    #[test]
    fn batch_parsing() {
        let source = "(A,B);(C,(D,E));\n((F,G),H)";
        let trees = parse_newick_trees(source, &ParseOptions::default()).unwrap();

        assert_eq!(trees.len(), 3);
        assert_eq!(trees[2].to_newick().unwrap(), "((F,G),H);");
        // Ids restart for every tree
        assert_eq!(trees[1].get_root().unwrap(), 0);
        assert_eq!(trees[1].get_leaves().unwrap(), vec![1, 3, 4]);
    }

    #[test]
    fn batch_skips_empty_statements() {
        let trees = parse_newick_trees(";(A,B);;\n ; (C,D);;", &ParseOptions::default()).unwrap();

        assert_eq!(trees.len(), 2);
        assert_eq!(trees[0].to_newick().unwrap(), "(A,B);");
        assert_eq!(trees[1].to_newick().unwrap(), "(C,D);");
        assert!(parse_newick_trees(";;", &ParseOptions::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn batch_errors_abort() {
        let result = parse_newick_trees("(A,B);(C,:x);", &ParseOptions::default());
        assert!(matches!(
            result,
            Err(NewickParseError::InvalidBranchLength { .. })
        ));
    }

    #[test]
    fn single_tree_rejects_trailing_tokens() {
        assert!(matches!(
            parse_newick("(A,B);(C,D);"),
            Err(NewickParseError::UnexpectedToken { offset: 6, .. })
        ));
    }
}
