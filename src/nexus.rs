//! Read phylogenetic trees and networks from the TREES block of Nexus files.
//!
//! Only the TREES block is read, every other block is skipped. Inside of it:
//!  - an optional `TRANSLATE key label, ...;` command maps leaf labels
//!  - `TREE name = [&R] newick;` commands (or `UTREE`) hold extended newick trees
//!
//! Comments (`[...]`) are removed except for `[&...]` annotations,
//! which are kept for the newick parser.
//!
//! ```
//! use phylonet::newick::ParseOptions;
//! use phylonet::nexus::parse_nexus;
//!
//! let nexus = "#NEXUS
//! BEGIN TAXA;
//!     DIMENSIONS NTAX=3;
//!     TAXLABELS A B C;
//! END;
//! BEGIN TREES;
//!     TRANSLATE 1 Homo_sapiens, 2 'Pan troglodytes', 3 Gorilla;
//!     TREE first = [&R] ((1:1,2:1):1,3:2);
//! END;";
//!
//! let trees = parse_nexus(nexus, &ParseOptions::default()).unwrap();
//! assert_eq!(trees.len(), 1);
//! assert_eq!(trees[0].name, "first");
//! assert_eq!(
//!     trees[0].tree.to_newick().unwrap(),
//!     "((Homo_sapiens:1,'Pan troglodytes':1):1,Gorilla:2):0.0;"
//! );
//! ```

use std::{collections::HashMap, fs, path::Path};

use thiserror::Error;
use tracing::{debug, warn};

use crate::newick::{parse_newick_with, NewickParseError, ParseOptions};
use crate::tree::{Tree, TreeError};

/// Errors that can occur when parsing Nexus files.
#[derive(Error, Debug)]
pub enum NexusParseError {
    /// The input does not start with `#NEXUS`
    #[error("File does not start with the #NEXUS header")]
    MissingHeader,
    /// A `[` comment is never closed
    #[error("Unclosed comment starting at offset {0}")]
    UnclosedComment(usize),
    /// A quoted word is never closed
    #[error("Unclosed quote starting at offset {0}")]
    UnclosedQuote(usize),
    /// A block is not closed by `END;`
    #[error("Block {0} is not closed")]
    UnclosedBlock(String),
    /// A TRANSLATE entry is not a `key label` pair
    #[error("Invalid TRANSLATE entry: {0:?}")]
    InvalidTranslate(String),
    /// A TREE command does not have the `name = newick` form
    #[error("Invalid TREE command: {0:?}")]
    InvalidTreeCommand(String),
    /// A newick string of a TREE command could not be parsed
    #[error("Could not parse tree {name:?}")]
    NewickError {
        /// Name of the tree
        name: String,
        /// Newick parsing error
        #[source]
        source: NewickParseError,
    },
    /// There was a [`TreeError`] when relabelling leaves
    #[error("Problem with building the tree.")]
    TreeError(#[from] TreeError),
    /// There was a [`std::io::Error`] when reading a nexus file
    #[error("Problem reading file")]
    IoError(#[from] std::io::Error),
}

/// A tree read from a `TREE` command
#[derive(Debug, Clone)]
pub struct NamedTree {
    /// Name given in the `TREE` command
    pub name: String,
    /// The tree or network
    pub tree: Tree,
}

#[derive(Debug, PartialEq, Clone)]
enum NexusBlock {
    Trees,
    Other(String),
}

impl NexusBlock {
    /// Parse a block name (case-insensitive)
    fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "trees" => NexusBlock::Trees,
            _ => NexusBlock::Other(name.to_string()),
        }
    }
}

/// A `;` terminated command, its first word and the rest of the text
#[derive(Debug)]
struct Command<'a> {
    name: String,
    body: &'a str,
}

impl<'a> Command<'a> {
    fn new(text: &'a str) -> Self {
        let text = text.trim();
        let split = text.find(char::is_whitespace).unwrap_or(text.len());
        Self {
            name: text[..split].to_ascii_lowercase(),
            body: text[split..].trim(),
        }
    }
}

// Removes `[...]` comments, keeping `[&...]` annotations
fn strip_comments(text: &str) -> Result<String, NexusParseError> {
    let mut output = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        match c {
            '\'' | '"' => {
                output.push(c);
                let mut closed = false;
                while let Some((_, q)) = chars.next() {
                    output.push(q);
                    if q == c {
                        // Doubled quotes are escaped quotes
                        if chars.peek().map(|(_, n)| *n) == Some(c) {
                            chars.next();
                            output.push(c);
                        } else {
                            closed = true;
                            break;
                        }
                    }
                }
                if !closed {
                    return Err(NexusParseError::UnclosedQuote(offset));
                }
            }
            '[' if chars.peek().map(|(_, n)| *n) == Some('&') => {
                output.push(c);
                for (_, a) in chars.by_ref() {
                    output.push(a);
                    if a == ']' {
                        break;
                    }
                }
            }
            '[' => {
                // Comments can be nested
                let mut depth = 1;
                for (_, a) in chars.by_ref() {
                    match a {
                        '[' => depth += 1,
                        ']' => depth -= 1,
                        _ => {}
                    }
                    if depth == 0 {
                        break;
                    }
                }
                if depth > 0 {
                    return Err(NexusParseError::UnclosedComment(offset));
                }
                output.push(' ');
            }
            _ => output.push(c),
        }
    }

    Ok(output)
}

// Splits on `sep` outside of quotes and annotations
fn split_outside_quotes(text: &str, sep: char) -> Vec<&str> {
    let mut parts = vec![];
    let mut quote = None;
    let mut in_annotation = false;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') if !in_annotation => quote = Some(c),
            (None, '[') => in_annotation = true,
            (None, ']') => in_annotation = false,
            (None, c) if c == sep && !in_annotation => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);

    parts
}

// Removes the quotes around a word and undoubles inner ones
fn unquote(word: &str) -> String {
    let word = word.trim();
    for quote in ['\'', '"'] {
        if word.len() >= 2 && word.starts_with(quote) && word.ends_with(quote) {
            let doubled: String = [quote, quote].iter().collect();
            return word[1..word.len() - 1].replace(&doubled, &quote.to_string());
        }
    }
    word.to_string()
}

fn parse_translate(body: &str) -> Result<HashMap<String, String>, NexusParseError> {
    let mut table = HashMap::new();
    for entry in split_outside_quotes(body, ',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let split = entry
            .find(char::is_whitespace)
            .ok_or_else(|| NexusParseError::InvalidTranslate(entry.to_string()))?;
        let (key, label) = entry.split_at(split);
        let label = label.trim();
        if label.is_empty() {
            return Err(NexusParseError::InvalidTranslate(entry.to_string()));
        }
        table.insert(unquote(key), unquote(label));
    }

    Ok(table)
}

fn parse_tree_command(
    body: &str,
    translate: &HashMap<String, String>,
    options: &ParseOptions,
) -> Result<NamedTree, NexusParseError> {
    let (name, newick) = match split_outside_quotes(body, '=').as_slice() {
        [name, rest @ ..] if !rest.is_empty() => {
            // Newick annotations may hold '=' as well
            let newick = &body[name.len() + 1..];
            (unquote(name.trim_start_matches('*')), newick)
        }
        _ => return Err(NexusParseError::InvalidTreeCommand(body.to_string())),
    };

    let mut tree = parse_newick_with(newick, options).map_err(|source| {
        NexusParseError::NewickError {
            name: name.clone(),
            source,
        }
    })?;

    if !translate.is_empty() {
        for leaf in tree.get_leaves()? {
            let node = tree.get_mut(&leaf)?;
            if let Some(label) = node.label.as_ref().and_then(|l| translate.get(l)) {
                node.label = Some(label.clone());
            }
        }
    }

    Ok(NamedTree { name, tree })
}

/// Reads every tree of the TREES blocks of a Nexus formatted string.
///
/// Trees that must be skipped according to `options` are left out.
pub fn parse_nexus(text: &str, options: &ParseOptions) -> Result<Vec<NamedTree>, NexusParseError> {
    let text = strip_comments(text)?;
    let text = text.trim_start();
    if !text
        .get(..6)
        .is_some_and(|header| header.eq_ignore_ascii_case("#NEXUS"))
    {
        return Err(NexusParseError::MissingHeader);
    }

    let mut trees = vec![];
    let mut block: Option<NexusBlock> = None;
    let mut translate = HashMap::new();

    for command in split_outside_quotes(&text[6..], ';') {
        let command = Command::new(command);
        match (&block, command.name.as_str()) {
            (_, "") => {}
            (None, "begin") => {
                let block_type = NexusBlock::from_name(command.body);
                debug!(block = ?block_type, "reading nexus block");
                block = Some(block_type);
                translate.clear();
            }
            (Some(_), "end" | "endblock") => block = None,
            (Some(NexusBlock::Trees), "translate") => translate = parse_translate(command.body)?,
            (Some(NexusBlock::Trees), "tree" | "utree") => {
                match parse_tree_command(command.body, &translate, options) {
                    Ok(tree) => trees.push(tree),
                    Err(NexusParseError::NewickError { name, source }) if source.is_skip() => {
                        warn!(%name, "skipping tree")
                    }
                    Err(e) => return Err(e),
                }
            }
            _ => {}
        }
    }

    if let Some(block) = block {
        let name = match block {
            NexusBlock::Trees => "TREES".to_string(),
            NexusBlock::Other(name) => name,
        };
        return Err(NexusParseError::UnclosedBlock(name));
    }

    Ok(trees)
}

/// Reads every tree of the TREES blocks of a Nexus file
pub fn parse_nexus_file(
    path: &Path,
    options: &ParseOptions,
) -> Result<Vec<NamedTree>, NexusParseError> {
    let text = fs::read_to_string(path)?;
    parse_nexus(&text, options)
}
