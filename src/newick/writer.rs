use crate::tree::{AnnotationValue, Node, NodeId, Tree, TreeError};

// Labels containing these characters are written between single quotes
fn needs_quotes(label: &str) -> bool {
    label.is_empty()
        || label.chars().any(|c| {
            c.is_whitespace()
                || matches!(c, '(' | ')' | ',' | ':' | ';' | '[' | ']' | '#' | '\'' | '"')
        })
}

fn write_label(label: &str, out: &mut String) {
    if needs_quotes(label) {
        out.push('\'');
        out.push_str(&label.replace('\'', "''"));
        out.push('\'');
    } else {
        out.push_str(label);
    }
}

fn write_annotation(node: &Node, out: &mut String) {
    if node.annotation.is_empty() {
        return;
    }
    out.push_str("[&");
    for (i, (key, value)) in node.annotation.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let key = AnnotationValue::from(key.as_str());
        match value {
            AnnotationValue::Null => out.push_str(&format!("{key}")),
            _ => out.push_str(&format!("{key}={value}")),
        }
    }
    out.push(']');
}

fn write_node(tree: &Tree, id: &NodeId, out: &mut String) -> Result<(), TreeError> {
    let node = tree.get(id)?;

    if !node.children.is_empty() {
        out.push('(');
        for (i, child) in node.children.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            write_node(tree, child, out)?;
        }
        out.push(')');
    }

    if let Some(label) = node.label.as_deref() {
        write_label(label, out);
    }
    if let Some(hybrid_id) = node.hybrid_id {
        out.push_str(&format!("#{hybrid_id}"));
    }
    write_annotation(node, out);
    if !node.is_root() {
        if let Some(length) = node.branch_length {
            out.push_str(&format!(":{length}"));
        }
    }

    Ok(())
}

/// Writes a tree or network in extended newick.
///
/// The root gets a `:0.0` branch length when it has none and some other
/// branch of the tree has a length.
/// ```
/// use phylonet::newick::{parse_newick, write_newick};
///
/// let tree = parse_newick("('A b':1,B[&x={1,2},flag]:2);").unwrap();
/// assert_eq!(write_newick(&tree).unwrap(), "('A b':1,B[&flag,x={1,2}]:2):0.0;");
/// ```
pub fn write_newick(tree: &Tree) -> Result<String, TreeError> {
    let root = tree.get_root()?;
    let mut out = String::new();
    write_node(tree, &root, &mut out)?;

    match tree.get(&root)?.branch_length {
        Some(length) => {
            out.push_str(&format!(":{length}"));
        }
        None => {
            let has_lengths = tree
                .get_node_list()?
                .iter()
                .any(|id| tree.nodes[*id].branch_length.is_some());
            if has_lengths {
                out.push_str(":0.0");
            }
        }
    }
    out.push(';');

    Ok(out)
}
