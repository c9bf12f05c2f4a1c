use std::collections::BTreeMap;

use tracing::debug;

use super::lexer::{Token, TokenKind};
use super::{context, NewickParseError, ParseOptions, SkipReason};
use crate::tree::{AnnotationValue, HybridId, Node, NodeId, Tree};

/// Recursive descent parser over the tokens of one input
pub(crate) struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    nodes: Vec<Node>,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(source: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            nodes: vec![],
        }
    }

    /// Check if every token has been consumed
    pub(crate) fn is_done(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Steps over empty `;` statements between trees
    pub(crate) fn skip_empty_trees(&mut self) {
        while self.peek_kind() == Some(TokenKind::Semicolon) {
            self.pos += 1;
        }
    }

    /// Fails if tokens remain after the parsed trees
    pub(crate) fn expect_end(&self) -> Result<(), NewickParseError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(self.unexpected(token)),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn bump(&mut self) -> Result<Token, NewickParseError> {
        match self.tokens.get(self.pos) {
            Some(token) => {
                self.pos += 1;
                Ok(token.clone())
            }
            None => Err(self.unexpected_end()),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, NewickParseError> {
        let token = self.bump()?;
        if token.kind == kind {
            Ok(token)
        } else {
            Err(self.unexpected(&token))
        }
    }

    fn unexpected(&self, token: &Token) -> NewickParseError {
        NewickParseError::UnexpectedToken {
            token: token.text.clone(),
            offset: token.offset,
            context: context(self.source, token.offset),
        }
    }

    fn unexpected_end(&self) -> NewickParseError {
        NewickParseError::UnexpectedEnd {
            offset: self.source.len(),
            context: context(self.source, self.source.len()),
        }
    }

    // Tree := Rooting? Node ';'?
    pub(crate) fn parse_tree(&mut self, options: &ParseOptions) -> Result<Tree, NewickParseError> {
        self.nodes.clear();
        let unrooted = self.parse_rooting()?;

        let root = self.parse_node(None)?;
        if self.nodes[root].branch_length == Some(0.0) {
            self.nodes[root].branch_length = None;
        }

        match self.peek_kind() {
            None => {}
            Some(TokenKind::Semicolon) => self.pos += 1,
            Some(TokenKind::Comma) => {
                let offset = self.tokens[self.pos].offset;
                return Err(NewickParseError::MultipleRoots {
                    offset,
                    context: context(self.source, offset),
                });
            }
            Some(_) => return Err(self.unexpected(&self.tokens[self.pos])),
        }

        if unrooted == Some(true) && options.require_rooted {
            return Err(NewickParseError::Skip(SkipReason::Unrooted));
        }

        let tree = Tree::from_nodes(std::mem::take(&mut self.nodes), root)?;
        let (nodes, leaves) = (tree.size()?, tree.n_leaves()?);
        debug!(nodes, leaves, "parsed tree");

        Ok(tree)
    }

    // Rooting := '[&' ('R' | 'U') ']'
    fn parse_rooting(&mut self) -> Result<Option<bool>, NewickParseError> {
        let prefix = self.tokens.get(self.pos..self.pos + 3);
        let unrooted = match prefix {
            Some([open, flag, close])
                if open.kind == TokenKind::AnnotationOpen
                    && flag.kind == TokenKind::String
                    && close.kind == TokenKind::AnnotationClose =>
            {
                match flag.text.as_str() {
                    "R" | "r" => false,
                    "U" | "u" => true,
                    _ => return Ok(None),
                }
            }
            _ => return Ok(None),
        };
        self.pos += 3;

        Ok(Some(unrooted))
    }

    // Node := Children? Label? Hybrid? Annotation? BranchLength?
    fn parse_node(&mut self, parent: Option<NodeId>) -> Result<NodeId, NewickParseError> {
        let id = self.nodes.len();
        let mut node = Node::new();
        node.parent = parent;
        self.nodes.push(node);

        if self.peek_kind() == Some(TokenKind::OpenParen) {
            self.parse_children(id)?;
        }
        if self.peek_kind() == Some(TokenKind::String) {
            let label = self.bump()?.text;
            self.nodes[id].set_label(label);
        }
        if self.peek_kind() == Some(TokenKind::Hash) {
            self.pos += 1;
            let hybrid_id = self.parse_hybrid_id()?;
            self.nodes[id].set_hybrid_id(hybrid_id);
        }
        if self.peek_kind() == Some(TokenKind::AnnotationOpen) {
            self.parse_annotation(id)?;
        }
        if self.peek_kind() == Some(TokenKind::Colon) {
            self.parse_branch_length(id)?;
        }

        Ok(id)
    }

    // Children := '(' Node (',' Node)* ')'
    fn parse_children(&mut self, parent: NodeId) -> Result<(), NewickParseError> {
        self.expect(TokenKind::OpenParen)?;
        loop {
            let child = self.parse_node(Some(parent))?;
            self.nodes[parent].add_child(child);

            let token = self.bump()?;
            match token.kind {
                TokenKind::Comma => continue,
                TokenKind::CloseParen => return Ok(()),
                _ => return Err(self.unexpected(&token)),
            }
        }
    }

    fn parse_hybrid_id(&mut self) -> Result<HybridId, NewickParseError> {
        let token = self.expect(TokenKind::String)?;
        let digits = token
            .text
            .trim_start_matches(|c: char| c.is_ascii_alphabetic());

        digits
            .parse()
            .map_err(|_| NewickParseError::InvalidHybridId {
                value: token.text.clone(),
                offset: token.offset,
                context: context(self.source, token.offset),
            })
    }

    // `NaN` and `inf` are read by `f64::from_str` but are not lengths
    fn parse_length_value(&mut self) -> Result<f64, NewickParseError> {
        let token = self.expect(TokenKind::String)?;
        match token.text.parse::<f64>() {
            Ok(length) if length.is_finite() => Ok(length),
            _ => Err(NewickParseError::InvalidBranchLength {
                value: token.text.clone(),
                offset: token.offset,
                context: context(self.source, token.offset),
            }),
        }
    }

    // BranchLength := ':' number (':' number)* Annotation?
    fn parse_branch_length(&mut self, id: NodeId) -> Result<(), NewickParseError> {
        self.expect(TokenKind::Colon)?;
        let length = self.parse_length_value()?;
        self.nodes[id].branch_length = Some(length);

        // Extra values (support, probability) are not kept
        while self.peek_kind() == Some(TokenKind::Colon) {
            self.pos += 1;
            self.parse_length_value()?;
        }

        if self.peek_kind() == Some(TokenKind::AnnotationOpen) {
            self.parse_annotation(id)?;
        }

        Ok(())
    }

    // Annotation := '[&' (Entry (',' Entry)*)? ']'
    // Entry := key ('=' Value?)?
    fn parse_annotation(&mut self, id: NodeId) -> Result<(), NewickParseError> {
        self.expect(TokenKind::AnnotationOpen)?;
        let mut entries = BTreeMap::new();

        if self.peek_kind() == Some(TokenKind::AnnotationClose) {
            self.pos += 1;
            return Ok(());
        }

        loop {
            let key = self.expect(TokenKind::String)?.text;
            if self.peek_kind() == Some(TokenKind::Equals) {
                self.pos += 1;
                match self.peek_kind() {
                    Some(TokenKind::Comma | TokenKind::AnnotationClose | TokenKind::ListClose) => {}
                    _ => {
                        let value = self.parse_value()?;
                        entries.insert(key, value);
                    }
                }
            } else {
                entries.insert(key, AnnotationValue::Null);
            }

            let token = self.bump()?;
            match token.kind {
                TokenKind::Comma => continue,
                TokenKind::AnnotationClose => break,
                _ => return Err(self.unexpected(&token)),
            }
        }

        self.nodes[id].annotation.extend(entries);

        Ok(())
    }

    // Value := string | '{' (Value (',' Value)*)? '}'
    fn parse_value(&mut self) -> Result<AnnotationValue, NewickParseError> {
        let token = self.bump()?;
        match token.kind {
            TokenKind::String => Ok(AnnotationValue::String(token.text)),
            TokenKind::ListOpen => {
                let mut values = vec![];
                if self.peek_kind() == Some(TokenKind::ListClose) {
                    self.pos += 1;
                    return Ok(AnnotationValue::List(values));
                }
                loop {
                    values.push(self.parse_value()?);
                    let token = self.bump()?;
                    match token.kind {
                        TokenKind::Comma => continue,
                        TokenKind::ListClose => return Ok(AnnotationValue::List(values)),
                        _ => return Err(self.unexpected(&token)),
                    }
                }
            }
            _ => Err(self.unexpected(&token)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::newick::{parse_newick, NewickParseError};
    use crate::tree::{AnnotationValue, Tree, TreeError};

    fn labels(tree: &Tree) -> Vec<Option<String>> {
        tree.get_node_list()
            .unwrap()
            .iter()
            .map(|id| tree.get(id).unwrap().label.clone())
            .collect()
    }

    #[test]
    fn read_labels_and_lengths() {
        let tree = parse_newick("(A:0.1,B:0.2,(C:0.3,D:0.4)E:0.5)F;").unwrap();

        assert_eq!(
            labels(&tree),
            ["F", "A", "B", "E", "C", "D"]
                .iter()
                .map(|l| Some(l.to_string()))
                .collect::<Vec<_>>()
        );
        let lengths: Vec<_> = (0..6)
            .map(|id| tree.get(&id).unwrap().branch_length)
            .collect();
        assert_eq!(
            lengths,
            vec![None, Some(0.1), Some(0.2), Some(0.5), Some(0.3), Some(0.4)]
        );
    }

    #[test]
    fn empty_nodes() {
        let tree = parse_newick("(,(,),);").unwrap();
        assert_eq!(tree.size().unwrap(), 6);
        assert_eq!(tree.n_leaves().unwrap(), 4);
        assert!(labels(&tree).iter().all(|l| l.is_none()));

        let tree = parse_newick(";").unwrap();
        assert_eq!(tree.size().unwrap(), 1);
    }

    #[test]
    fn root_length() {
        let tree = parse_newick("(A:1,B:1):0.0;").unwrap();
        assert_eq!(tree.get(&0).unwrap().branch_length, None);

        let tree = parse_newick("(A:1,B:1):0.5;").unwrap();
        assert_eq!(tree.get(&0).unwrap().branch_length, Some(0.5));
    }

    #[test]
    fn hybrid_markers() {
        let tree = parse_newick("((A,(B)#H1)C,(#LGT1,D)E);").unwrap();
        let hybrids: Vec<_> = (0..tree.size().unwrap())
            .filter_map(|id| tree.get(&id).unwrap().hybrid_id.map(|h| (id, h)))
            .collect();
        assert_eq!(hybrids, vec![(3, 1), (6, 1)]);

        assert!(matches!(
            parse_newick("(A#x,B);"),
            Err(NewickParseError::InvalidHybridId { offset: 3, .. })
        ));
        assert!(matches!(
            parse_newick("(A#-1,B);"),
            Err(NewickParseError::InvalidHybridId { .. })
        ));
    }

    #[test]
    fn annotations() {
        let tree = parse_newick(
            "(A[&rate=0.5,flag,empty=,set={}]:1[&posterior=0.9],'B c'[&name=\"x, y\"]:2)[&];",
        )
        .unwrap();

        let a = tree.get_by_label("A").unwrap();
        assert_eq!(a.annotation.len(), 4);
        assert_eq!(a.annotation["rate"].as_f64(), Some(0.5));
        assert!(a.annotation["flag"].is_null());
        assert!(!a.annotation.contains_key("empty"));
        assert_eq!(a.annotation["set"], AnnotationValue::List(vec![]));
        assert_eq!(a.annotation["posterior"].as_str(), Some("0.9"));
        assert_eq!(a.branch_length, Some(1.0));

        let b = tree.get_by_label("B c").unwrap();
        assert_eq!(b.annotation["name"].as_str(), Some("x, y"));
        assert!(tree.get(&0).unwrap().annotation.is_empty());
    }

    #[test]
    fn nested_annotation_lists() {
        let tree = parse_newick("A[&v={1,{2,3},{}}];").unwrap();
        let value = &tree.get(&0).unwrap().annotation["v"];
        assert_eq!(
            value,
            &AnnotationValue::List(vec![
                "1".into(),
                AnnotationValue::List(vec!["2".into(), "3".into()]),
                AnnotationValue::List(vec![]),
            ])
        );
    }

    #[test]
    fn extra_length_fields() {
        let tree = parse_newick("(A:1:0.95:12,B:2);").unwrap();
        assert_eq!(tree.get_by_label("A").unwrap().branch_length, Some(1.0));

        assert!(matches!(
            parse_newick("(A:1:high,B:2);"),
            Err(NewickParseError::InvalidBranchLength { offset: 5, .. })
        ));
    }

    #[test]
    fn non_finite_lengths() {
        for newick in ["(A:NaN,B:1);", "(A:nan,B:1);", "(A:inf,B:1);", "(A:-infinity,B:1);"] {
            assert!(
                matches!(
                    parse_newick(newick),
                    Err(NewickParseError::InvalidBranchLength { offset: 3, .. })
                ),
                "{newick}"
            );
        }
        assert!(matches!(
            parse_newick("(A:1:inf,B:1);"),
            Err(NewickParseError::InvalidBranchLength { offset: 5, .. })
        ));
    }

    #[test]
    fn rooting_prefix() {
        let tree = parse_newick("[&R] (A,B);").unwrap();
        assert!(tree.get(&0).unwrap().annotation.is_empty());

        let tree = parse_newick("[&u]A;").unwrap();
        assert_eq!(tree.size().unwrap(), 1);

        // Annotations come after the children
        assert!(matches!(
            parse_newick("[&x=1](A,B);"),
            Err(NewickParseError::UnexpectedToken { offset: 6, .. })
        ));
    }

    #[test]
    fn malformed_inputs() {
        let cases: Vec<(&str, fn(&NewickParseError) -> bool)> = vec![
            ("(A,B", |e| {
                matches!(e, NewickParseError::UnexpectedEnd { offset: 4, .. })
            }),
            ("(A,B));", |e| {
                matches!(e, NewickParseError::UnexpectedToken { offset: 5, .. })
            }),
            ("(A,B)C,D;", |e| {
                matches!(e, NewickParseError::MultipleRoots { offset: 6, .. })
            }),
            ("(A:,B);", |e| {
                matches!(e, NewickParseError::UnexpectedToken { offset: 3, .. })
            }),
            ("(A:1 2,B);", |e| {
                matches!(e, NewickParseError::UnexpectedToken { offset: 5, .. })
            }),
            ("(A[&x=1 y],B);", |e| {
                matches!(e, NewickParseError::UnexpectedToken { offset: 8, .. })
            }),
            ("(A[&x={1,2],B);", |e| {
                matches!(e, NewickParseError::UnexpectedToken { offset: 10, .. })
            }),
            ("(A[&x=1", |e| matches!(e, NewickParseError::UnexpectedEnd { .. })),
        ];

        for (newick, check) in cases {
            let err = parse_newick(newick).unwrap_err();
            assert!(check(&err), "{newick}: {err:?}");
        }
    }

    #[test]
    fn error_context() {
        let newick = "((((((((((A,B),C),D),E),F),G),H),I),J):x,K);";
        match parse_newick(newick) {
            Err(NewickParseError::InvalidBranchLength {
                value,
                offset,
                context,
            }) => {
                assert_eq!(value, "x");
                assert_eq!(offset, 39);
                assert_eq!(context, &newick[19..44]);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn hybrid_groups_checked_on_access() {
        let tree = parse_newick("((A)#1,(B)#1);").unwrap();
        assert!(matches!(
            tree.get_hybrid_edges(),
            Err(TreeError::DuplicateHybridSource(1))
        ));
    }
}
