use logos::{Lexer, Logos};

use super::NewickParseError;

/// Tokens outside of annotation blocks
#[derive(Logos, Debug, PartialEq, Clone, Copy)]
#[logos(skip r"[ \t\r\n\f]+|\[([^&\]][^\]]*)?\]")]
enum NewickToken {
    #[token("(")]
    OpenParen,
    #[token(")")]
    CloseParen,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token("[&")]
    AnnotationOpen,
    #[token("#")]
    Hash,
    #[regex(r#"[^\s(),:;\[\]#'"]+"#)]
    Bare,
    #[regex(r#"'([^']|'')*'"#)]
    SingleQuoted,
    #[regex(r#""([^"]|"")*""#)]
    DoubleQuoted,
}

/// Tokens inside of `[& ... ]` annotation blocks
#[derive(Logos, Debug, PartialEq, Clone, Copy)]
#[logos(skip r"[ \t\r\n\f]+")]
enum AnnotationToken {
    #[token("]")]
    AnnotationClose,
    #[token("{")]
    ListOpen,
    #[token("}")]
    ListClose,
    #[token("=")]
    Equals,
    #[token(",")]
    Comma,
    #[regex(r#"[^\s,={}\[\]'"]+"#)]
    Bare,
    #[regex(r#"'([^']|'')*'"#)]
    SingleQuoted,
    #[regex(r#""([^"]|"")*""#)]
    DoubleQuoted,
}

/// Kinds of tokens produced by [`tokenize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `(`
    OpenParen,
    /// `)`
    CloseParen,
    /// `:`
    Colon,
    /// `,`
    Comma,
    /// `;`
    Semicolon,
    /// `[&`
    AnnotationOpen,
    /// `]` closing an annotation block
    AnnotationClose,
    /// `{`
    ListOpen,
    /// `}`
    ListClose,
    /// `=`
    Equals,
    /// `#`
    Hash,
    /// Bare or quoted string
    String,
}

/// A token with its text and byte offset in the source.
/// Quoted strings hold their unescaped content.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Kind of token
    pub kind: TokenKind,
    /// Text of the token
    pub text: String,
    /// Byte offset of the token in the source
    pub offset: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, offset: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            offset,
        }
    }
}

// Strips the surrounding quotes and undoubles inner ones
fn unquote(slice: &str, quote: char) -> String {
    let inner = &slice[1..slice.len() - 1];
    let mut doubled = String::with_capacity(2);
    doubled.push(quote);
    doubled.push(quote);
    inner.replace(&doubled, &quote.to_string())
}

fn unexpected_character(source: &str, offset: usize) -> NewickParseError {
    NewickParseError::UnexpectedCharacter {
        character: source[offset..].chars().next().unwrap_or_default(),
        offset,
    }
}

/// Splits an extended newick string into tokens.
///
/// Whitespace and plain `[...]` comments are dropped.
/// ```
/// use phylonet::newick::{tokenize, TokenKind};
///
/// let tokens = tokenize("('A b':1[&c={x}])#1;").unwrap();
/// let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
///
/// assert_eq!(tokens[1].text, "A b");
/// assert_eq!(
///     kinds,
///     vec![
///         TokenKind::OpenParen,
///         TokenKind::String,
///         TokenKind::Colon,
///         TokenKind::String,
///         TokenKind::AnnotationOpen,
///         TokenKind::String,
///         TokenKind::Equals,
///         TokenKind::ListOpen,
///         TokenKind::String,
///         TokenKind::ListClose,
///         TokenKind::AnnotationClose,
///         TokenKind::CloseParen,
///         TokenKind::Hash,
///         TokenKind::String,
///         TokenKind::Semicolon,
///     ]
/// );
/// ```
pub fn tokenize(source: &str) -> Result<Vec<Token>, NewickParseError> {
    let mut tokens = vec![];
    let mut lexer = NewickToken::lexer(source);

    while let Some(token) = lexer.next() {
        let offset = lexer.span().start;
        let token = token.map_err(|_| unexpected_character(source, offset))?;
        let slice = lexer.slice();

        let token = match token {
            NewickToken::OpenParen => Token::new(TokenKind::OpenParen, slice, offset),
            NewickToken::CloseParen => Token::new(TokenKind::CloseParen, slice, offset),
            NewickToken::Colon => Token::new(TokenKind::Colon, slice, offset),
            NewickToken::Comma => Token::new(TokenKind::Comma, slice, offset),
            NewickToken::Semicolon => Token::new(TokenKind::Semicolon, slice, offset),
            NewickToken::Hash => Token::new(TokenKind::Hash, slice, offset),
            NewickToken::Bare => Token::new(TokenKind::String, slice, offset),
            NewickToken::SingleQuoted => {
                Token::new(TokenKind::String, unquote(slice, '\''), offset)
            }
            NewickToken::DoubleQuoted => Token::new(TokenKind::String, unquote(slice, '"'), offset),
            NewickToken::AnnotationOpen => {
                tokens.push(Token::new(TokenKind::AnnotationOpen, slice, offset));
                let mut annotation = lexer.morph::<AnnotationToken>();
                tokenize_annotation(source, &mut annotation, &mut tokens)?;
                lexer = annotation.morph();
                continue;
            }
        };
        tokens.push(token);
    }

    Ok(tokens)
}

/// Reads tokens until the end of the annotation block, or of the input
fn tokenize_annotation(
    source: &str,
    lexer: &mut Lexer<'_, AnnotationToken>,
    tokens: &mut Vec<Token>,
) -> Result<(), NewickParseError> {
    while let Some(token) = lexer.next() {
        let offset = lexer.span().start;
        let token = token.map_err(|_| unexpected_character(source, offset))?;
        let slice = lexer.slice();

        let kind = match token {
            AnnotationToken::AnnotationClose => {
                tokens.push(Token::new(TokenKind::AnnotationClose, slice, offset));
                return Ok(());
            }
            AnnotationToken::ListOpen => TokenKind::ListOpen,
            AnnotationToken::ListClose => TokenKind::ListClose,
            AnnotationToken::Equals => TokenKind::Equals,
            AnnotationToken::Comma => TokenKind::Comma,
            AnnotationToken::Bare => TokenKind::String,
            AnnotationToken::SingleQuoted => {
                tokens.push(Token::new(TokenKind::String, unquote(slice, '\''), offset));
                continue;
            }
            AnnotationToken::DoubleQuoted => {
                tokens.push(Token::new(TokenKind::String, unquote(slice, '"'), offset));
                continue;
            }
        };
        tokens.push(Token::new(kind, slice, offset));
    }

    Ok(())
}
